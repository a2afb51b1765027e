//! Host resource inspection.
//!
//! The tier is derived from total physical memory once at startup and then
//! passed around by value; available memory is re-read at every load and
//! generation pre-flight check.

mod probe;
mod tier;

pub use probe::{FixedMemoryProbe, MemoryProbe, SystemMemoryProbe};
pub use tier::{
    CONSTRAINED_TIER_CEILING, GB, HIGH_TIER_FLOOR, ResourceSnapshot, ResourceTier, current_tier,
};
