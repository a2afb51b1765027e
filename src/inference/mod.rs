//! Streaming inference against the loaded model.
//!
//! One generation at a time: a second request while one is in flight is
//! rejected with [`Error::GenerationInProgress`](crate::Error::GenerationInProgress).

mod engine;
mod options;
mod stop;
mod stream;
mod template;

pub use engine::InferenceEngine;
pub use options::{DEFAULT_STOP_SEQUENCES, GenerationOptions};
pub use stop::{StopScan, StopSequenceDetector};
pub use stream::{GenerationStats, GenerationStream};
pub use template::ChatTemplate;
