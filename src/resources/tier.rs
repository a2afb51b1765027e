//! Resource tiers derived from physical memory.

use serde::{Deserialize, Serialize};

use super::probe::MemoryProbe;

pub const GB: u64 = 1024 * 1024 * 1024;

/// Hosts with less physical memory than this are `Constrained`.
pub const CONSTRAINED_TIER_CEILING: u64 = 4 * GB;

/// Hosts with more physical memory than this are `High`.
pub const HIGH_TIER_FLOOR: u64 = 6 * GB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTier {
    Constrained,
    Standard,
    High,
}

impl ResourceTier {
    /// Pure threshold function over total physical memory in bytes.
    ///
    /// A zero reading means the query failed and maps to `Constrained`.
    pub fn from_total_memory(bytes: u64) -> Self {
        if bytes < CONSTRAINED_TIER_CEILING {
            Self::Constrained
        } else if bytes <= HIGH_TIER_FLOOR {
            Self::Standard
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constrained => "constrained",
            Self::Standard => "standard",
            Self::High => "high",
        }
    }

    pub fn is_constrained(&self) -> bool {
        matches!(self, Self::Constrained)
    }
}

impl std::fmt::Display for ResourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the host. Never fails.
pub fn current_tier(probe: &dyn MemoryProbe) -> ResourceTier {
    ResourceTier::from_total_memory(probe.total_memory())
}

/// Point-in-time view of the host used for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub tier: ResourceTier,
    pub total_memory: u64,
    pub available_memory: u64,
    pub logical_cores: usize,
}

impl ResourceSnapshot {
    pub fn capture(probe: &dyn MemoryProbe) -> Self {
        let total_memory = probe.total_memory();
        Self {
            tier: ResourceTier::from_total_memory(total_memory),
            total_memory,
            available_memory: probe.available_memory(),
            logical_cores: probe.logical_cores(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FixedMemoryProbe;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(ResourceTier::from_total_memory(3 * GB), ResourceTier::Constrained);
        assert_eq!(
            ResourceTier::from_total_memory(4 * GB - 1),
            ResourceTier::Constrained
        );
        assert_eq!(ResourceTier::from_total_memory(4 * GB), ResourceTier::Standard);
        assert_eq!(ResourceTier::from_total_memory(6 * GB), ResourceTier::Standard);
        assert_eq!(ResourceTier::from_total_memory(6 * GB + 1), ResourceTier::High);
        assert_eq!(ResourceTier::from_total_memory(16 * GB), ResourceTier::High);
    }

    #[test]
    fn test_failed_query_is_constrained() {
        assert_eq!(ResourceTier::from_total_memory(0), ResourceTier::Constrained);
        let probe = FixedMemoryProbe::new(0, 0, 0);
        assert_eq!(current_tier(&probe), ResourceTier::Constrained);
    }

    #[test]
    fn test_snapshot_capture() {
        let probe = FixedMemoryProbe::new(8 * GB, 3 * GB, 8);
        let snapshot = ResourceSnapshot::capture(&probe);
        assert_eq!(snapshot.tier, ResourceTier::High);
        assert_eq!(snapshot.available_memory, 3 * GB);
        assert_eq!(snapshot.logical_cores, 8);
    }

    #[test]
    fn test_tier_serde() {
        let json = serde_json::to_string(&ResourceTier::Constrained).unwrap();
        assert_eq!(json, "\"constrained\"");
    }
}
