//! Per-tier inference limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resources::{GB, MemoryProbe, ResourceTier, current_tier};

/// Rough prompt cost of one article (title, source, summary line).
pub const ESTIMATED_TOKENS_PER_ARTICLE: u32 = 175;

/// Tokens held back for prompt scaffolding and the generated digest.
pub const RESERVED_CONTEXT_TOKENS: u32 = 1500;

pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on inference threads regardless of core count.
pub const MAX_THREADS: usize = 6;

/// Limits derived from the host's resource tier.
///
/// Computed once at startup and shared by `Arc`; nothing mutates it after
/// construction except the builder-style overrides used before sharing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfiguration {
    pub tier: ResourceTier,
    pub context_size: u32,
    pub batch_size: u32,
    pub thread_count: usize,
    /// Free memory required before a model load starts.
    pub min_load_memory: u64,
    /// Free memory required before each generation on a loaded model.
    pub min_inference_memory: u64,
    pub max_articles_for_digest: usize,
    pub generation_timeout: Duration,
}

impl InferenceConfiguration {
    pub fn for_tier(tier: ResourceTier, logical_cores: usize) -> Self {
        let (context_size, batch_size, min_load_memory, min_inference_memory, max_articles) =
            match tier {
                ResourceTier::Constrained => (2048, 256, GB * 3 / 2, GB * 8 / 10, 5),
                ResourceTier::Standard => (3072, 512, GB * 12 / 10, GB * 6 / 10, 8),
                ResourceTier::High => (3072, 2048, GB, GB / 2, 8),
            };

        Self {
            tier,
            context_size,
            batch_size,
            thread_count: thread_count(logical_cores),
            min_load_memory,
            min_inference_memory,
            max_articles_for_digest: max_articles,
            generation_timeout: GENERATION_TIMEOUT,
        }
    }

    /// Reads the probe once and builds the table for this host.
    pub fn detect(probe: &dyn MemoryProbe) -> Self {
        let tier = current_tier(probe);
        let config = Self::for_tier(tier, probe.logical_cores());
        tracing::info!(
            tier = %tier,
            context = config.context_size,
            batch = config.batch_size,
            threads = config.thread_count,
            max_articles = config.max_articles_for_digest,
            "inference configuration detected"
        );
        config
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Prompt plus reserved output tokens for `articles` articles.
    pub fn estimated_prompt_tokens(&self, articles: usize) -> u32 {
        let articles = u32::try_from(articles).unwrap_or(u32::MAX);
        articles
            .saturating_mul(ESTIMATED_TOKENS_PER_ARTICLE)
            .saturating_add(RESERVED_CONTEXT_TOKENS)
    }

    pub fn fits_context(&self, articles: usize) -> bool {
        self.estimated_prompt_tokens(articles) <= self.context_size
    }
}

fn thread_count(logical_cores: usize) -> usize {
    logical_cores.saturating_sub(1).clamp(1, MAX_THREADS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FixedMemoryProbe;

    const TIERS: [ResourceTier; 3] = [
        ResourceTier::Constrained,
        ResourceTier::Standard,
        ResourceTier::High,
    ];

    #[test]
    fn test_inference_floor_below_load_floor() {
        for tier in TIERS {
            let config = InferenceConfiguration::for_tier(tier, 4);
            assert!(config.min_inference_memory < config.min_load_memory, "{tier}");
            assert!([5, 8].contains(&config.max_articles_for_digest));
            assert!(RESERVED_CONTEXT_TOKENS < config.context_size);
        }
    }

    #[test]
    fn test_floors_decrease_with_tier() {
        let c = InferenceConfiguration::for_tier(ResourceTier::Constrained, 4);
        let s = InferenceConfiguration::for_tier(ResourceTier::Standard, 4);
        let h = InferenceConfiguration::for_tier(ResourceTier::High, 4);
        assert!(c.min_load_memory > s.min_load_memory);
        assert!(s.min_load_memory > h.min_load_memory);
        assert_eq!((c.batch_size, s.batch_size, h.batch_size), (256, 512, 2048));
        assert_eq!(c.context_size, 2048);
        assert_eq!(h.context_size, 3072);
    }

    #[test]
    fn test_thread_count_bounds() {
        assert_eq!(thread_count(0), 1);
        assert_eq!(thread_count(1), 1);
        assert_eq!(thread_count(4), 3);
        assert_eq!(thread_count(7), 6);
        assert_eq!(thread_count(64), 6);
    }

    #[test]
    fn test_prompt_estimate() {
        let config = InferenceConfiguration::for_tier(ResourceTier::Constrained, 2);
        assert_eq!(config.estimated_prompt_tokens(3), 3 * 175 + 1500);
        assert!(config.fits_context(3));
        assert!(!config.fits_context(5));

        let high = InferenceConfiguration::for_tier(ResourceTier::High, 8);
        assert!(high.fits_context(8));
    }

    #[test]
    fn test_detect_uses_probe() {
        let probe = FixedMemoryProbe::new(3 * GB, 2 * GB, 8);
        let config = InferenceConfiguration::detect(&probe);
        assert_eq!(config.tier, ResourceTier::Constrained);
        assert_eq!(config.thread_count, 6);
        assert_eq!(config.generation_timeout, GENERATION_TIMEOUT);

        let short = config.with_generation_timeout(Duration::from_millis(50));
        assert_eq!(short.generation_timeout, Duration::from_millis(50));
    }
}
