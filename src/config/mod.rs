//! Configuration: the per-tier inference table, digest settings, and the
//! key/value preference stores they are read from.
//!
//! ```rust,no_run
//! use news_digest::config::{ConfigBuilder, DigestSettings, MemoryConfigProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let preferences = MemoryConfigProvider::new().value("digest.article_count", "6");
//! let config = ConfigBuilder::new()
//!     .env()
//!     .memory(preferences)
//!     .build()
//!     .await?;
//! let settings = DigestSettings::load(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod composite;
pub mod env;
pub mod inference;
pub mod memory;
pub mod provider;
pub mod settings;

pub use composite::CompositeConfigProvider;
pub use env::{ENV_PREFIX, EnvConfigProvider};
pub use inference::{
    ESTIMATED_TOKENS_PER_ARTICLE, GENERATION_TIMEOUT, InferenceConfiguration, MAX_THREADS,
    RESERVED_CONTEXT_TOKENS,
};
pub use memory::MemoryConfigProvider;
pub use provider::{ConfigProvider, ConfigProviderExt};
pub use settings::{DigestSettings, keys};

use thiserror::Error;

/// Errors raised while reading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("{0}")]
    ValidationErrors(ValidationErrors),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ValidationErrors(pub Vec<ConfigError>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: ")?;
        let msgs: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", msgs.join("; "))
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Assembles a priority-ordered provider chain; earlier sources win.
pub struct ConfigBuilder {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Environment variables under [`ENV_PREFIX`].
    pub fn env(mut self) -> Self {
        self.providers.push(Box::new(EnvConfigProvider::new()));
        self
    }

    pub fn env_with_prefix(mut self, prefix: &str) -> Self {
        self.providers
            .push(Box::new(EnvConfigProvider::prefixed(prefix)));
        self
    }

    pub fn memory(mut self, provider: MemoryConfigProvider) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn provider(mut self, provider: Box<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub async fn build(self) -> ConfigResult<CompositeConfigProvider> {
        let mut composite = CompositeConfigProvider::new();
        for provider in self.providers {
            composite.add_provider(provider);
        }
        Ok(composite)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_display() {
        let errors = ValidationErrors(vec![
            ConfigError::invalid("digest.max_paragraphs", "must be at least 1"),
            ConfigError::NotFound {
                key: "model.name".into(),
            },
        ]);
        let text = errors.to_string();
        assert!(text.starts_with("Validation failed: "));
        assert!(text.contains("digest.max_paragraphs"));
        assert!(text.contains("model.name"));
    }

    #[tokio::test]
    async fn test_builder_priority() {
        let user = MemoryConfigProvider::named("user").value("digest.article_count", "4");
        let defaults = MemoryConfigProvider::named("defaults")
            .value("digest.article_count", "8")
            .value("model.name", "digest-model");

        let config = ConfigBuilder::new()
            .memory(user)
            .memory(defaults)
            .build()
            .await
            .unwrap();

        assert_eq!(config.provider_names(), vec!["user", "defaults"]);
        assert_eq!(
            config.get_raw("digest.article_count").await.unwrap(),
            Some("4".to_string())
        );
        assert_eq!(
            config.get_raw("model.name").await.unwrap(),
            Some("digest-model".to_string())
        );
    }
}
