//! Digest settings read from the preference store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::provider::{ConfigProvider, ConfigProviderExt};
use super::{ConfigError, ConfigResult, ValidationErrors};
use crate::digest::Category;

/// Preference keys understood by [`DigestSettings::load`].
pub mod keys {
    pub const MODEL_NAME: &str = "model.name";
    pub const MODEL_EXTENSION: &str = "model.extension";
    pub const MODEL_SEARCH_DIRS: &str = "model.search_dirs";
    pub const MAX_PARAGRAPHS: &str = "digest.max_paragraphs";
    pub const OVERLAP_THRESHOLD: &str = "digest.overlap_threshold";
    pub const CONTAMINATION_THRESHOLD: &str = "digest.contamination_threshold";
    pub const CATEGORIES: &str = "digest.categories";
    pub const ARTICLE_COUNT: &str = "digest.article_count";
}

pub const DEFAULT_MODEL_NAME: &str = "news-digest";
pub const DEFAULT_MODEL_EXTENSION: &str = "gguf";
pub const DEFAULT_MAX_PARAGRAPHS: usize = 3;
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;
pub const DEFAULT_CONTAMINATION_THRESHOLD: usize = 2;
pub const DEFAULT_ARTICLE_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSettings {
    pub model_name: String,
    pub model_extension: String,
    /// Searched in order; the first directory holding the asset wins.
    pub search_dirs: Vec<PathBuf>,
    pub max_paragraphs: usize,
    /// Significant-word overlap above which a paragraph is a duplicate.
    pub overlap_threshold: f64,
    /// Number of other-category subject mentions that marks a span as mixed.
    pub contamination_threshold: usize,
    /// Categories the reader follows, any order.
    pub categories: Vec<Category>,
    /// Preferred number of articles per digest; the tier cap still applies.
    pub article_count: usize,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_extension: DEFAULT_MODEL_EXTENSION.to_string(),
            search_dirs: default_search_dirs(),
            max_paragraphs: DEFAULT_MAX_PARAGRAPHS,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            contamination_threshold: DEFAULT_CONTAMINATION_THRESHOLD,
            categories: Category::ALL.to_vec(),
            article_count: DEFAULT_ARTICLE_COUNT,
        }
    }
}

/// Per-user data directory first, then `./models`.
pub fn default_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(project) = directories::ProjectDirs::from("", "", "news-digest") {
        dirs.push(project.data_dir().join("models"));
    }
    dirs.push(PathBuf::from("models"));
    dirs
}

impl DigestSettings {
    /// Reads every key, falling back to defaults for missing ones.
    pub async fn load(provider: &dyn ConfigProvider) -> ConfigResult<Self> {
        let defaults = Self::default();

        let search_dirs = match provider.get_raw(keys::MODEL_SEARCH_DIRS).await? {
            Some(raw) => parse_search_dirs(&raw)?,
            None => defaults.search_dirs,
        };

        let settings = Self {
            model_name: provider
                .get_or(keys::MODEL_NAME, defaults.model_name)
                .await?,
            model_extension: provider
                .get_or(keys::MODEL_EXTENSION, defaults.model_extension)
                .await?,
            search_dirs,
            max_paragraphs: provider
                .get_or(keys::MAX_PARAGRAPHS, defaults.max_paragraphs)
                .await?,
            overlap_threshold: provider
                .get_or(keys::OVERLAP_THRESHOLD, defaults.overlap_threshold)
                .await?,
            contamination_threshold: provider
                .get_or(
                    keys::CONTAMINATION_THRESHOLD,
                    defaults.contamination_threshold,
                )
                .await?,
            categories: provider
                .get_or(keys::CATEGORIES, defaults.categories)
                .await?,
            article_count: provider
                .get_or(keys::ARTICLE_COUNT, defaults.article_count)
                .await?,
        };

        tracing::debug!(
            source = provider.name(),
            model = %settings.model_name,
            categories = settings.categories.len(),
            article_count = settings.article_count,
            "digest settings loaded"
        );
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.model_name.trim().is_empty() {
            errors.push(ConfigError::invalid(keys::MODEL_NAME, "must not be empty"));
        }
        if self.max_paragraphs == 0 {
            errors.push(ConfigError::invalid(keys::MAX_PARAGRAPHS, "must be at least 1"));
        }
        if !(self.overlap_threshold > 0.0 && self.overlap_threshold <= 1.0) {
            errors.push(ConfigError::invalid(
                keys::OVERLAP_THRESHOLD,
                format!("{} is outside (0, 1]", self.overlap_threshold),
            ));
        }
        if self.contamination_threshold == 0 {
            errors.push(ConfigError::invalid(
                keys::CONTAMINATION_THRESHOLD,
                "must be at least 1",
            ));
        }
        if self.article_count == 0 {
            errors.push(ConfigError::invalid(keys::ARTICLE_COUNT, "must be at least 1"));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::ValidationErrors(ValidationErrors(errors))),
        }
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}

/// Accepts a JSON array or a platform path list (`a:b` on Unix).
fn parse_search_dirs(raw: &str) -> ConfigResult<Vec<PathBuf>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ConfigError::invalid(keys::MODEL_SEARCH_DIRS, e.to_string()));
    }
    Ok(std::env::split_paths(trimmed)
        .filter(|p| !p.as_os_str().is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigProvider;

    #[tokio::test]
    async fn test_load_defaults_from_empty_store() {
        let store = MemoryConfigProvider::new();
        let settings = DigestSettings::load(&store).await.unwrap();
        assert_eq!(settings.max_paragraphs, 3);
        assert_eq!(settings.overlap_threshold, 0.5);
        assert_eq!(settings.contamination_threshold, 2);
        assert_eq!(settings.categories.len(), 7);
        assert_eq!(settings.model_extension, "gguf");
        assert!(settings.search_dirs.ends_with(&[PathBuf::from("models")]));
    }

    #[tokio::test]
    async fn test_load_overrides() {
        let store = MemoryConfigProvider::new()
            .value(keys::MODEL_NAME, "tiny-digest")
            .value(keys::CATEGORIES, r#"["world", "technology"]"#)
            .value(keys::ARTICLE_COUNT, "4")
            .value(keys::MODEL_SEARCH_DIRS, r#"["/opt/models", "/tmp/models"]"#);

        let settings = DigestSettings::load(&store).await.unwrap();
        assert_eq!(settings.model_name, "tiny-digest");
        assert_eq!(
            settings.categories,
            vec![Category::World, Category::Technology]
        );
        assert_eq!(settings.article_count, 4);
        assert_eq!(
            settings.search_dirs,
            vec![PathBuf::from("/opt/models"), PathBuf::from("/tmp/models")]
        );
        assert!(settings.is_enabled(Category::World));
        assert!(!settings.is_enabled(Category::Sports));
    }

    #[cfg(unix)]
    #[test]
    fn test_search_dirs_path_list() {
        let dirs = parse_search_dirs("/a:/b").unwrap();
        assert_eq!(dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let store = MemoryConfigProvider::new().value(keys::OVERLAP_THRESHOLD, "1.5");
        let err = DigestSettings::load(&store).await.unwrap_err();
        assert!(err.to_string().contains(keys::OVERLAP_THRESHOLD));

        let store = MemoryConfigProvider::new().value(keys::CATEGORIES, r#"["weather"]"#);
        assert!(matches!(
            DigestSettings::load(&store).await.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let settings = DigestSettings {
            model_name: " ".into(),
            max_paragraphs: 0,
            ..DigestSettings::default()
        };
        let err = settings.validate().unwrap_err();
        match err {
            ConfigError::ValidationErrors(errors) => assert_eq!(errors.0.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
