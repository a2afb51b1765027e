//! Key/value configuration source trait.

use serde::{Serialize, de::DeserializeOwned};

use super::{ConfigError, ConfigResult};

/// A key/value store of raw string values.
///
/// Preferences owned by the host application (selected categories, article
/// count) and deployment settings (model asset name) are both read through
/// this trait.
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()>;

    async fn delete(&self, key: &str) -> ConfigResult<bool>;

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>>;
}

/// Typed access layered over raw values.
///
/// Values are JSON encoded; a bare string that is not valid JSON is retried
/// as a JSON string so `model.name=digest-model` works from the environment.
pub trait ConfigProviderExt: ConfigProvider {
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = ConfigResult<Option<T>>> + Send
    where
        Self: Sync,
    {
        async move {
            let Some(raw) = self.get_raw(key).await? else {
                return Ok(None);
            };
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(first) => serde_json::from_value::<T>(serde_json::Value::String(raw))
                    .map(Some)
                    .map_err(|_| ConfigError::invalid(key, first.to_string())),
            }
        }
    }

    fn get_or<T: DeserializeOwned + Send>(
        &self,
        key: &str,
        default: T,
    ) -> impl std::future::Future<Output = ConfigResult<T>> + Send
    where
        Self: Sync,
    {
        async move { Ok(self.get(key).await?.unwrap_or(default)) }
    }

    fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> impl std::future::Future<Output = ConfigResult<()>> + Send
    where
        Self: Sync,
    {
        async move {
            let raw = serde_json::to_string(value)?;
            self.set_raw(key, &raw).await
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigProvider;

    #[tokio::test]
    async fn test_typed_roundtrip_and_bare_strings() {
        let store = MemoryConfigProvider::new();
        store.set("digest.max_paragraphs", &2usize).await.unwrap();
        store.set_raw("model.name", "digest-model").await.unwrap();

        let paragraphs: Option<usize> = store.get("digest.max_paragraphs").await.unwrap();
        assert_eq!(paragraphs, Some(2));

        let name: Option<String> = store.get("model.name").await.unwrap();
        assert_eq!(name.as_deref(), Some("digest-model"));
    }

    #[tokio::test]
    async fn test_invalid_value_names_key() {
        let store = MemoryConfigProvider::new();
        store
            .set_raw("digest.max_paragraphs", "three")
            .await
            .unwrap();

        let err = store
            .get::<usize>("digest.max_paragraphs")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "digest.max_paragraphs"));
    }

    #[tokio::test]
    async fn test_get_or_default() {
        let store = MemoryConfigProvider::new();
        let count: usize = store.get_or("digest.article_count", 8).await.unwrap();
        assert_eq!(count, 8);
    }
}
