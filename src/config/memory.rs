//! In-process preference store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::ConfigResult;
use super::provider::ConfigProvider;

/// Shared in-memory key/value store.
///
/// Clones share the same underlying map, so a host application can hand one
/// clone to the digest settings loader and keep another to write user
/// preferences.
#[derive(Debug, Clone)]
pub struct MemoryConfigProvider {
    data: Arc<RwLock<HashMap<String, String>>>,
    name: String,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            name: name.into(),
        }
    }

    pub fn from_data(data: HashMap<String, String>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            name: "memory".to_string(),
        }
    }

    /// Builder-style initial value. Falls back to a fresh map if this store
    /// was already shared.
    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match Arc::get_mut(&mut self.data) {
            Some(lock) => {
                lock.get_mut().insert(key.into(), value.into());
            }
            None => {
                tracing::warn!(store = %self.name, "value() on a shared store; detaching");
                let mut detached = HashMap::new();
                if let Ok(current) = self.data.try_read() {
                    detached.clone_from(&*current);
                }
                detached.insert(key.into(), value.into());
                self.data = Arc::new(RwLock::new(detached));
            }
        }
        self
    }

    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().await.insert(key.into(), value.into());
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

impl Default for MemoryConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigProvider for MemoryConfigProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> ConfigResult<bool> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_preferences() {
        let app_side = MemoryConfigProvider::new();
        let digest_side = app_side.clone();

        app_side.insert("digest.categories", r#"["technology"]"#).await;
        assert_eq!(
            digest_side.get_raw("digest.categories").await.unwrap(),
            Some(r#"["technology"]"#.to_string())
        );
        assert_eq!(digest_side.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = MemoryConfigProvider::new()
            .value("digest.article_count", "5")
            .value("digest.max_paragraphs", "2")
            .value("model.name", "digest-model");

        assert_eq!(
            store.list_keys("digest.").await.unwrap(),
            vec!["digest.article_count", "digest.max_paragraphs"]
        );
        assert!(store.delete("model.name").await.unwrap());
        assert!(!store.delete("model.name").await.unwrap());
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn test_value_after_share_detaches() {
        let store = MemoryConfigProvider::new().value("a", "1");
        let _shared = store.clone();
        let detached = store.value("b", "2");
        assert_eq!(detached.get_raw("a").await.unwrap(), Some("1".into()));
        assert_eq!(detached.get_raw("b").await.unwrap(), Some("2".into()));
    }
}
