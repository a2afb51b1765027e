//! Collaborators on either side of a digest run.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::article::{Article, Category};
use super::section::Digest;
use crate::Result;

/// Source of candidate articles.
#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    /// Up to `limit` articles from `categories`, newest first.
    async fn recent_articles(&self, categories: &[Category], limit: usize) -> Result<Vec<Article>>;
}

/// Receives finished digests.
#[async_trait::async_trait]
pub trait DigestSink: Send + Sync {
    async fn save(&self, digest: &Digest) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryArticleStore {
    articles: Arc<RwLock<Vec<Article>>>,
}

impl InMemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_articles(articles: impl IntoIterator<Item = Article>) -> Self {
        Self {
            articles: Arc::new(RwLock::new(articles.into_iter().collect())),
        }
    }

    pub async fn insert(&self, article: Article) {
        self.articles.write().await.push(article);
    }

    pub async fn len(&self) -> usize {
        self.articles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.articles.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ArticleStore for InMemoryArticleStore {
    async fn recent_articles(&self, categories: &[Category], limit: usize) -> Result<Vec<Article>> {
        let articles = self.articles.read().await;
        let mut recent: Vec<Article> = articles
            .iter()
            .filter(|a| categories.contains(&a.category))
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDigestSink {
    saved: Arc<RwLock<Vec<Digest>>>,
}

impl InMemoryDigestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn saved(&self) -> Vec<Digest> {
        self.saved.read().await.clone()
    }

    pub async fn latest(&self) -> Option<Digest> {
        self.saved.read().await.last().cloned()
    }
}

#[async_trait::async_trait]
impl DigestSink for InMemoryDigestSink {
    async fn save(&self, digest: &Digest) -> Result<()> {
        tracing::debug!(id = %digest.id, sections = digest.sections.len(), "digest saved");
        self.saved.write().await.push(digest.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_recent_articles_filters_and_orders() {
        let now = Utc::now();
        let store = InMemoryArticleStore::from_articles([
            Article::new("1", "Old chip", "Wire", Category::Technology, now - Duration::hours(3)),
            Article::new("2", "New chip", "Wire", Category::Technology, now),
            Article::new("3", "Match", "Wire", Category::Sports, now),
            Article::new("4", "Summit", "Wire", Category::World, now - Duration::hours(1)),
        ]);
        store
            .insert(Article::new("5", "Rates", "Wire", Category::Business, now))
            .await;
        assert_eq!(store.len().await, 5);

        let recent = store
            .recent_articles(&[Category::Technology, Category::World], 2)
            .await
            .unwrap();
        let ids: Vec<&str> = recent.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "4"]);
    }

    #[tokio::test]
    async fn test_sink_keeps_history() {
        let sink = InMemoryDigestSink::new();
        assert!(sink.latest().await.is_none());

        let first = Digest::new("a".into(), Vec::new(), Vec::new());
        let second = Digest::new("b".into(), Vec::new(), Vec::new());
        sink.save(&first).await.unwrap();
        sink.save(&second).await.unwrap();

        assert_eq!(sink.saved().await.len(), 2);
        assert_eq!(sink.latest().await.unwrap().raw_text, "b");
    }
}
