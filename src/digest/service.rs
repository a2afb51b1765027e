//! Application-level digest runs: store in, sink out.

use std::sync::Arc;

use super::orchestrator::DigestOrchestrator;
use super::section::Digest;
use super::store::{ArticleStore, DigestSink};
use crate::Result;

/// Pulls recent articles, generates a digest and saves it.
pub struct DigestService {
    store: Arc<dyn ArticleStore>,
    sink: Arc<dyn DigestSink>,
    orchestrator: DigestOrchestrator,
}

impl DigestService {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        sink: Arc<dyn DigestSink>,
        orchestrator: DigestOrchestrator,
    ) -> Self {
        Self {
            store,
            sink,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &DigestOrchestrator {
        &self.orchestrator
    }

    /// One full run. The digest is saved only when generation succeeds.
    pub async fn run<F>(&self, on_partial: F) -> Result<Digest>
    where
        F: FnMut(&str),
    {
        let settings = self.orchestrator.settings();
        // Twice the selection cap; duplicates are dropped during selection.
        let fetch = self.orchestrator.article_limit().saturating_mul(2);
        let articles = self
            .store
            .recent_articles(&settings.categories, fetch)
            .await?;
        tracing::debug!(candidates = articles.len(), "articles fetched for digest");

        let digest = self
            .orchestrator
            .generate_digest_with(articles, on_partial)
            .await?;
        self.sink.save(&digest).await?;
        Ok(digest)
    }
}

impl std::fmt::Debug for DigestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestService")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}
