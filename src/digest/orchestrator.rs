//! Digest generation: article selection, prompting, streaming and
//! post-processing.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};

use super::article::Article;
use super::processor::{DigestPostProcessor, ProcessorOptions};
use super::prompt::{DigestPrompt, DigestPromptBuilder};
use super::section::{Digest, SectionOrigin};
use crate::config::DigestSettings;
use crate::inference::{GenerationOptions, GenerationStream, InferenceEngine};
use crate::observability::{GenerationOutcome, MetricsRegistry, SpanContext, TimedSpan};
use crate::{Error, Result};

/// Progress of one digest run.
#[derive(Debug, Clone, PartialEq)]
pub enum DigestEvent {
    /// Generation is starting with this many selected articles.
    Started { articles: usize },
    /// Newly generated text, in order. Not post-processed.
    Partial(String),
    /// The post-processed digest. Always the last event of a successful run.
    Completed(Box<Digest>),
}

/// Stream of [`DigestEvent`]s for one run.
///
/// Nothing starts until the first poll. An engine failure is the run's last
/// item and is passed through untouched. Dropping the run cancels the
/// generation.
pub struct DigestRun {
    inner: BoxStream<'static, Result<DigestEvent>>,
}

impl DigestRun {
    fn failed(error: Error) -> Self {
        Self {
            inner: stream::once(async move { Err(error) }).boxed(),
        }
    }
}

impl Stream for DigestRun {
    type Item = Result<DigestEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for DigestRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestRun").finish_non_exhaustive()
    }
}

enum Phase {
    Pending,
    Streaming(Pin<Box<GenerationStream>>),
    Finished,
}

struct RunState {
    phase: Phase,
    engine: Arc<InferenceEngine>,
    prompt: DigestPrompt,
    options: GenerationOptions,
    processor: DigestPostProcessor,
    articles: Vec<Article>,
    raw: String,
    span: Option<TimedSpan>,
    metrics: Arc<MetricsRegistry>,
}

impl RunState {
    async fn advance(mut self) -> Option<(Result<DigestEvent>, Self)> {
        let mut stream = match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Finished => return None,
            Phase::Pending => {
                let stream = self.engine.generate_stream(
                    &self.prompt.user,
                    &self.prompt.system,
                    &self.options,
                );
                self.phase = Phase::Streaming(Box::pin(stream));
                let articles = self.articles.len();
                return Some((Ok(DigestEvent::Started { articles }), self));
            }
            Phase::Streaming(stream) => stream,
        };

        match stream.next().await {
            Some(Ok(piece)) => {
                self.raw.push_str(&piece);
                self.phase = Phase::Streaming(stream);
                Some((Ok(DigestEvent::Partial(piece)), self))
            }
            Some(Err(error)) => {
                if let Some(span) = self.span.take() {
                    span.record_outcome(GenerationOutcome::from_error(&error).as_str());
                    span.finish();
                }
                tracing::warn!(error = %error, "digest generation failed");
                Some((Err(error), self))
            }
            None => {
                let digest = self.complete();
                Some((Ok(DigestEvent::Completed(Box::new(digest))), self))
            }
        }
    }

    fn complete(&mut self) -> Digest {
        let raw = std::mem::take(&mut self.raw);
        let articles = std::mem::take(&mut self.articles);
        let sections = self.processor.process(&raw, &articles);

        let fallbacks = sections
            .iter()
            .filter(|s| s.origin == SectionOrigin::Fallback)
            .count();
        self.metrics
            .record_digest(sections.len() - fallbacks, fallbacks);
        if let Some(span) = self.span.take() {
            span.record_sections(sections.len(), fallbacks);
            span.record_outcome(GenerationOutcome::Success.as_str());
            let latency_ms = span.finish();
            tracing::info!(
                sections = sections.len(),
                fallbacks,
                latency_ms,
                "digest generated"
            );
        }
        Digest::new(raw, sections, articles)
    }
}

/// Turns candidate articles into a [`Digest`].
#[derive(Debug)]
pub struct DigestOrchestrator {
    engine: Arc<InferenceEngine>,
    settings: DigestSettings,
    prompts: DigestPromptBuilder,
    processor: DigestPostProcessor,
    options: GenerationOptions,
    spans: SpanContext,
}

impl DigestOrchestrator {
    pub fn new(engine: Arc<InferenceEngine>, settings: &DigestSettings) -> Self {
        let prompts = DigestPromptBuilder::new(Arc::clone(engine.config()))
            .max_paragraphs(settings.max_paragraphs);
        Self {
            engine,
            settings: settings.clone(),
            prompts,
            processor: DigestPostProcessor::new(ProcessorOptions::from_settings(settings)),
            options: GenerationOptions::default(),
            spans: SpanContext::new("digest"),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_processor(mut self, processor: DigestPostProcessor) -> Self {
        self.processor = processor;
        self
    }

    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &DigestSettings {
        &self.settings
    }

    /// Maximum articles per digest: the tier cap or the preferred count,
    /// whichever is lower.
    pub fn article_limit(&self) -> usize {
        self.engine
            .config()
            .max_articles_for_digest
            .min(self.settings.article_count)
    }

    /// Enabled categories only, duplicate titles dropped, newest first,
    /// capped at [`article_limit`](Self::article_limit).
    pub fn select_articles(&self, articles: Vec<Article>) -> Vec<Article> {
        let mut selected: Vec<Article> = articles
            .into_iter()
            .filter(|a| self.settings.is_enabled(a.category))
            .collect();
        selected.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let mut titles = HashSet::new();
        selected.retain(|a| titles.insert(a.title.trim().to_lowercase()));
        selected.truncate(self.article_limit());
        selected
    }

    /// Starts a digest run over `articles`.
    pub fn generate_digest(&self, articles: Vec<Article>) -> DigestRun {
        let articles = self.select_articles(articles);
        if articles.is_empty() {
            return DigestRun::failed(Error::NoArticles);
        }

        let state = RunState {
            phase: Phase::Pending,
            engine: Arc::clone(&self.engine),
            prompt: self.prompts.build(&articles),
            options: self.options.clone(),
            processor: self.processor.clone(),
            span: Some(self.spans.digest_span(articles.len())),
            metrics: Arc::clone(self.engine.metrics()),
            articles,
            raw: String::new(),
        };
        DigestRun {
            inner: stream::unfold(state, RunState::advance).boxed(),
        }
    }

    /// Drives a run to completion, handing each partial text to
    /// `on_partial`.
    pub async fn generate_digest_with<F>(
        &self,
        articles: Vec<Article>,
        mut on_partial: F,
    ) -> Result<Digest>
    where
        F: FnMut(&str),
    {
        let mut run = self.generate_digest(articles);
        while let Some(event) = run.next().await {
            match event? {
                DigestEvent::Started { articles } => {
                    tracing::debug!(articles, "digest run started");
                }
                DigestEvent::Partial(text) => on_partial(&text),
                DigestEvent::Completed(digest) => return Ok(*digest),
            }
        }
        Err(Error::generation_failed("digest run ended without a result"))
    }

    /// Cancels the generation in flight, if any.
    pub fn cancel(&self) {
        self.engine.cancel();
    }
}
