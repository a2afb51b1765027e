//! Digest domain: articles, categories, prompting, post-processing and the
//! orchestration that ties them to the inference engine.

mod article;
mod contamination;
mod dedup;
mod fallback;
mod markers;
mod orchestrator;
mod processor;
mod prompt;
mod section;
mod service;
mod store;

pub use article::{Article, Category};
pub use contamination::{foreign_mentions, is_contaminated};
pub use dedup::{cap_paragraphs, deduplicate, significant_words, word_overlap};
pub use fallback::synthesize;
pub use markers::{
    LocatedMarker, MARKER_FORMS, MarkerKind, MarkerPattern, MarkerTable, strip_residual_markup,
};
pub use orchestrator::{DigestEvent, DigestOrchestrator, DigestRun};
pub use processor::{DigestPostProcessor, FallbackReason, ProcessorOptions};
pub use prompt::{DIGEST_INSTRUCTIONS, DigestPrompt, DigestPromptBuilder};
pub use section::{Digest, DigestSection, MAX_RELATED_ARTICLES, SectionOrigin};
pub use service::DigestService;
pub use store::{ArticleStore, DigestSink, InMemoryArticleStore, InMemoryDigestSink};
