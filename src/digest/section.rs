//! Digest output values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::article::{Article, Category};

/// At most this many source articles are attached to a section.
pub const MAX_RELATED_ARTICLES: usize = 3;

/// Where a section's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionOrigin {
    /// Extracted from the model output.
    Parsed,
    /// Synthesised from source article titles.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSection {
    /// `section-<category>`; stable across runs.
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: Option<Category>,
    pub related_articles: Vec<Article>,
    pub is_highlight: bool,
    pub origin: SectionOrigin,
}

impl DigestSection {
    pub fn section_id(category: Category) -> String {
        format!("section-{}", category.name())
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == SectionOrigin::Fallback
    }
}

/// A finished digest, as handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Model output exactly as generated.
    pub raw_text: String,
    pub sections: Vec<DigestSection>,
    pub source_articles: Vec<Article>,
}

impl Digest {
    pub fn new(raw_text: String, sections: Vec<DigestSection>, source_articles: Vec<Article>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            raw_text,
            sections,
            source_articles,
        }
    }

    pub fn highlight(&self) -> Option<&DigestSection> {
        self.sections.iter().find(|s| s.is_highlight)
    }

    pub fn section(&self, category: Category) -> Option<&DigestSection> {
        self.sections
            .iter()
            .find(|s| s.category == Some(category))
    }

    pub fn fallback_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_fallback()).count()
    }
}
