//! News categories and source articles.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Categories, declared in digest priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Technology,
    Business,
    World,
    Science,
    Health,
    Sports,
    Entertainment,
}

impl Category {
    /// Every category in priority order.
    pub const ALL: [Category; 7] = [
        Category::Technology,
        Category::Business,
        Category::World,
        Category::Science,
        Category::Health,
        Category::Sports,
        Category::Entertainment,
    ];

    /// Lower-case canonical name, as matched in model output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::Business => "business",
            Self::World => "world",
            Self::Science => "science",
            Self::Health => "health",
            Self::Sports => "sports",
            Self::Entertainment => "entertainment",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Technology => "Technology",
            Self::Business => "Business",
            Self::World => "World",
            Self::Science => "Science",
            Self::Health => "Health",
            Self::Sports => "Sports",
            Self::Entertainment => "Entertainment",
        }
    }

    /// 0 is the highest priority.
    pub fn priority(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::Config(format!("unknown category: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub source: String,
    pub category: Category,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Article {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source: impl Into<String>,
        category: Category,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source: source.into(),
            category,
            published_at,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_matches_declaration() {
        let mut sorted = Category::ALL;
        sorted.sort();
        assert_eq!(sorted, Category::ALL);
        assert_eq!(Category::Technology.priority(), 0);
        assert_eq!(Category::Entertainment.priority(), 6);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!("World".parse::<Category>().unwrap(), Category::World);
        assert_eq!(" sports ".parse::<Category>().unwrap(), Category::Sports);
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn test_article_serde() {
        let article = Article::new(
            "a1",
            "Chipmaker unveils new fab",
            "Wire",
            Category::Technology,
            DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["category"], "technology");
        assert!(json.get("summary").is_none());
        let back: Article = serde_json::from_value(json).unwrap();
        assert_eq!(back, article);
    }
}
