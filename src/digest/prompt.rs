//! Prompt construction for digest generation.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use super::article::{Article, Category};
use crate::config::InferenceConfiguration;
use crate::config::settings::DEFAULT_MAX_PARAGRAPHS;

/// Instructions shared by every digest prompt. `{paragraphs}` and
/// `{categories}` are filled in per request.
pub const DIGEST_INSTRUCTIONS: &str = r#"You are a news editor writing a short daily digest.

Write one section for each of these categories, in this order: {categories}.

Rules:
- Start every section with the category name in bold on its own line, for example **Technology**.
- Under each heading write at most {paragraphs} short paragraphs covering only that category's articles.
- Do not mention other categories inside a section.
- Do not repeat the same sentence in more than one section.
- Do not invent facts that are not in the article list.
- End the digest with </digest>."#;

/// A ready-to-send digest prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPrompt {
    pub system: String,
    pub user: String,
    /// Estimated context use, including tokens reserved for the output.
    pub estimated_tokens: u32,
}

/// Builds the system and user prompts for a set of articles.
#[derive(Debug, Clone)]
pub struct DigestPromptBuilder {
    config: Arc<InferenceConfiguration>,
    max_paragraphs: usize,
}

impl DigestPromptBuilder {
    pub fn new(config: Arc<InferenceConfiguration>) -> Self {
        Self {
            config,
            max_paragraphs: DEFAULT_MAX_PARAGRAPHS,
        }
    }

    pub fn max_paragraphs(mut self, max_paragraphs: usize) -> Self {
        self.max_paragraphs = max_paragraphs.max(1);
        self
    }

    pub fn build(&self, articles: &[Article]) -> DigestPrompt {
        let grouped = group_by_category(articles);
        let categories: Vec<Category> = grouped.keys().copied().collect();

        let estimated_tokens = self.config.estimated_prompt_tokens(articles.len());
        if !self.config.fits_context(articles.len()) {
            tracing::warn!(
                articles = articles.len(),
                estimated_tokens,
                context = self.config.context_size,
                "digest prompt may not fit the context window"
            );
        }

        DigestPrompt {
            system: self.system_prompt(&categories),
            user: user_prompt(&grouped),
            estimated_tokens,
        }
    }

    pub fn system_prompt(&self, categories: &[Category]) -> String {
        let names = categories
            .iter()
            .map(|c| c.display_name())
            .collect::<Vec<_>>()
            .join(", ");
        DIGEST_INSTRUCTIONS
            .replace("{categories}", &names)
            .replace("{paragraphs}", &self.max_paragraphs.to_string())
    }
}

fn group_by_category(articles: &[Article]) -> BTreeMap<Category, Vec<&Article>> {
    let mut grouped: BTreeMap<Category, Vec<&Article>> = BTreeMap::new();
    for article in articles {
        grouped.entry(article.category).or_default().push(article);
    }
    grouped
}

/// Article lists per category, in priority order.
fn user_prompt(grouped: &BTreeMap<Category, Vec<&Article>>) -> String {
    let mut prompt = String::from("Today's articles by category:\n");
    for (category, articles) in grouped {
        let _ = write!(prompt, "\n{} ({}):\n", category.display_name(), articles.len());
        for article in articles {
            let _ = write!(prompt, "- {} ({})", article.title.trim(), article.source.trim());
            if let Some(summary) = article.summary.as_deref().map(str::trim)
                && !summary.is_empty()
            {
                let _ = write!(prompt, ": {}", summary);
            }
            prompt.push('\n');
        }
    }
    prompt.push_str("\nWrite the digest now.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceTier;
    use chrono::Utc;

    fn article(category: Category, title: &str) -> Article {
        Article::new(title.to_lowercase(), title, "Wire", category, Utc::now())
    }

    fn builder(tier: ResourceTier) -> DigestPromptBuilder {
        DigestPromptBuilder::new(Arc::new(InferenceConfiguration::for_tier(tier, 4)))
    }

    #[test]
    fn test_categories_listed_in_priority_order() {
        let articles = vec![
            article(Category::Sports, "Final tonight"),
            article(Category::Technology, "Chip launch"),
            article(Category::World, "Summit opens").with_summary("Leaders gather."),
        ];
        let prompt = builder(ResourceTier::High).build(&articles);

        assert!(prompt.system.contains("in this order: Technology, World, Sports."));
        let tech = prompt.user.find("Technology (1):").unwrap();
        let world = prompt.user.find("World (1):").unwrap();
        let sports = prompt.user.find("Sports (1):").unwrap();
        assert!(tech < world && world < sports);
        assert!(prompt.user.contains("- Summit opens (Wire): Leaders gather."));
        assert!(prompt.user.contains("- Chip launch (Wire)\n"));
    }

    #[test]
    fn test_instructions_name_marker_and_terminator() {
        let prompt = builder(ResourceTier::High)
            .max_paragraphs(2)
            .build(&[article(Category::Health, "Sleep study")]);
        assert!(prompt.system.contains("**Technology**"));
        assert!(prompt.system.contains("at most 2 short paragraphs"));
        assert!(prompt.system.ends_with("</digest>."));
    }

    #[test]
    fn test_token_estimate() {
        let articles: Vec<Article> = (0..5)
            .map(|i| article(Category::World, &format!("Story {i}")))
            .collect();
        let prompt = builder(ResourceTier::Constrained).build(&articles);
        assert_eq!(prompt.estimated_tokens, 5 * 175 + 1500);
    }
}
