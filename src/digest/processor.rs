//! Turns raw model output into one section per category.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::article::{Article, Category};
use super::contamination::is_contaminated;
use super::dedup::{cap_paragraphs, deduplicate};
use super::fallback::synthesize;
use super::markers::{MarkerTable, strip_residual_markup};
use super::section::{DigestSection, MAX_RELATED_ARTICLES, SectionOrigin};
use crate::config::DigestSettings;
use crate::config::settings::{
    DEFAULT_CONTAMINATION_THRESHOLD, DEFAULT_MAX_PARAGRAPHS, DEFAULT_OVERLAP_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessorOptions {
    pub max_paragraphs: usize,
    /// Overlap strictly above this drops a paragraph or sentence.
    pub overlap_threshold: f64,
    /// This many other-category subject mentions reject a span.
    pub contamination_threshold: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            max_paragraphs: DEFAULT_MAX_PARAGRAPHS,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            contamination_threshold: DEFAULT_CONTAMINATION_THRESHOLD,
        }
    }
}

impl ProcessorOptions {
    pub fn from_settings(settings: &DigestSettings) -> Self {
        Self {
            max_paragraphs: settings.max_paragraphs,
            overlap_threshold: settings.overlap_threshold,
            contamination_threshold: settings.contamination_threshold,
        }
    }
}

/// Why a category's parsed span was not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoMarker,
    EmptySpan,
    CrossContamination,
    DuplicateContent,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMarker => "no marker",
            Self::EmptySpan => "empty span",
            Self::CrossContamination => "cross-category contamination",
            Self::DuplicateContent => "content reused from another category",
        }
    }
}

/// Segments, cleans and deduplicates model output.
///
/// Never fails: every category with source articles gets a section, from
/// the model output when it can be trusted and from article titles
/// otherwise. Output is ordered by category priority and is a pure function
/// of the inputs.
#[derive(Debug, Clone)]
pub struct DigestPostProcessor {
    options: ProcessorOptions,
    markers: &'static MarkerTable,
}

impl Default for DigestPostProcessor {
    fn default() -> Self {
        Self::new(ProcessorOptions::default())
    }
}

impl DigestPostProcessor {
    pub fn new(options: ProcessorOptions) -> Self {
        Self {
            options,
            markers: MarkerTable::standard(),
        }
    }

    pub fn with_markers(mut self, markers: &'static MarkerTable) -> Self {
        self.markers = markers;
        self
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// CRLF to LF and `<digest>` wrapper tags removed.
    pub fn normalize(raw: &str) -> String {
        raw.replace("\r\n", "\n")
            .replace("<digest>", "")
            .replace("</digest>", "")
    }

    pub fn process(&self, raw: &str, articles: &[Article]) -> Vec<DigestSection> {
        let mut by_category: BTreeMap<Category, Vec<Article>> = BTreeMap::new();
        for article in articles {
            by_category
                .entry(article.category)
                .or_default()
                .push(article.clone());
        }
        if by_category.is_empty() {
            return Vec::new();
        }

        let text = Self::normalize(raw);
        let spans = self.spans(&text);
        let highlight = highlight_category(&by_category);

        let mut used: Vec<(Category, String)> = Vec::new();
        let mut sections = Vec::with_capacity(by_category.len());
        for (category, sources) in by_category {
            let span = spans.get(&category).copied();
            let (content, origin) = match self.extract(category, span, &used) {
                Ok(content) => {
                    used.push((category, reuse_key(&content)));
                    (content, SectionOrigin::Parsed)
                }
                Err(reason) => {
                    tracing::info!(
                        category = category.name(),
                        reason = reason.as_str(),
                        "using title fallback"
                    );
                    (synthesize(category, &sources), SectionOrigin::Fallback)
                }
            };

            sections.push(DigestSection {
                id: DigestSection::section_id(category),
                title: category.display_name().to_string(),
                content: cap_paragraphs(&content, self.options.max_paragraphs),
                category: Some(category),
                related_articles: sources.into_iter().take(MAX_RELATED_ARTICLES).collect(),
                is_highlight: Some(category) == highlight,
                origin,
            });
        }

        tracing::debug!(
            sections = sections.len(),
            fallbacks = sections.iter().filter(|s| s.is_fallback()).count(),
            "digest post-processed"
        );
        sections
    }

    /// Content span per category: from the end of its marker to the start of
    /// the next marker by offset.
    fn spans<'t>(&self, text: &'t str) -> HashMap<Category, &'t str> {
        let markers = self.markers.locate(text);
        markers
            .iter()
            .enumerate()
            .map(|(i, marker)| {
                let end = markers
                    .get(i + 1)
                    .map_or(text.len(), |next| next.start)
                    .max(marker.end);
                (marker.category, &text[marker.end..end])
            })
            .collect()
    }

    fn extract(
        &self,
        category: Category,
        span: Option<&str>,
        used: &[(Category, String)],
    ) -> Result<String, FallbackReason> {
        let span = span.ok_or(FallbackReason::NoMarker)?;

        let cleaned = strip_residual_markup(span);
        if cleaned.is_empty() {
            return Err(FallbackReason::EmptySpan);
        }
        if is_contaminated(&cleaned, category, self.options.contamination_threshold) {
            return Err(FallbackReason::CrossContamination);
        }

        let deduped = deduplicate(&cleaned, self.options.overlap_threshold);
        if deduped.trim().is_empty() {
            return Err(FallbackReason::EmptySpan);
        }

        let key = reuse_key(&deduped);
        if used.iter().any(|(other, k)| *other != category && *k == key) {
            return Err(FallbackReason::DuplicateContent);
        }
        Ok(deduped)
    }
}

/// Lower-cased with whitespace collapsed.
fn reuse_key(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Most source articles wins; ties go to the higher-priority category.
fn highlight_category(by_category: &BTreeMap<Category, Vec<Article>>) -> Option<Category> {
    let mut best: Option<(Category, usize)> = None;
    for (category, sources) in by_category {
        if best.is_none_or(|(_, count)| sources.len() > count) {
            best = Some((*category, sources.len()));
        }
    }
    best.map(|(category, _)| category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn article(id: usize, category: Category, title: &str) -> Article {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        Article::new(
            format!("a{id}"),
            title,
            "Wire",
            category,
            base + Duration::minutes(id as i64),
        )
    }

    fn sources(entries: &[(Category, &str)]) -> Vec<Article> {
        entries
            .iter()
            .enumerate()
            .map(|(i, (c, t))| article(i, *c, t))
            .collect()
    }

    #[test]
    fn test_sections_only_for_populated_categories() {
        let raw = "**Technology**\nChips got faster.\n\n## World\nLeaders met in Geneva.";
        let articles = sources(&[
            (Category::Technology, "Chip launch"),
            (Category::World, "Geneva summit"),
        ]);

        let sections = DigestPostProcessor::default().process(raw, &articles);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content, "Chips got faster.");
        assert_eq!(sections[1].content, "Leaders met in Geneva.");
        assert!(sections.iter().all(|s| s.origin == SectionOrigin::Parsed));
    }

    #[test]
    fn test_headings_with_inline_text_are_parsed() {
        let raw = "## Technology: Chips got faster this quarter.\n\n## World: Leaders met in Geneva.";
        let articles = sources(&[
            (Category::Technology, "Chip launch"),
            (Category::World, "Summit"),
        ]);

        let sections = DigestPostProcessor::default().process(raw, &articles);
        assert_eq!(sections[0].content, "Chips got faster this quarter.");
        assert_eq!(sections[1].content, "Leaders met in Geneva.");
        assert!(sections.iter().all(|s| s.origin == SectionOrigin::Parsed));
    }

    #[test]
    fn test_missing_marker_falls_back_to_titles() {
        let raw = "**Technology**\nChips got faster.\n\n## World\nLeaders met in Geneva.";
        let articles = sources(&[
            (Category::Technology, "Chip launch"),
            (Category::Business, "Rates held steady"),
            (Category::World, "Geneva summit"),
        ]);

        let sections = DigestPostProcessor::default().process(raw, &articles);
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["section-technology", "section-business", "section-world"]);
        assert_eq!(sections[1].origin, SectionOrigin::Fallback);
        assert!(sections[1].content.contains("Rates held steady"));
    }

    #[test]
    fn test_contaminated_span_rejected() {
        let raw = "**Technology**\nBusiness news reveals record profits while a health report shows \
                   rising costs.\n\n## World\nLeaders met.";
        let articles = sources(&[
            (Category::Technology, "Chip launch"),
            (Category::World, "Geneva summit"),
        ]);

        let sections = DigestPostProcessor::default().process(raw, &articles);
        assert_eq!(sections[0].origin, SectionOrigin::Fallback);
        assert!(sections[0].content.contains("Chip launch"));
        assert_eq!(sections[1].origin, SectionOrigin::Parsed);
    }

    #[test]
    fn test_echoed_paragraph_not_reused() {
        let raw = "**Technology**\nMarkets rallied on strong earnings.\n\n\
                   **Business**\nMarkets rallied on strong earnings.";
        let articles = sources(&[
            (Category::Technology, "Chip launch"),
            (Category::Business, "Earnings season"),
        ]);

        let sections = DigestPostProcessor::default().process(raw, &articles);
        assert_eq!(sections[0].origin, SectionOrigin::Parsed);
        assert_eq!(sections[1].origin, SectionOrigin::Fallback);
    }

    #[test]
    fn test_paragraph_cap_and_dedup() {
        let raw = "## Science\nComet spotted near Mars today.\n\n\
                   Comet spotted near Mars yesterday.\n\n\
                   Telescope upgrades finished.\n\n\
                   Funding for rovers approved.\n\n\
                   Ocean probes launched successfully.";
        let articles = sources(&[(Category::Science, "Comet")]);
        let options = ProcessorOptions {
            max_paragraphs: 2,
            ..ProcessorOptions::default()
        };

        let sections = DigestPostProcessor::new(options).process(raw, &articles);
        assert_eq!(
            sections[0].content,
            "Comet spotted near Mars today.\n\nTelescope upgrades finished."
        );
    }

    #[test]
    fn test_garbage_output_degrades_gracefully() {
        let articles = sources(&[
            (Category::Sports, "Final tonight"),
            (Category::Health, "Sleep study"),
        ]);
        for raw in ["", "\u{0}\u{1}**", "## \n\n\n**", "**Sports**"] {
            let sections = DigestPostProcessor::default().process(raw, &articles);
            assert_eq!(sections.len(), 2);
            assert!(sections.iter().all(|s| !s.content.is_empty()));
        }
    }

    #[test]
    fn test_highlight_most_articles_then_priority() {
        let articles = sources(&[
            (Category::World, "a"),
            (Category::World, "b"),
            (Category::Technology, "c"),
            (Category::Technology, "d"),
            (Category::Sports, "e"),
        ]);
        let sections = DigestPostProcessor::default().process("", &articles);
        let highlighted: Vec<Category> = sections
            .iter()
            .filter(|s| s.is_highlight)
            .filter_map(|s| s.category)
            .collect();
        assert_eq!(highlighted, vec![Category::Technology]);
    }

    #[test]
    fn test_related_articles_capped() {
        let articles = sources(&[
            (Category::World, "a"),
            (Category::World, "b"),
            (Category::World, "c"),
            (Category::World, "d"),
        ]);
        let sections = DigestPostProcessor::default().process("", &articles);
        assert_eq!(sections[0].related_articles.len(), 3);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            DigestPostProcessor::normalize("<digest>a\r\nb</digest>"),
            "a\nb"
        );
    }

    #[test]
    fn test_deterministic() {
        let raw = "1. **World**: Talks resumed.\n2. **Technology**: Chips got faster.";
        let articles = sources(&[
            (Category::Technology, "Chip launch"),
            (Category::World, "Talks"),
            (Category::Health, "Sleep study"),
        ]);
        let processor = DigestPostProcessor::default();
        let first = serde_json::to_string(&processor.process(raw, &articles)).unwrap();
        let second = serde_json::to_string(&processor.process(raw, &articles)).unwrap();
        assert_eq!(first, second);
    }
}
