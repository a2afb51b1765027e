//! Category marker patterns.
//!
//! Small models label sections in many ways. Each form is a row in
//! [`MARKER_FORMS`], most specific first; the first form that matches a
//! category anywhere in the text decides where that category starts.

use std::sync::OnceLock;

use regex::Regex;

use super::article::Category;

/// Shape of a category marker in model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// `1. **Technology**`
    NumberedBold,
    /// `## Technology`, or `## Technology:` followed by text
    Heading,
    /// `**Technology:**` or `**Technology**:`
    BoldColon,
    /// `**Technology**`
    Bold,
    /// `[Technology]`
    Bracket,
    /// `Technology:` at the start of a line
    BareColon,
    /// `- Technology` at the start of a line
    ListBullet,
}

/// `{name}` expands to the escaped category name with an optional "news".
pub const MARKER_FORMS: &[(MarkerKind, &str)] = &[
    (
        MarkerKind::NumberedBold,
        r"(?im)^[ \t]*\d+[.)][ \t]*\*\*{name}(?::\*\*|\*\*[ \t]*:?)[ \t]*",
    ),
    (
        MarkerKind::Heading,
        r"(?im)^[ \t]*#{1,6}[ \t]*(?:\*\*)?{name}(?:\*\*)?[ \t]*(?::[ \t]*|$)",
    ),
    (
        MarkerKind::BoldColon,
        r"(?i)\*\*{name}(?::\*\*|\*\*[ \t]*:)[ \t]*",
    ),
    (MarkerKind::Bold, r"(?i)\*\*{name}\*\*[ \t]*"),
    (MarkerKind::Bracket, r"(?i)\[{name}\][ \t]*:?[ \t]*"),
    (MarkerKind::BareColon, r"(?im)^[ \t]*{name}[ \t]*:[ \t]*"),
    (
        MarkerKind::ListBullet,
        r"(?im)^[ \t]*[-*•][ \t]+(?:\*\*)?{name}(?:\*\*)?[ \t]*(?::[ \t]*|$)",
    ),
];

fn name_pattern(names: &str) -> String {
    format!(r"(?:{})(?:[ \t]+news)?", names)
}

#[derive(Debug)]
pub struct MarkerPattern {
    pub category: Category,
    pub kind: MarkerKind,
    regex: Regex,
}

/// A marker found in text. `start..end` covers the marker itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedMarker {
    pub category: Category,
    pub kind: MarkerKind,
    pub start: usize,
    pub end: usize,
}

/// Compiled marker forms for every category.
#[derive(Debug)]
pub struct MarkerTable {
    patterns: Vec<MarkerPattern>,
}

impl MarkerTable {
    /// The built-in table, compiled once.
    pub fn standard() -> &'static MarkerTable {
        static TABLE: OnceLock<MarkerTable> = OnceLock::new();
        TABLE.get_or_init(|| MarkerTable::compile(MARKER_FORMS).expect("valid marker patterns"))
    }

    pub fn compile(forms: &[(MarkerKind, &str)]) -> Result<Self, regex::Error> {
        let mut patterns = Vec::with_capacity(forms.len() * Category::ALL.len());
        for category in Category::ALL {
            let name = name_pattern(&regex::escape(category.name()));
            for (kind, form) in forms {
                patterns.push(MarkerPattern {
                    category,
                    kind: *kind,
                    regex: Regex::new(&form.replace("{name}", &name))?,
                });
            }
        }
        Ok(Self { patterns })
    }

    /// Patterns for `category`, in match order.
    pub fn patterns_for(&self, category: Category) -> impl Iterator<Item = &MarkerPattern> {
        self.patterns.iter().filter(move |p| p.category == category)
    }

    /// First match of the first form that matches `category` anywhere.
    pub fn find(&self, category: Category, text: &str) -> Option<LocatedMarker> {
        self.patterns_for(category).find_map(|pattern| {
            pattern.regex.find(text).map(|m| LocatedMarker {
                category,
                kind: pattern.kind,
                start: m.start(),
                end: m.end(),
            })
        })
    }

    /// Markers for every category found in `text`, sorted by offset.
    pub fn locate(&self, text: &str) -> Vec<LocatedMarker> {
        let mut found: Vec<LocatedMarker> = Category::ALL
            .into_iter()
            .filter_map(|category| self.find(category, text))
            .collect();
        found.sort_by_key(|m| (m.start, m.category));
        found
    }
}

struct ResidualPatterns {
    markup: Vec<Regex>,
    dangling_list_item: Regex,
    blank_runs: Regex,
}

fn residual_patterns() -> &'static ResidualPatterns {
    static PATTERNS: OnceLock<ResidualPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let names = Category::ALL
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join("|");
        let name = name_pattern(&names);
        let markup = [
            format!(r"(?i)\*\*{name}(?::\*\*|\*\*:?)"),
            format!(r"(?im)^[ \t]*#{{1,6}}[ \t]*{name}[ \t]*(?::|[ \t]*$)"),
            format!(r"(?i)\[{name}\]:?"),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid residual markup pattern"))
        .collect();

        ResidualPatterns {
            markup,
            dangling_list_item: Regex::new(r"(?m)^[ \t]*(?:[-*•]|\d+[.)])[ \t]*$")
                .expect("valid list item pattern"),
            blank_runs: Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank run pattern"),
        }
    })
}

/// Removes category markup that leaked into an extracted span.
pub fn strip_residual_markup(span: &str) -> String {
    let patterns = residual_patterns();
    let mut text = span.to_string();
    for pattern in &patterns.markup {
        text = pattern.replace_all(&text, "").into_owned();
    }
    text = patterns.dangling_list_item.replace_all(&text, "").into_owned();
    text = patterns.blank_runs.replace_all(&text, "\n\n").into_owned();
    text.trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_bold_beats_bold() {
        let text = "Intro\n1. **Technology**: Chips got faster.";
        let marker = MarkerTable::standard()
            .find(Category::Technology, text)
            .unwrap();
        assert_eq!(marker.kind, MarkerKind::NumberedBold);
        assert_eq!(marker.start, "Intro\n".len());
        assert_eq!(&text[marker.end..], "Chips got faster.");
    }

    #[test]
    fn test_heading_and_case_insensitive() {
        let text = "## WORLD NEWS\nLeaders met.";
        let marker = MarkerTable::standard().find(Category::World, text).unwrap();
        assert_eq!(marker.kind, MarkerKind::Heading);
        assert_eq!(text[marker.end..].trim(), "Leaders met.");
    }

    #[test]
    fn test_heading_with_inline_text() {
        let table = MarkerTable::standard();
        let text = "## Technology: Chips got faster this quarter.\n\n## World: Leaders met in Geneva.";

        let tech = table.find(Category::Technology, text).unwrap();
        assert_eq!(tech.kind, MarkerKind::Heading);
        assert_eq!(tech.start, 0);
        assert!(text[tech.end..].starts_with("Chips got faster"));

        let world = table.find(Category::World, text).unwrap();
        assert_eq!(world.kind, MarkerKind::Heading);
        assert_eq!(&text[world.end..], "Leaders met in Geneva.");

        assert!(table.find(Category::Technology, "## Technology trends\nA.").is_none());
    }

    #[test]
    fn test_bold_colon_forms() {
        for text in ["**Science:** Comet seen.", "**Science**: Comet seen."] {
            let marker = MarkerTable::standard().find(Category::Science, text).unwrap();
            assert_eq!(marker.kind, MarkerKind::BoldColon);
            assert_eq!(&text[marker.end..], "Comet seen.");
        }
    }

    #[test]
    fn test_bare_forms() {
        let table = MarkerTable::standard();
        assert_eq!(
            table.find(Category::Health, "[Health] Sleep matters.").unwrap().kind,
            MarkerKind::Bracket
        );
        assert_eq!(
            table.find(Category::Sports, "Sports: Final tonight.").unwrap().kind,
            MarkerKind::BareColon
        );
        assert_eq!(
            table.find(Category::Business, "- Business\nRates held.").unwrap().kind,
            MarkerKind::ListBullet
        );
        assert!(table.find(Category::Business, "business as usual").is_none());
    }

    #[test]
    fn test_locate_sorts_by_offset() {
        let text = "## World\nA.\n\n**Technology**\nB.";
        let found = MarkerTable::standard().locate(text);
        let order: Vec<Category> = found.iter().map(|m| m.category).collect();
        assert_eq!(order, vec![Category::World, Category::Technology]);
    }

    #[test]
    fn test_every_category_has_every_form() {
        let table = MarkerTable::standard();
        for category in Category::ALL {
            let kinds: Vec<MarkerKind> = table.patterns_for(category).map(|p| p.kind).collect();
            let expected: Vec<MarkerKind> = MARKER_FORMS.iter().map(|(k, _)| *k).collect();
            assert_eq!(kinds, expected);
        }
    }

    #[test]
    fn test_strip_residual_markup() {
        let span = ":\n**Technology**\nChips got faster.\n\n\n\n2.\n";
        assert_eq!(strip_residual_markup(span), "Chips got faster.");

        let span = " [World]: Talks resumed.\n## Business\n";
        assert_eq!(strip_residual_markup(span), "Talks resumed.");
    }
}
