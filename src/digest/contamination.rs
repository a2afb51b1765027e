//! Detection of spans that mix several categories.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::article::Category;

fn subject_mention() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = Category::ALL
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(
            r"(?i)\b({names})\s+(?:news|reports?|updates?|coverage|sector|analysis|developments?)\b"
        ))
        .expect("valid subject mention pattern")
    })
}

/// Other categories named as a subject ("health report", "business news")
/// inside a span that belongs to `category`.
pub fn foreign_mentions(span: &str, category: Category) -> BTreeSet<Category> {
    subject_mention()
        .captures_iter(span)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<Category>().ok())
        .filter(|mentioned| *mentioned != category)
        .collect()
}

/// Whether at least `threshold` other categories are mentioned as subjects.
pub fn is_contaminated(span: &str, category: Category, threshold: usize) -> bool {
    foreign_mentions(span, category).len() >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_foreign_subjects_contaminate() {
        let span = "Chip sales rose. Business news reveals a merger, and a health report shows gains.";
        let found = foreign_mentions(span, Category::Technology);
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec![Category::Business, Category::Health]
        );
        assert!(is_contaminated(span, Category::Technology, 2));
    }

    #[test]
    fn test_own_category_and_repeats_do_not_count() {
        let span = "Technology news: chips. Business news one. Business update two.";
        assert_eq!(foreign_mentions(span, Category::Technology).len(), 1);
        assert!(!is_contaminated(span, Category::Technology, 2));
    }

    #[test]
    fn test_plain_mentions_ignored() {
        let span = "The world watched as science advanced.";
        assert!(foreign_mentions(span, Category::Health).is_empty());
    }
}
