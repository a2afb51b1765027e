//! Title-based content for categories the model output could not supply.

use super::article::{Article, Category};

fn intros(category: Category) -> [&'static str; 3] {
    match category {
        Category::Technology => ["In technology", "From the tech world", "On the technology front"],
        Category::Business => ["In business", "From the markets", "On the business front"],
        Category::World => ["Around the world", "In world news", "From across the globe"],
        Category::Science => ["In science", "From the research world", "On the science front"],
        Category::Health => ["In health", "From the health desk", "On the health front"],
        Category::Sports => ["In sports", "From the sports world", "On the field"],
        Category::Entertainment => [
            "In entertainment",
            "From the entertainment world",
            "On screen and stage",
        ],
    }
}

fn clean_title(title: &str) -> &str {
    title.trim().trim_end_matches('.').trim_end()
}

/// One to three sentences naming the top titles and how many remain.
///
/// The intro phrase depends on the article count, so output is
/// deterministic for the same input.
pub fn synthesize(category: Category, articles: &[Article]) -> String {
    let titles: Vec<&str> = articles
        .iter()
        .map(|a| clean_title(&a.title))
        .filter(|t| !t.is_empty())
        .collect();

    let Some(first) = titles.first() else {
        return format!("No {} stories are available right now.", category.name());
    };

    let options = intros(category);
    let intro = options[titles.len() % options.len()];
    let mut text = format!("{}: {}.", intro, first);

    if let Some(second) = titles.get(1) {
        text.push_str(&format!(" Also reported: {}.", second));
    }
    let remaining = titles.len().saturating_sub(2);
    if remaining > 0 {
        text.push_str(&format!(
            " {} more {} in {}.",
            remaining,
            if remaining == 1 { "story" } else { "stories" },
            category.display_name()
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn articles(category: Category, titles: &[&str]) -> Vec<Article> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| Article::new(format!("a{i}"), *t, "Wire", category, Utc::now()))
            .collect()
    }

    #[test]
    fn test_single_title() {
        let text = synthesize(Category::Business, &articles(Category::Business, &["Rates held."]));
        assert_eq!(text, "From the markets: Rates held.");
    }

    #[test]
    fn test_many_titles() {
        let list = articles(
            Category::World,
            &["Summit opens", "Talks resume", "Storm nears coast", "Election called"],
        );
        assert_eq!(
            synthesize(Category::World, &list),
            "In world news: Summit opens. Also reported: Talks resume. 2 more stories in World."
        );
    }

    #[test]
    fn test_intro_varies_with_count() {
        let two = synthesize(Category::Science, &articles(Category::Science, &["A", "B"]));
        let three = synthesize(Category::Science, &articles(Category::Science, &["A", "B", "C"]));
        assert!(two.starts_with("On the science front"));
        assert!(three.starts_with("In science"));
        assert!(three.ends_with("1 more story in Science."));
    }
}
