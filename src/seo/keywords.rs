//! Keyword extraction for pages without curated keywords.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Number of keywords returned.
pub const MAX_KEYWORDS: usize = 10;

const STOP_WORDS: [&str; 12] = [
    "this", "that", "with", "from", "have", "they", "will", "what", "when", "where", "which",
    "their",
];

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid non-word pattern"));

/// Most frequent meaningful words in `content`, falling back to `defaults`
/// when there is no content.
///
/// Words are lowercased with punctuation stripped; words of three characters
/// or fewer and common stop words are skipped. Equal counts keep the order
/// of first appearance.
pub fn generate_keywords(content: Option<&str>, defaults: &[String]) -> Vec<String> {
    let content = match content.map(str::trim) {
        Some(content) if !content.is_empty() => content,
        _ => return defaults.to_vec(),
    };

    let cleaned = NON_WORD.replace_all(&content.to_lowercase(), "").into_owned();
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in cleaned.split_whitespace() {
        if word.chars().count() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        let count = counts.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    // Stable sort keeps first-appearance order among equal counts
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_order_with_stable_ties() {
        let keywords = generate_keywords(
            Some("Blender blades spin. The blender is loud, blades are sharp! Motor hums."),
            &[],
        );
        assert_eq!(
            keywords,
            vec!["blender", "blades", "spin", "loud", "sharp", "motor", "hums"]
        );
    }

    #[test]
    fn test_stop_words_and_short_words_skipped() {
        let keywords = generate_keywords(Some("This is what they will have with their cat"), &[]);
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_at_most_ten() {
        let text = (0..20).map(|i| format!("word{i:02}")).collect::<Vec<_>>().join(" ");
        assert_eq!(generate_keywords(Some(&text), &[]).len(), MAX_KEYWORDS);
    }

    #[test]
    fn test_missing_content_uses_defaults() {
        let defaults = vec!["product reviews".to_string()];
        assert_eq!(generate_keywords(None, &defaults), defaults);
        assert_eq!(generate_keywords(Some("   "), &defaults), defaults);
    }
}
