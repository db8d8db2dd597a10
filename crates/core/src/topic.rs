use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};

use crate::models::Topic;

/// Words that carry no subject meaning and are ignored when comparing topics.
const FILLER_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "basics", "fundamentals", "introduction", "intro",
];

/// Minimum length ratio between two normalized names for a fuzzy match.
const LENGTH_RATIO_THRESHOLD: f64 = 0.8;

/// Normalizes a topic name for comparison: lower-cased, punctuation removed,
/// filler words dropped and the remaining words sorted.
pub fn normalize(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| !FILLER_WORDS.contains(w))
        .collect();
    words.sort_unstable();
    words.join(" ")
}

/// Whether two topic names refer to the same subject.
///
/// Names match when their normalized forms are equal, or when the shorter
/// one fuzzily matches the longer one and they are of similar length
/// ("fraction" and "fractions" match, "math" and "mathematics" do not).
/// Names made only of filler words must match exactly, ignoring case.
pub fn is_same_topic(a: &str, b: &str) -> bool {
    let (raw_a, raw_b) = (a, b);
    let (a, b) = (normalize(a), normalize(b));
    if a.is_empty() || b.is_empty() {
        return raw_a.trim().to_lowercase() == raw_b.trim().to_lowercase();
    }
    if a == b {
        return true;
    }

    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if (shorter.len() as f64) / (longer.len() as f64) < LENGTH_RATIO_THRESHOLD {
        return false;
    }
    SkimMatcherV2::default()
        .fuzzy_match(longer, shorter)
        .is_some()
}

/// Finds the user's existing topic matching `name`, if any.
pub fn find_matching<'a>(topics: &'a [Topic], name: &str) -> Option<&'a Topic> {
    topics.iter().find(|t| is_same_topic(&t.name, name))
}

/// Cleans up a free-text topic selection such as "I'd like to work on fractions."
/// down to the topic name itself.
pub fn extract_topic_name(text: &str) -> String {
    const PREFIXES: &[&str] = &[
        "i'd like to work on",
        "i would like to work on",
        "i want to work on",
        "i want to learn about",
        "i want to learn",
        "let's work on",
        "let's do",
        "let's study",
        "teach me about",
        "teach me",
        "help me with",
    ];

    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();
    let rest = PREFIXES
        .iter()
        .find_map(|p| {
            if lowered.starts_with(p) {
                trimmed.get(p.len()..)
            } else {
                None
            }
        })
        .unwrap_or(trimmed);
    rest.trim()
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_string()
}
