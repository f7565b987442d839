//! Keyword intent mapping for conversational media interactions.

use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

/// Canonical intent emitted when the speaker asks for recommendations.
pub const MEDIA_RECOMMEND: &str = "media_recommend";
/// Canonical intent emitted when the speaker requests a previous offer.
pub const MEDIA_REQUEST: &str = "media_request";
/// Canonical intent emitted when the speaker saves an offer to a list.
pub const MEDIA_ADD_TO_LIST: &str = "media_add_to_list";

const RECOMMEND_PHRASES: &[&str] = &[
    "what should i watch",
    "recommend something",
    "suggest a show",
    "suggest something",
    "recommend a movie",
];

static REQUEST_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"add (?:number\s*)?(?P<num>[123])").expect("request-number pattern")
});
static REQUEST_ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)add the (?P<word>first|second|third)").expect("request-ordinal pattern")
});
static REQUEST_THAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"add that").expect("request-that pattern"));

static ADD_LIST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"add (?:it|that) to my list",
        r"save (?:it|that)",
        r"add to my list",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("add-list pattern"))
    .collect()
});

/// Map an ordinal word to its 1-based pick index.
#[must_use]
pub fn ordinal_pick(word: &str) -> Option<i64> {
    match word.to_lowercase().as_str() {
        "first" => Some(1),
        "second" => Some(2),
        "third" => Some(3),
        _ => None,
    }
}

/// Return the canonical media intent and extracted slots for `text`,
/// or `None` when the text is not a media phrase.
#[must_use]
pub fn detect_media_intent(text: &str) -> Option<(&'static str, Map<String, Value>)> {
    let lowered = text.to_lowercase();
    let lowered = lowered.trim();
    if lowered.is_empty() {
        return None;
    }

    if RECOMMEND_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        return Some((MEDIA_RECOMMEND, Map::new()));
    }

    if let Some(captures) = REQUEST_NUMBER.captures(lowered) {
        let pick = captures["num"].parse::<i64>().unwrap_or(1);
        let mut slots = Map::new();
        slots.insert("pick".to_owned(), json!(pick));
        return Some((MEDIA_REQUEST, slots));
    }
    if let Some(captures) = REQUEST_ORDINAL.captures(lowered) {
        let pick = ordinal_pick(&captures["word"]).unwrap_or(1);
        let mut slots = Map::new();
        slots.insert("pick".to_owned(), json!(pick));
        return Some((MEDIA_REQUEST, slots));
    }
    if REQUEST_THAT.is_match(lowered) {
        let mut slots = Map::new();
        slots.insert("pick".to_owned(), json!(1));
        return Some((MEDIA_REQUEST, slots));
    }

    if ADD_LIST_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(lowered))
    {
        let mut slots = Map::new();
        slots.insert("pick".to_owned(), json!(1));
        return Some((MEDIA_ADD_TO_LIST, slots));
    }

    None
}
