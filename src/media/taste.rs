//! Lightweight taste profiling and candidate scoring.
//!
//! A profile is a probability distribution over weighted viewing features
//! (genres, networks, pacing, release era) built from recent history.
//! Candidates score by summing the profile weight of the features they
//! exhibit.

use super::HistoryItem;
use std::collections::{BTreeSet, HashMap};

/// Feature name -> normalized weight.
pub type FeatureWeights = HashMap<String, f64>;

const GENRE_WEIGHT: f64 = 1.0;
const NETWORK_WEIGHT: f64 = 0.5;
const PACE_WEIGHT: f64 = 0.4;
const YEAR_WEIGHT: f64 = 0.6;

/// Household viewing preference model.
#[derive(Debug, Clone, Default)]
pub struct TasteProfile {
    profile: FeatureWeights,
}

impl TasteProfile {
    /// Build a profile from the most recent `max_items` history entries.
    #[must_use]
    pub fn from_history(history: &[HistoryItem], max_items: usize) -> Self {
        let start = history.len().saturating_sub(max_items);
        let mut features: HashMap<String, f64> = HashMap::new();
        for item in &history[start..] {
            for (feature, weight) in item_features(item) {
                *features.entry(feature).or_insert(0.0) += weight;
            }
        }
        let total: f64 = features.values().sum();
        if total <= 0.0 {
            return Self::default();
        }
        let profile = features
            .into_iter()
            .map(|(feature, count)| (feature, count / total))
            .collect();
        Self { profile }
    }

    /// Whether the profile carries any evidence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profile.is_empty()
    }

    /// The normalized feature distribution.
    #[must_use]
    pub fn weights(&self) -> &FeatureWeights {
        &self.profile
    }

    /// Score a candidate by the distinct features it exhibits.
    ///
    /// An empty profile scores featureful candidates 0.5 and featureless
    /// ones 0.3, so cold-start recommendations still rank sensibly.
    #[must_use]
    pub fn score(&self, candidate_features: &BTreeSet<String>) -> f64 {
        if self.profile.is_empty() {
            return 0.5;
        }
        if candidate_features.is_empty() {
            return 0.3;
        }
        let sum: f64 = candidate_features
            .iter()
            .map(|feature| self.profile.get(feature).copied().unwrap_or(0.0))
            .sum();
        sum.clamp(0.0, 1.0)
    }

    /// Spoken rationale built from the two strongest matching features.
    #[must_use]
    pub fn explain(&self, candidate_features: &BTreeSet<String>) -> String {
        if self.profile.is_empty() {
            return "These are popular picks right now.".to_owned();
        }
        let mut scored: Vec<(f64, &String)> = candidate_features
            .iter()
            .filter_map(|feature| self.profile.get(feature).map(|w| (*w, feature)))
            .collect();
        if scored.is_empty() {
            return "It offers something a little different from your recent viewing.".to_owned();
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let phrases: Vec<String> = scored
            .iter()
            .take(2)
            .map(|(_, feature)| feature_phrase(feature))
            .collect();
        phrases.join(" and ")
    }
}

/// Weighted features contributed by one history item.
fn item_features(item: &HistoryItem) -> Vec<(String, f64)> {
    let mut features = Vec::new();
    for genre in &item.genres {
        features.push((format!("genre:{}", genre.to_lowercase()), GENRE_WEIGHT));
    }
    for network in &item.networks {
        features.push((format!("network:{}", network.to_lowercase()), NETWORK_WEIGHT));
    }
    if let Some(pace) = runtime_bucket(item.runtime) {
        features.push((format!("pace:{pace}"), PACE_WEIGHT));
    }
    if let Some(era) = release_bucket(item.release_year) {
        features.push((format!("year:{era}"), YEAR_WEIGHT));
    }
    features
}

/// Distinct feature keys a candidate exhibits.
#[must_use]
pub fn feature_keys(
    genres: &[String],
    networks: &[String],
    runtime: Option<u32>,
    release_year: Option<i32>,
) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for genre in genres {
        keys.insert(format!("genre:{}", genre.to_lowercase()));
    }
    for network in networks {
        keys.insert(format!("network:{}", network.to_lowercase()));
    }
    if let Some(pace) = runtime_bucket(runtime) {
        keys.insert(format!("pace:{pace}"));
    }
    if let Some(era) = release_bucket(release_year) {
        keys.insert(format!("year:{era}"));
    }
    keys
}

fn runtime_bucket(runtime: Option<u32>) -> Option<&'static str> {
    let minutes = runtime?;
    Some(match minutes {
        0..30 => "short",
        30..60 => "medium",
        60..110 => "feature",
        _ => "epic",
    })
}

fn release_bucket(year: Option<i32>) -> Option<&'static str> {
    let y = year?;
    Some(if y < 2000 {
        "classic"
    } else if y < 2010 {
        "mid"
    } else if y < 2020 {
        "recent"
    } else {
        "new"
    })
}

fn feature_phrase(feature: &str) -> String {
    let (kind, value) = feature.split_once(':').unwrap_or(("", feature));
    match kind {
        "genre" => format!("It leans into {} stories.", value.replace('-', " ")),
        "network" => format!("It comes from {}, a frequent favorite.", title_case(value)),
        "pace" => match value {
            "short" => "quick episodes".to_owned(),
            "medium" => "snappy pacing".to_owned(),
            "feature" => "feature-length runs".to_owned(),
            "epic" => "long-form epics".to_owned(),
            _ => "It matches your pacing preferences.".to_owned(),
        },
        "year" => {
            let era = match value {
                "classic" => "classic era",
                "mid" => "2000s era",
                "recent" => "recent releases",
                "new" => "brand new releases",
                other => other,
            };
            format!("It fits your taste for {era}.")
        }
        _ => "It's aligned with your viewing profile.".to_owned(),
    }
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn item(genres: &[&str], runtime: Option<u32>, year: Option<i32>) -> HistoryItem {
        HistoryItem {
            genres: genres.iter().map(|g| (*g).to_owned()).collect(),
            runtime,
            release_year: year,
            ..HistoryItem::default()
        }
    }

    #[test]
    fn profile_normalizes_to_distribution() {
        let history = vec![
            item(&["Drama"], Some(45), Some(2021)),
            item(&["Drama", "Crime"], Some(50), Some(2022)),
        ];
        let profile = TasteProfile::from_history(&history, 120);
        let total: f64 = profile.weights().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(profile.weights()["genre:drama"] > profile.weights()["genre:crime"]);
    }

    #[test]
    fn empty_history_yields_empty_profile() {
        let profile = TasteProfile::from_history(&[], 120);
        assert!(profile.is_empty());
    }

    #[test]
    fn history_window_is_bounded() {
        let mut history = vec![item(&["Comedy"], None, None); 150];
        history.splice(0..0, vec![item(&["Horror"], None, None); 10]);
        let profile = TasteProfile::from_history(&history, 120);
        // The horror items fell out of the 120-item window.
        assert!(!profile.weights().contains_key("genre:horror"));
        assert!(profile.weights().contains_key("genre:comedy"));
    }

    #[test]
    fn matching_candidate_scores_higher() {
        let history = vec![item(&["Drama"], Some(45), Some(2021)); 10];
        let profile = TasteProfile::from_history(&history, 120);

        let matching = feature_keys(&["Drama".to_owned()], &[], Some(45), Some(2021));
        let unrelated = feature_keys(&["Western".to_owned()], &[], Some(200), Some(1950));
        assert!(profile.score(&matching) > profile.score(&unrelated));
    }

    #[test]
    fn empty_profile_scores_half() {
        let profile = TasteProfile::default();
        let features = feature_keys(&["Drama".to_owned()], &[], None, None);
        assert!((profile.score(&features) - 0.5).abs() < f64::EPSILON);
        assert!((profile.score(&BTreeSet::new()) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn featureless_candidate_scores_low_against_profile() {
        let history = vec![item(&["Drama"], None, None)];
        let profile = TasteProfile::from_history(&history, 120);
        assert!((profile.score(&BTreeSet::new()) - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn score_is_clamped() {
        let history = vec![item(&["Drama"], Some(45), Some(2021))];
        let profile = TasteProfile::from_history(&history, 120);
        let features = feature_keys(&["Drama".to_owned()], &[], Some(45), Some(2021));
        let score = profile.score(&features);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn runtime_buckets() {
        assert_eq!(runtime_bucket(Some(20)), Some("short"));
        assert_eq!(runtime_bucket(Some(45)), Some("medium"));
        assert_eq!(runtime_bucket(Some(90)), Some("feature"));
        assert_eq!(runtime_bucket(Some(180)), Some("epic"));
        assert_eq!(runtime_bucket(None), None);
    }

    #[test]
    fn release_buckets() {
        assert_eq!(release_bucket(Some(1985)), Some("classic"));
        assert_eq!(release_bucket(Some(2005)), Some("mid"));
        assert_eq!(release_bucket(Some(2015)), Some("recent"));
        assert_eq!(release_bucket(Some(2024)), Some("new"));
        assert_eq!(release_bucket(None), None);
    }

    #[test]
    fn explain_names_strong_features() {
        let history = vec![item(&["Drama"], Some(45), Some(2021)); 5];
        let profile = TasteProfile::from_history(&history, 120);
        let features = feature_keys(&["Drama".to_owned()], &[], Some(45), Some(2021));
        let reason = profile.explain(&features);
        assert!(reason.contains("drama stories"));
    }

    #[test]
    fn explain_cold_start_mentions_popularity() {
        let profile = TasteProfile::default();
        let features = feature_keys(&["Drama".to_owned()], &[], None, None);
        assert_eq!(profile.explain(&features), "These are popular picks right now.");
    }

    #[test]
    fn explain_no_overlap_offers_variety() {
        let history = vec![item(&["Drama"], None, None)];
        let profile = TasteProfile::from_history(&history, 120);
        let features = feature_keys(&["Western".to_owned()], &[], None, None);
        assert!(profile.explain(&features).contains("a little different"));
    }
}
