//! Recommendation pipeline fusing household history with discovery sources.

use super::sources::{MediaCatalog, MediaHistory};
use super::taste::{TasteProfile, feature_keys};
use super::{CandidateSource, CatalogEntry, HistoryItem, MediaCandidate, MediaType};
use crate::error::Result;
use crate::persona::Persona;
use crate::telemetry::EventBus;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// History items fetched per kind.
const HISTORY_FETCH_LIMIT: usize = 200;
/// History items used to seed related-title lookups.
const RELATED_SEEDS: usize = 10;
/// Related titles kept per seed.
const RELATED_PER_SEED: usize = 5;
/// Continue-watching items fetched.
const CONTINUE_LIMIT: usize = 20;
/// Popularity below which a candidate earns the novelty bonus.
const NOVELTY_POPULARITY: f64 = 10.0;
const NOVELTY_BONUS: f64 = 0.1;
const CONTINUE_BONUS: f64 = 0.2;

/// Combine household history with catalog metadata to suggest content.
pub struct MediaRecommender {
    history: Arc<dyn MediaHistory>,
    catalog: Arc<dyn MediaCatalog>,
    events: EventBus,
    history_depth: usize,
}

impl MediaRecommender {
    /// Create a recommender over the given sources.
    #[must_use]
    pub fn new(
        history: Arc<dyn MediaHistory>,
        catalog: Arc<dyn MediaCatalog>,
        events: EventBus,
        history_depth: usize,
    ) -> Self {
        Self {
            history,
            catalog,
            events,
            history_depth,
        }
    }

    /// Return the top `k` recommendations for `user_uuid`.
    ///
    /// Guests (no UUID) receive trending-only, non-personalized options.
    /// Already-watched titles and entries without a TMDB id are excluded.
    pub async fn recommend_for_user(
        &self,
        user_uuid: Option<&str>,
        k: usize,
    ) -> Result<Vec<MediaCandidate>> {
        let mut history = self
            .history
            .user_history(user_uuid, MediaType::Movie, HISTORY_FETCH_LIMIT)
            .await?;
        history.extend(
            self.history
                .user_history(user_uuid, MediaType::Tv, HISTORY_FETCH_LIMIT)
                .await?,
        );
        let personalized = user_uuid.is_some() && !history.is_empty();
        let profile = TasteProfile::from_history(&history, self.history_depth);
        let watched: BTreeSet<u64> = history.iter().filter_map(|item| item.tmdb_id).collect();

        let (pool, sources) = self.build_candidate_pool(user_uuid, &history).await?;

        let mut scored: Vec<MediaCandidate> = Vec::new();
        for (entry, media_type, source) in pool {
            let Some(tmdb_id) = entry.tmdb_id else {
                continue;
            };
            if watched.contains(&tmdb_id) {
                continue;
            }
            let features = feature_keys(
                &entry.genres,
                &entry.networks,
                entry.runtime,
                entry.release_year,
            );
            let base = profile.score(&features);
            let novelty = if entry.popularity < NOVELTY_POPULARITY {
                NOVELTY_BONUS
            } else {
                0.0
            };
            let source_bonus = if source == CandidateSource::Continue {
                CONTINUE_BONUS
            } else {
                0.0
            };
            let score = (base + novelty + source_bonus).clamp(0.0, 1.0);
            let reason = profile.explain(&features);
            scored.push(MediaCandidate {
                tmdb_id,
                media_type,
                title: entry.title,
                genres: entry.genres,
                networks: entry.networks,
                runtime: entry.runtime,
                release_year: entry.release_year,
                popularity: entry.popularity,
                source,
                score,
                reason,
                personalized,
                adult: entry.adult,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        debug!("selected {} options for {:?}", scored.len(), user_uuid);

        self.events.publish(
            "media/recommendation",
            json!({
                "uuid": user_uuid,
                "n_options": scored.len(),
                "sources": sources.iter().map(CandidateSource::as_str).collect::<Vec<_>>(),
            }),
        );
        Ok(scored)
    }

    /// Generate a persona-aligned spoken summary for the options.
    #[must_use]
    pub fn format_spoken(options: &[MediaCandidate], persona: Persona) -> String {
        if options.is_empty() {
            return "I couldn't find anything suitable right now.".to_owned();
        }
        let personalized = options.iter().any(|option| option.personalized);
        let header = match persona {
            Persona::Scarlet => "Three candidates.".to_owned(),
            Persona::Halston => {
                if personalized {
                    "Based on your recent habits, here are three options.".to_owned()
                } else {
                    "Here are three popular options worth a look.".to_owned()
                }
            }
        };
        let mut parts = vec![header];
        for (idx, option) in options.iter().enumerate() {
            let snippet = match persona {
                Persona::Halston => {
                    let numbered = format!("{}: {}", idx + 1, option.title);
                    if option.reason.is_empty() {
                        numbered
                    } else {
                        format!("{numbered} — {}", option.reason)
                    }
                }
                Persona::Scarlet => {
                    if option.reason.is_empty() {
                        option.title.clone()
                    } else {
                        format!("{}. {}", option.title, option.reason)
                    }
                }
            };
            parts.push(snippet);
        }
        parts.push(match persona {
            Persona::Halston => "Which would you like?".to_owned(),
            Persona::Scarlet => "Choose one.".to_owned(),
        });
        parts.join(" ")
    }

    async fn build_candidate_pool(
        &self,
        user_uuid: Option<&str>,
        history: &[HistoryItem],
    ) -> Result<(Vec<(CatalogEntry, MediaType, CandidateSource)>, BTreeSet<CandidateSource>)> {
        let mut pool = Vec::new();
        let mut sources = BTreeSet::new();

        for media_type in [MediaType::Movie, MediaType::Tv] {
            for entry in self.catalog.trending(media_type).await? {
                pool.push((entry, media_type, CandidateSource::Trending));
            }
            sources.insert(CandidateSource::Trending);
        }

        if let Some(uuid) = user_uuid {
            let continue_list = self
                .history
                .continue_watching(Some(uuid), CONTINUE_LIMIT)
                .await?;
            if !continue_list.is_empty() {
                sources.insert(CandidateSource::Continue);
            }
            for item in continue_list {
                let media_type = item.media_type;
                pool.push((history_entry(item), media_type, CandidateSource::Continue));
            }

            let seeds = history
                .iter()
                .filter(|item| item.tmdb_id.is_some())
                .take(RELATED_SEEDS);
            for seed in seeds {
                let Some(tmdb_id) = seed.tmdb_id else {
                    continue;
                };
                let related = self
                    .catalog
                    .recommendations(tmdb_id, seed.media_type)
                    .await?;
                if !related.is_empty() {
                    sources.insert(CandidateSource::Related);
                }
                for entry in related.into_iter().take(RELATED_PER_SEED) {
                    pool.push((entry, seed.media_type, CandidateSource::Related));
                }
            }
        }

        Ok((pool, sources))
    }
}

fn history_entry(item: HistoryItem) -> CatalogEntry {
    CatalogEntry {
        tmdb_id: item.tmdb_id,
        title: item.title,
        overview: None,
        genres: item.genres,
        networks: item.networks,
        runtime: item.runtime,
        release_year: item.release_year,
        popularity: 0.0,
        adult: false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::test_utils::{FakeCatalog, FakeHistory, RecordingPublisher, catalog_entry};

    fn recommender(
        history: FakeHistory,
        catalog: FakeCatalog,
    ) -> (MediaRecommender, Arc<RecordingPublisher>) {
        let sink = Arc::new(RecordingPublisher::default());
        let events = EventBus::new(sink.clone());
        (
            MediaRecommender::new(Arc::new(history), Arc::new(catalog), events, 120),
            sink,
        )
    }

    #[tokio::test]
    async fn guest_gets_trending_only_non_personalized() {
        let catalog = FakeCatalog::default().with_trending(
            MediaType::Movie,
            vec![
                catalog_entry(1, "Alpha", &["Drama"]),
                catalog_entry(2, "Beta", &["Comedy"]),
                catalog_entry(3, "Gamma", &["Action"]),
                catalog_entry(4, "Delta", &["Horror"]),
            ],
        );
        let (recommender, sink) = recommender(FakeHistory::default(), catalog);

        let options = recommender.recommend_for_user(None, 3).await.unwrap();
        assert_eq!(options.len(), 3);
        assert!(options.iter().all(|o| !o.personalized));
        assert!(options.iter().all(|o| o.source == CandidateSource::Trending));

        let event = sink.last_for("halcyon/media/recommendation").unwrap();
        assert_eq!(event["n_options"], json!(3));
        assert_eq!(event["sources"], json!(["trending"]));
    }

    #[tokio::test]
    async fn watched_titles_are_excluded() {
        let history = FakeHistory::default().with_movies(vec![HistoryItem {
            tmdb_id: Some(1),
            title: "Alpha".into(),
            genres: vec!["Drama".into()],
            ..HistoryItem::default()
        }]);
        let catalog = FakeCatalog::default().with_trending(
            MediaType::Movie,
            vec![
                catalog_entry(1, "Alpha", &["Drama"]),
                catalog_entry(2, "Beta", &["Drama"]),
            ],
        );
        let (recommender, _sink) = recommender(history, catalog);

        let options = recommender.recommend_for_user(Some("uuid-1"), 3).await.unwrap();
        assert!(options.iter().all(|o| o.tmdb_id != 1));
        assert!(options.iter().all(|o| o.personalized));
    }

    #[tokio::test]
    async fn missing_tmdb_ids_are_excluded() {
        let mut nameless = catalog_entry(9, "Nameless", &["Drama"]);
        nameless.tmdb_id = None;
        let catalog = FakeCatalog::default().with_trending(MediaType::Movie, vec![nameless]);
        let (recommender, _sink) = recommender(FakeHistory::default(), catalog);
        let options = recommender.recommend_for_user(None, 3).await.unwrap();
        assert!(options.is_empty());
    }

    #[tokio::test]
    async fn continue_watching_gets_source_bonus() {
        let history = FakeHistory::default()
            .with_movies(vec![HistoryItem {
                tmdb_id: Some(50),
                title: "Watched".into(),
                genres: vec!["Drama".into()],
                ..HistoryItem::default()
            }])
            .with_continue(vec![HistoryItem {
                tmdb_id: Some(60),
                title: "Halfway".into(),
                genres: vec!["Drama".into()],
                in_progress: true,
                ..HistoryItem::default()
            }]);
        let catalog = FakeCatalog::default().with_trending(
            MediaType::Movie,
            vec![catalog_entry(61, "Fresh", &["Drama"])],
        );
        let (recommender, _sink) = recommender(history, catalog);

        let options = recommender.recommend_for_user(Some("uuid-1"), 3).await.unwrap();
        let halfway = options.iter().find(|o| o.tmdb_id == 60).unwrap();
        let fresh = options.iter().find(|o| o.tmdb_id == 61).unwrap();
        assert!(halfway.score > fresh.score);
        assert_eq!(halfway.source, CandidateSource::Continue);
    }

    #[tokio::test]
    async fn output_is_sorted_and_bounded() {
        let catalog = FakeCatalog::default().with_trending(
            MediaType::Movie,
            (1..=10)
                .map(|i| catalog_entry(i, &format!("Title {i}"), &["Drama"]))
                .collect(),
        );
        let (recommender, _sink) = recommender(FakeHistory::default(), catalog);
        let options = recommender.recommend_for_user(None, 3).await.unwrap();
        assert!(options.len() <= 3);
        for pair in options.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn related_titles_seed_from_history() {
        let history = FakeHistory::default().with_movies(vec![HistoryItem {
            tmdb_id: Some(100),
            title: "Seed".into(),
            genres: vec!["Drama".into()],
            ..HistoryItem::default()
        }]);
        let catalog = FakeCatalog::default()
            .with_related(100, vec![catalog_entry(101, "Sequelish", &["Drama"])]);
        let (recommender, sink) = recommender(history, catalog);

        let options = recommender.recommend_for_user(Some("uuid-1"), 3).await.unwrap();
        assert!(options.iter().any(|o| o.tmdb_id == 101));
        let event = sink.last_for("halcyon/media/recommendation").unwrap();
        let sources = event["sources"].as_array().unwrap();
        assert!(sources.contains(&json!("related")));
    }

    #[test]
    fn spoken_halston_numbers_and_prompts() {
        let options = vec![
            MediaCandidate {
                tmdb_id: 1,
                media_type: MediaType::Movie,
                title: "Alpha".into(),
                genres: vec![],
                networks: vec![],
                runtime: None,
                release_year: None,
                popularity: 0.0,
                source: CandidateSource::Trending,
                score: 0.9,
                reason: "It leans into drama stories.".into(),
                personalized: true,
                adult: false,
            },
        ];
        let spoken = MediaRecommender::format_spoken(&options, Persona::Halston);
        assert!(spoken.contains("Based on your recent habits"));
        assert!(spoken.contains("1: Alpha"));
        assert!(spoken.ends_with("Which would you like?"));
    }

    #[test]
    fn spoken_cold_start_mentions_popular_options() {
        let options = vec![MediaCandidate {
            tmdb_id: 1,
            media_type: MediaType::Movie,
            title: "Alpha".into(),
            genres: vec![],
            networks: vec![],
            runtime: None,
            release_year: None,
            popularity: 0.0,
            source: CandidateSource::Trending,
            score: 0.5,
            reason: String::new(),
            personalized: false,
            adult: false,
        }];
        let spoken = MediaRecommender::format_spoken(&options, Persona::Halston);
        assert!(spoken.contains("popular options"));
    }

    #[test]
    fn spoken_scarlet_is_terse() {
        let options = vec![MediaCandidate {
            tmdb_id: 1,
            media_type: MediaType::Movie,
            title: "Alpha".into(),
            genres: vec![],
            networks: vec![],
            runtime: None,
            release_year: None,
            popularity: 0.0,
            source: CandidateSource::Trending,
            score: 0.5,
            reason: String::new(),
            personalized: false,
            adult: false,
        }];
        let spoken = MediaRecommender::format_spoken(&options, Persona::Scarlet);
        assert!(spoken.starts_with("Three candidates."));
        assert!(spoken.ends_with("Choose one."));
        assert!(!spoken.contains("1:"));
    }

    #[test]
    fn spoken_empty_options() {
        let spoken = MediaRecommender::format_spoken(&[], Persona::Halston);
        assert!(spoken.contains("couldn't find anything"));
    }
}
