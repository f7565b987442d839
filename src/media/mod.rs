//! Media recommendation types shared across the pipeline.

pub mod recommender;
pub mod sources;
pub mod taste;

pub use recommender::MediaRecommender;
pub use sources::{MediaCatalog, MediaHistory, MediaRequester};
pub use taste::TasteProfile;

use serde::{Deserialize, Serialize};

/// Kind of title, in TMDB terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Feature film.
    #[default]
    Movie,
    /// Television series.
    Tv,
}

impl MediaType {
    /// Lowercase wire label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

/// One watched (or in-progress) item from the household library.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HistoryItem {
    /// TMDB identifier, when the library item is matched.
    pub tmdb_id: Option<u64>,
    /// Movie or TV.
    pub media_type: MediaType,
    /// Display title.
    pub title: String,
    /// Genre names.
    pub genres: Vec<String>,
    /// Producing networks.
    pub networks: Vec<String>,
    /// Runtime in minutes.
    pub runtime: Option<u32>,
    /// First release year.
    pub release_year: Option<i32>,
    /// Whether the item is currently being watched.
    pub in_progress: bool,
}

/// A raw discovery result from the catalog source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CatalogEntry {
    /// TMDB identifier; entries without one are unusable downstream.
    pub tmdb_id: Option<u64>,
    /// Display title.
    pub title: String,
    /// Short synopsis.
    pub overview: Option<String>,
    /// Genre names.
    pub genres: Vec<String>,
    /// Producing networks.
    pub networks: Vec<String>,
    /// Runtime in minutes.
    pub runtime: Option<u32>,
    /// First release year.
    pub release_year: Option<i32>,
    /// TMDB popularity index.
    pub popularity: f64,
    /// Adult-content flag.
    pub adult: bool,
}

/// Where a candidate entered the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    /// TMDB trending list.
    Trending,
    /// Household continue-watching list.
    Continue,
    /// TMDB recommendations seeded from watch history.
    Related,
}

impl CandidateSource {
    /// Lowercase wire label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Trending => "trending",
            CandidateSource::Continue => "continue",
            CandidateSource::Related => "related",
        }
    }
}

/// A scored, explainable recommendation candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCandidate {
    /// TMDB identifier.
    pub tmdb_id: u64,
    /// Movie or TV.
    pub media_type: MediaType,
    /// Display title.
    pub title: String,
    /// Genre names.
    pub genres: Vec<String>,
    /// Producing networks.
    pub networks: Vec<String>,
    /// Runtime in minutes.
    pub runtime: Option<u32>,
    /// First release year.
    pub release_year: Option<i32>,
    /// TMDB popularity index.
    pub popularity: f64,
    /// Pool the candidate came from.
    pub source: CandidateSource,
    /// Final score in [0, 1].
    pub score: f64,
    /// Spoken explanation of the top matching features.
    pub reason: String,
    /// Whether the score drew on personal history.
    pub personalized: bool,
    /// Adult-content flag, gated for untrusted speakers.
    pub adult: bool,
}
