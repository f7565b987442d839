//! Collaborator seams for the media pipeline.
//!
//! The concrete clients (Plex for history, TMDB for discovery, Overseerr
//! for requests) live outside this crate; the recommender and intent
//! handlers only depend on these contracts. All calls are expected to be
//! time-bounded by their implementations.

use super::{CatalogEntry, HistoryItem, MediaType};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Household watch history, typically backed by Plex.
#[async_trait]
pub trait MediaHistory: Send + Sync {
    /// Most recent watch history for a user. Anonymous speakers receive an
    /// empty history; personal viewing data is never exposed to guests.
    async fn user_history(
        &self,
        user_uuid: Option<&str>,
        kind: MediaType,
        limit: usize,
    ) -> Result<Vec<HistoryItem>>;

    /// Items the user is currently watching.
    async fn continue_watching(
        &self,
        user_uuid: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryItem>>;
}

/// Title discovery, typically backed by TMDB.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Currently trending titles of the given kind.
    async fn trending(&self, media: MediaType) -> Result<Vec<CatalogEntry>>;

    /// Titles related to a seed title.
    async fn recommendations(&self, tmdb_id: u64, media: MediaType) -> Result<Vec<CatalogEntry>>;
}

/// Media acquisition requests, typically backed by Overseerr.
#[async_trait]
pub trait MediaRequester: Send + Sync {
    /// Submit a new media request. Returns the service's response payload.
    async fn request(&self, tmdb_id: u64, media: MediaType) -> Result<Value>;

    /// Add a title to a named watch list.
    async fn add_to_list(&self, tmdb_id: u64, list_name: &str) -> Result<bool>;
}
