//! Shared test doubles used across unit and integration tests.
//!
//! Consolidates the recording telemetry publisher and the fake external
//! collaborators (identity directory, STT sink, audio transport, media
//! sources) so individual test modules do not re-implement them.

use crate::error::{HalcyonError, Result};
use crate::identity::IdentityLookup;
use crate::media::sources::{MediaCatalog, MediaHistory, MediaRequester};
use crate::media::{CatalogEntry, HistoryItem, MediaType};
use crate::telemetry::{HA_SERVICE_TOPIC, MqttPublisher};
use crate::trust::Role;
use crate::voice::mux::SttSink;
use crate::voice::output::{AudioOutput, AudioOutputFactory};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One captured publish.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    /// Full topic the payload went to.
    pub topic: String,
    /// Payload at publish time.
    pub payload: Value,
    /// Requested QoS level.
    pub qos: u8,
}

/// Captures every publish for later assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    reject: bool,
}

impl RecordingPublisher {
    /// A publisher that refuses every delivery.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    /// All captured messages, in publish order.
    #[must_use]
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Latest payload published to the given full topic.
    #[must_use]
    pub fn last_for(&self, topic: &str) -> Option<Value> {
        self.messages()
            .into_iter()
            .rev()
            .find(|message| message.topic == topic)
            .map(|message| message.payload)
    }

    /// Latest Home Assistant service call as `(domain, service, data)`.
    #[must_use]
    pub fn last_service_call(&self) -> Option<(String, String, Value)> {
        let payload = self.last_for(HA_SERVICE_TOPIC)?;
        Some((
            payload["domain"].as_str()?.to_owned(),
            payload["service"].as_str()?.to_owned(),
            payload["data"].clone(),
        ))
    }
}

impl MqttPublisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &Value, qos: u8) -> bool {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(PublishedMessage {
                topic: topic.to_owned(),
                payload: payload.clone(),
                qos,
            });
        !self.reject
    }
}

/// Deterministic identity directory.
#[derive(Default)]
pub struct FakeIdentity {
    mapping: HashMap<String, (String, Role)>,
}

impl FakeIdentity {
    /// Build from `(temp_id, uuid, role)` triples.
    #[must_use]
    pub fn with_mappings(entries: &[(&str, &str, Role)]) -> Self {
        Self {
            mapping: entries
                .iter()
                .map(|(temp_id, uuid, role)| ((*temp_id).to_owned(), ((*uuid).to_owned(), *role)))
                .collect(),
        }
    }
}

impl IdentityLookup for FakeIdentity {
    fn resolve(&self, speaker_temp_id: &str, _voice_prob: f64) -> (Option<String>, Option<Role>) {
        match self.mapping.get(speaker_temp_id) {
            Some((uuid, role)) => (Some(uuid.clone()), Some(*role)),
            None => (None, None),
        }
    }
}

/// STT sink that counts received frames.
#[derive(Default)]
pub struct CountingStt {
    frames: AtomicUsize,
}

impl CountingStt {
    /// Number of frames received.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

impl SttSink for CountingStt {
    fn push_audio(&self, _frame: &[u8]) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records audio deliveries per output target.
#[derive(Default)]
pub struct FakeAudioFactory {
    sends: Arc<Mutex<Vec<((String, u16), Vec<u8>)>>>,
    connections: AtomicUsize,
    fail: Arc<AtomicBool>,
}

impl FakeAudioFactory {
    /// Make subsequent deliveries fail.
    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// All deliveries as `((host, port), wav)`.
    #[must_use]
    pub fn sends(&self) -> Vec<((String, u16), Vec<u8>)> {
        self.sends
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of connections opened.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

struct FakeAudioOutput {
    target: (String, u16),
    sends: Arc<Mutex<Vec<((String, u16), Vec<u8>)>>>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl AudioOutput for FakeAudioOutput {
    async fn send_tts(&self, wav: &[u8]) -> Result<bool> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HalcyonError::External("transport down".into()));
        }
        self.sends
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((self.target.clone(), wav.to_vec()));
        Ok(true)
    }
}

impl AudioOutputFactory for FakeAudioFactory {
    fn connect(&self, host: &str, port: u16) -> Arc<dyn AudioOutput> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeAudioOutput {
            target: (host.to_owned(), port),
            sends: self.sends.clone(),
            fail: self.fail.clone(),
        })
    }
}

/// Canned watch-history source.
#[derive(Default)]
pub struct FakeHistory {
    movies: Vec<HistoryItem>,
    shows: Vec<HistoryItem>,
    continuing: Vec<HistoryItem>,
}

impl FakeHistory {
    /// Set the movie history.
    #[must_use]
    pub fn with_movies(mut self, movies: Vec<HistoryItem>) -> Self {
        self.movies = movies;
        self
    }

    /// Set the show history.
    #[must_use]
    pub fn with_shows(mut self, shows: Vec<HistoryItem>) -> Self {
        self.shows = shows;
        self
    }

    /// Set the continue-watching list.
    #[must_use]
    pub fn with_continue(mut self, continuing: Vec<HistoryItem>) -> Self {
        self.continuing = continuing;
        self
    }
}

#[async_trait]
impl MediaHistory for FakeHistory {
    async fn user_history(
        &self,
        user_uuid: Option<&str>,
        kind: MediaType,
        limit: usize,
    ) -> Result<Vec<HistoryItem>> {
        if user_uuid.is_none() {
            return Ok(Vec::new());
        }
        let source = match kind {
            MediaType::Movie => &self.movies,
            MediaType::Tv => &self.shows,
        };
        Ok(source.iter().take(limit).cloned().collect())
    }

    async fn continue_watching(
        &self,
        user_uuid: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryItem>> {
        if user_uuid.is_none() {
            return Ok(Vec::new());
        }
        Ok(self.continuing.iter().take(limit).cloned().collect())
    }
}

/// Canned discovery source.
#[derive(Default)]
pub struct FakeCatalog {
    trending: HashMap<MediaType, Vec<CatalogEntry>>,
    related: HashMap<u64, Vec<CatalogEntry>>,
}

impl FakeCatalog {
    /// Set the trending list for one media type.
    #[must_use]
    pub fn with_trending(mut self, media: MediaType, entries: Vec<CatalogEntry>) -> Self {
        self.trending.insert(media, entries);
        self
    }

    /// Set the related list for one seed title.
    #[must_use]
    pub fn with_related(mut self, tmdb_id: u64, entries: Vec<CatalogEntry>) -> Self {
        self.related.insert(tmdb_id, entries);
        self
    }
}

#[async_trait]
impl MediaCatalog for FakeCatalog {
    async fn trending(&self, media: MediaType) -> Result<Vec<CatalogEntry>> {
        Ok(self.trending.get(&media).cloned().unwrap_or_default())
    }

    async fn recommendations(&self, tmdb_id: u64, _media: MediaType) -> Result<Vec<CatalogEntry>> {
        Ok(self.related.get(&tmdb_id).cloned().unwrap_or_default())
    }
}

/// Records acquisition requests and list additions.
#[derive(Default)]
pub struct FakeRequester {
    requests: Mutex<Vec<(u64, MediaType)>>,
    list_adds: Mutex<Vec<(u64, String)>>,
    fail: AtomicBool,
}

impl FakeRequester {
    /// Make subsequent calls fail.
    pub fn fail_requests(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Submitted requests as `(tmdb_id, media_type)`.
    #[must_use]
    pub fn requests(&self) -> Vec<(u64, MediaType)> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// List additions as `(tmdb_id, list_name)`.
    #[must_use]
    pub fn list_adds(&self) -> Vec<(u64, String)> {
        self.list_adds
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MediaRequester for FakeRequester {
    async fn request(&self, tmdb_id: u64, media: MediaType) -> Result<Value> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HalcyonError::External("overseerr unavailable".into()));
        }
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((tmdb_id, media));
        Ok(serde_json::json!({"id": tmdb_id, "status": "pending"}))
    }

    async fn add_to_list(&self, tmdb_id: u64, list_name: &str) -> Result<bool> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HalcyonError::External("overseerr unavailable".into()));
        }
        self.list_adds
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((tmdb_id, list_name.to_owned()));
        Ok(true)
    }
}

/// Synthesizer stamping persona and text into the fake audio payload.
#[derive(Default)]
pub struct FakeSynth;

#[async_trait]
impl crate::voice::output::SpeechSynthesizer for FakeSynth {
    async fn synth(&self, persona: crate::persona::Persona, text: &str) -> Result<Vec<u8>> {
        Ok(format!("{}:{text}", persona.as_str()).into_bytes())
    }
}

/// A catalog entry with sensible defaults for tests.
#[must_use]
pub fn catalog_entry(tmdb_id: u64, title: &str, genres: &[&str]) -> CatalogEntry {
    CatalogEntry {
        tmdb_id: Some(tmdb_id),
        title: title.to_owned(),
        overview: None,
        genres: genres.iter().map(|g| (*g).to_owned()).collect(),
        networks: Vec::new(),
        runtime: Some(95),
        release_year: Some(2022),
        popularity: 5.0,
        adult: false,
    }
}
