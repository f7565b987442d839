//! Shared session state keyed by speaker.
//!
//! Sessions live in the external KV store so persona and trust hysteresis
//! stay stable across microphones and devices within a household. Known
//! speakers are keyed by stable UUID; anonymous speakers fall back to a
//! per-temp-id guest key.

use crate::clock::epoch_secs;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::kv::KvStore;
use crate::trust::ContextMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Serializable representation of a speaker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Stable speaker UUID, when known.
    pub speaker_uuid: Option<String>,
    /// Trust score from the previous turn.
    pub last_trust: f64,
    /// Persona that answered the previous turn.
    pub last_persona: String,
    /// Epoch seconds of the last session write.
    pub last_seen_ts: f64,
    /// Monotonic turn counter for the conversation.
    pub conversation_turn: u64,
    /// Environmental mode for the household.
    pub context_mode: ContextMode,
    /// Latest speaker-verification confidence.
    pub voice_confidence: Option<f64>,
    /// Latest face-recognition confidence.
    pub face_confidence: Option<f64>,
    /// Accumulated reassurance signal (0-20).
    pub reassurance: f64,
    /// Accumulated threat signal (0-30).
    pub threat: f64,
    /// Canonical intent of the previous turn, if any.
    pub last_intent: Option<String>,
    /// Spoken response of the previous turn.
    pub last_response: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            speaker_uuid: None,
            last_trust: 0.0,
            last_persona: "HALSTON".to_owned(),
            last_seen_ts: 0.0,
            conversation_turn: 0,
            context_mode: ContextMode::Home,
            voice_confidence: None,
            face_confidence: None,
            reassurance: 0.0,
            threat: 0.0,
            last_intent: None,
            last_response: None,
        }
    }
}

/// KV-backed shared session cache.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store over the shared KV backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, config: SessionConfig) -> Self {
        Self {
            kv,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    fn key(speaker_uuid: Option<&str>, temp_id: &str) -> String {
        match speaker_uuid {
            Some(uuid) => format!("halcyon:session:{uuid}"),
            None => format!("halcyon:session:guest:{temp_id}"),
        }
    }

    /// Load the session for a speaker, initializing a fresh one on miss.
    pub async fn load(&self, speaker_uuid: Option<&str>, temp_id: &str) -> Result<SessionState> {
        let key = Self::key(speaker_uuid, temp_id);
        match self.kv.get(&key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(state) => Ok(state),
                Err(err) => {
                    debug!("discarding unreadable session at {key}: {err}");
                    Ok(Self::fresh(speaker_uuid))
                }
            },
            None => Ok(Self::fresh(speaker_uuid)),
        }
    }

    /// Persist the session, stamping ownership and `last_seen_ts`.
    pub async fn save(
        &self,
        state: &mut SessionState,
        speaker_uuid: Option<&str>,
        temp_id: &str,
    ) -> Result<()> {
        let key = Self::key(speaker_uuid, temp_id);
        state.speaker_uuid = speaker_uuid.map(str::to_owned);
        state.last_seen_ts = epoch_secs();
        let payload = serde_json::to_string(state)?;
        self.kv.set(&key, &payload, Some(self.ttl)).await
    }

    /// Update the context mode with a load-modify-save cycle.
    pub async fn touch_context(
        &self,
        speaker_uuid: Option<&str>,
        temp_id: &str,
        context_mode: ContextMode,
    ) -> Result<()> {
        let mut state = self.load(speaker_uuid, temp_id).await?;
        state.context_mode = context_mode;
        self.save(&mut state, speaker_uuid, temp_id).await
    }

    /// Drop the stored session, if any.
    pub async fn clear(&self, speaker_uuid: Option<&str>, temp_id: &str) -> Result<()> {
        self.kv.delete(&Self::key(speaker_uuid, temp_id)).await
    }

    fn fresh(speaker_uuid: Option<&str>) -> SessionState {
        SessionState {
            speaker_uuid: speaker_uuid.map(str::to_owned),
            last_seen_ts: epoch_secs(),
            ..SessionState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::kv::MemoryKvStore;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryKvStore::new()), SessionConfig::default())
    }

    #[tokio::test]
    async fn load_on_miss_initializes_fresh_state() {
        let sessions = store();
        let state = sessions.load(Some("uuid-1"), "temp-1").await.unwrap();
        assert_eq!(state.speaker_uuid.as_deref(), Some("uuid-1"));
        assert_eq!(state.conversation_turn, 0);
        assert!(state.last_seen_ts > 0.0);
    }

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let sessions = store();
        let mut state = sessions.load(Some("uuid-1"), "temp-1").await.unwrap();
        state.last_trust = 80.0;
        state.conversation_turn = 3;
        state.last_intent = Some("turn_on_light".to_owned());
        sessions.save(&mut state, Some("uuid-1"), "temp-1").await.unwrap();

        let loaded = sessions.load(Some("uuid-1"), "temp-1").await.unwrap();
        assert!((loaded.last_trust - 80.0).abs() < f64::EPSILON);
        assert_eq!(loaded.conversation_turn, 3);
        assert_eq!(loaded.last_intent.as_deref(), Some("turn_on_light"));
    }

    #[tokio::test]
    async fn guest_and_known_keys_are_distinct() {
        let sessions = store();
        let mut known = sessions.load(Some("uuid-1"), "temp-1").await.unwrap();
        known.last_trust = 90.0;
        sessions.save(&mut known, Some("uuid-1"), "temp-1").await.unwrap();

        let guest = sessions.load(None, "temp-1").await.unwrap();
        assert!((guest.last_trust - 0.0).abs() < f64::EPSILON);
        assert_eq!(guest.speaker_uuid, None);
    }

    #[tokio::test]
    async fn touch_context_updates_mode() {
        let sessions = store();
        sessions
            .touch_context(Some("uuid-1"), "temp-1", ContextMode::Away)
            .await
            .unwrap();
        let state = sessions.load(Some("uuid-1"), "temp-1").await.unwrap();
        assert_eq!(state.context_mode, ContextMode::Away);
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let sessions = store();
        let mut state = sessions.load(None, "temp-1").await.unwrap();
        state.conversation_turn = 5;
        sessions.save(&mut state, None, "temp-1").await.unwrap();
        sessions.clear(None, "temp-1").await.unwrap();

        let state = sessions.load(None, "temp-1").await.unwrap();
        assert_eq!(state.conversation_turn, 0);
    }

    #[tokio::test]
    async fn older_payloads_with_missing_fields_load() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(
            "halcyon:session:uuid-1",
            r#"{"speaker_uuid":"uuid-1","last_trust":42.0}"#,
            None,
        )
        .await
        .unwrap();
        let sessions = SessionStore::new(kv, SessionConfig::default());
        let state = sessions.load(Some("uuid-1"), "temp-1").await.unwrap();
        assert!((state.last_trust - 42.0).abs() < f64::EPSILON);
        assert_eq!(state.context_mode, ContextMode::Home);
        assert_eq!(state.last_persona, "HALSTON");
    }
}
