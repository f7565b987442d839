//! Microphone registration and health tracking.
//!
//! Mic hosts report heartbeats with their RMS level and VAD state; the
//! manager publishes them to `voice/mic/heartbeat` and flags mics whose
//! heartbeat has gone stale.

use crate::config::MicConfig;
use crate::telemetry::EventBus;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Status information for a microphone.
#[derive(Debug, Clone)]
pub struct MicStatus {
    /// Microphone identifier.
    pub mic_id: String,
    /// Room hosting the mic.
    pub room_id: String,
    /// Audio device identifier.
    pub device: String,
    /// RMS audio level (0.0 to 1.0) from the last heartbeat.
    pub rms_level: f64,
    /// Voice activity state from the last heartbeat.
    pub vad_active: bool,
    /// Whether the mic is considered alive.
    pub alive: bool,
}

struct MicEntry {
    status: MicStatus,
    last_heartbeat: Instant,
}

/// Tracks microphone health across the household.
pub struct MicManager {
    events: EventBus,
    config: MicConfig,
    mics: Mutex<HashMap<String, MicEntry>>,
}

impl MicManager {
    /// Create a manager.
    #[must_use]
    pub fn new(events: EventBus, config: MicConfig) -> Self {
        Self {
            events,
            config,
            mics: Mutex::new(HashMap::new()),
        }
    }

    /// Register a microphone.
    pub fn register_mic(&self, mic_id: &str, room_id: &str, device: &str) {
        let mut mics = self.lock_mics();
        mics.insert(
            mic_id.to_owned(),
            MicEntry {
                status: MicStatus {
                    mic_id: mic_id.to_owned(),
                    room_id: room_id.to_owned(),
                    device: device.to_owned(),
                    rms_level: 0.0,
                    vad_active: false,
                    alive: true,
                },
                last_heartbeat: Instant::now(),
            },
        );
    }

    /// Record a heartbeat and publish it.
    pub fn heartbeat(&self, mic_id: &str, rms_level: f64, vad: bool) {
        let payload = {
            let mut mics = self.lock_mics();
            let Some(entry) = mics.get_mut(mic_id) else {
                return;
            };
            entry.last_heartbeat = Instant::now();
            entry.status.rms_level = rms_level.clamp(0.0, 1.0);
            entry.status.vad_active = vad;
            entry.status.alive = true;
            json!({
                "mic_id": mic_id,
                "room_id": entry.status.room_id,
                "rms": (entry.status.rms_level * 1000.0).round() / 1000.0,
                "vad": vad,
                "alive": true,
            })
        };
        self.events.publish("voice/mic/heartbeat", payload);
    }

    /// Whether a mic's heartbeat is recent. A liveness change is
    /// republished so dashboards see the transition.
    pub fn is_alive(&self, mic_id: &str) -> bool {
        let payload = {
            let mut mics = self.lock_mics();
            let Some(entry) = mics.get_mut(mic_id) else {
                return false;
            };
            let alive =
                entry.last_heartbeat.elapsed().as_secs_f64() <= self.config.heartbeat_timeout_secs;
            if entry.status.alive == alive {
                return alive;
            }
            entry.status.alive = alive;
            json!({
                "mic_id": mic_id,
                "room_id": entry.status.room_id,
                "rms": (entry.status.rms_level * 1000.0).round() / 1000.0,
                "vad": entry.status.vad_active,
                "alive": alive,
            })
        };
        self.events.publish("voice/mic/heartbeat", payload.clone());
        payload["alive"].as_bool().unwrap_or(false)
    }

    /// Liveliest microphone in a room, by RMS level.
    #[must_use]
    pub fn best_mic_for_room(&self, room_id: &str) -> Option<String> {
        let candidates: Vec<(String, f64)> = {
            let mics = self.lock_mics();
            mics.values()
                .filter(|entry| entry.status.room_id == room_id)
                .map(|entry| (entry.status.mic_id.clone(), entry.status.rms_level))
                .collect()
        };
        candidates
            .into_iter()
            .filter(|(mic_id, _)| self.is_alive(mic_id))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(mic_id, _)| mic_id)
    }

    /// Current status snapshot for a mic.
    #[must_use]
    pub fn status(&self, mic_id: &str) -> Option<MicStatus> {
        self.lock_mics().get(mic_id).map(|entry| entry.status.clone())
    }

    /// All registered microphone ids.
    #[must_use]
    pub fn list_mics(&self) -> Vec<String> {
        self.lock_mics().keys().cloned().collect()
    }

    fn lock_mics(&self) -> std::sync::MutexGuard<'_, HashMap<String, MicEntry>> {
        self.mics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
