//! Configuration types for the HALCYON coordination layer.
//!
//! Every tunable is a plain serde struct with a `Default` impl and, where the
//! values constrain each other, an explicit `validate()` routine that is
//! called by the consuming component at construction time. Components fail
//! loudly on bad configuration; nothing is silently clamped.

use crate::error::{HalcyonError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Top-level configuration for the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HalcyonConfig {
    /// Identity resolver settings.
    pub identity: IdentityConfig,
    /// Persona state machine settings.
    pub persona: PersonaConfig,
    /// Session store settings.
    pub session: SessionConfig,
    /// Wakeword bus settings.
    pub wakeword: WakewordConfig,
    /// Conversation routing settings.
    pub conversation: ConversationConfig,
    /// Privacy / DND zone settings.
    pub zones: ZoneConfig,
    /// Microphone health settings.
    pub mic: MicConfig,
    /// Media offer cache settings.
    pub media: MediaCacheConfig,
}

/// Identity resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to the persistent identity map (JSON).
    pub map_path: PathBuf,
    /// TTL for the in-memory resolve cache, in seconds.
    pub cache_ttl_secs: f64,
    /// Lifetime of a temp-id alias binding after its last sighting.
    pub alias_ttl_secs: f64,
    /// Voice confidence required to resolve with the stored role.
    pub min_voice_confidence: f64,
    /// Voice confidence floor below which alias lookups are suppressed.
    /// Between `degrade_confidence` and `min_voice_confidence` the UUID is
    /// still returned for auditing, but the role degrades to guest.
    pub degrade_confidence: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            map_path: PathBuf::from("state/identity_map.json"),
            cache_ttl_secs: 180.0,
            alias_ttl_secs: 7.0 * 24.0 * 3600.0,
            min_voice_confidence: 0.55,
            degrade_confidence: 0.35,
        }
    }
}

impl IdentityConfig {
    /// Check threshold ordering: `0 <= degrade <= min <= 1`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_voice_confidence) {
            return Err(HalcyonError::Config(
                "min_voice_confidence must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.degrade_confidence) {
            return Err(HalcyonError::Config(
                "degrade_confidence must be within [0, 1]".into(),
            ));
        }
        if self.degrade_confidence > self.min_voice_confidence {
            return Err(HalcyonError::Config(
                "degrade_confidence must be <= min_voice_confidence".into(),
            ));
        }
        Ok(())
    }
}

/// Tunable parameters for the persona state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Threat severity required to consider escalation.
    pub escalate_threshold: f64,
    /// Mean reassurance confidence (and threat ceiling) for de-escalation.
    pub deescalate_threshold: f64,
    /// Consecutive high-severity signals required before switching to SCARLET.
    pub sustained_escalation_count: usize,
    /// Consecutive reassurance signals required before returning to HALSTON.
    pub sustained_reassurance_count: usize,
    /// Number of recent signals kept for rolling computation.
    pub lookback_window: usize,
    /// Minimum time between persona switches, in seconds.
    pub cooldown_seconds: f64,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            escalate_threshold: 0.6,
            deescalate_threshold: 0.25,
            sustained_escalation_count: 2,
            sustained_reassurance_count: 3,
            lookback_window: 10,
            cooldown_seconds: 30.0,
        }
    }
}

impl PersonaConfig {
    /// Check threshold ordering and window sanity.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.escalate_threshold)
            || !(0.0..=1.0).contains(&self.deescalate_threshold)
        {
            return Err(HalcyonError::Config(
                "persona thresholds must be within [0, 1]".into(),
            ));
        }
        if self.deescalate_threshold > self.escalate_threshold {
            return Err(HalcyonError::Config(
                "deescalate_threshold must not exceed escalate_threshold".into(),
            ));
        }
        if self.sustained_escalation_count == 0
            || self.sustained_reassurance_count == 0
            || self.lookback_window == 0
        {
            return Err(HalcyonError::Config(
                "persona signal counts must be positive".into(),
            ));
        }
        if self.cooldown_seconds < 0.0 {
            return Err(HalcyonError::Config(
                "cooldown_seconds must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session TTL from last write, in seconds.
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

/// Wakeword bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakewordConfig {
    /// Collision window across microphones, in milliseconds.
    pub collision_window_ms: u64,
    /// Per-mic debounce interval, in milliseconds.
    pub debounce_ms: u64,
    /// Confidence margin above which the top event wins a collision outright.
    pub tie_break_margin: f64,
}

impl Default for WakewordConfig {
    fn default() -> Self {
        Self {
            collision_window_ms: 300,
            debounce_ms: 500,
            tie_break_margin: 0.1,
        }
    }
}

/// Conversation routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum seconds between sightings for a follow-me handoff.
    pub follow_me_max_gap_secs: f64,
    /// Minimum candidate confidence for a handoff.
    pub handoff_min_confidence: f64,
    /// TTL for per-speaker room state keys, in seconds.
    pub state_ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            follow_me_max_gap_secs: 10.0,
            handoff_min_confidence: 0.75,
            state_ttl_secs: 3600,
        }
    }
}

impl ConversationConfig {
    /// Build from environment, falling back to defaults.
    ///
    /// Reads `FOLLOW_ME_MAX_GAP_SEC` and `HANDOFF_MIN_CONFIDENCE`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            follow_me_max_gap_secs: env_f64("FOLLOW_ME_MAX_GAP_SEC")
                .unwrap_or(defaults.follow_me_max_gap_secs),
            handoff_min_confidence: env_f64("HANDOFF_MIN_CONFIDENCE")
                .unwrap_or(defaults.handoff_min_confidence),
            state_ttl_secs: defaults.state_ttl_secs,
        }
    }
}

/// Privacy / do-not-disturb zone configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Rooms where no speech is ever emitted.
    pub privacy_zones: BTreeSet<String>,
    /// Rooms where only SCARLET announcements are emitted.
    pub dnd_zones: BTreeSet<String>,
    /// Preferred default room when no other selection applies.
    pub default_room: Option<String>,
}

impl ZoneConfig {
    /// Build from environment.
    ///
    /// Reads `PRIVACY_ZONES` and `DND_ZONES` as comma-separated room ids
    /// and `DEFAULT_ROOM` for the fallback room.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            privacy_zones: csv_env("PRIVACY_ZONES"),
            dnd_zones: csv_env("DND_ZONES"),
            default_room: std::env::var("DEFAULT_ROOM")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Microphone health configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicConfig {
    /// Seconds without a heartbeat before a mic is considered dead.
    pub heartbeat_timeout_secs: f64,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 8.0,
        }
    }
}

impl MicConfig {
    /// Build from environment, reading `MIC_HEARTBEAT_TIMEOUT_SEC`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            heartbeat_timeout_secs: env_f64("MIC_HEARTBEAT_TIMEOUT_SEC")
                .unwrap_or_else(|| Self::default().heartbeat_timeout_secs),
        }
    }
}

/// Media offer cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaCacheConfig {
    /// TTL of a stored recommendation offer set, in seconds.
    pub offer_ttl_secs: u64,
    /// Number of recent history items used to build the taste profile.
    pub history_depth: usize,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            offer_ttl_secs: 900,
            history_depth: 120,
        }
    }
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn csv_env(name: &str) -> BTreeSet<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(str::to_owned)
        .collect()
}
