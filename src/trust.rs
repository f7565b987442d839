//! Dynamic trust scoring for access and persona decisions.
//!
//! The scorer is a pure function of per-request sensory inputs and the
//! stored session state. Hysteresis keeps the score from flapping when
//! consecutive requests land close together, and context modes tilt the
//! score so the same voice earns less trust while the household is away
//! or an incident is open.

use serde::{Deserialize, Serialize};

/// Derived access tier for a speaker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// No identity evidence at all.
    #[default]
    Unknown,
    /// Unrecognized or low-confidence speaker.
    Guest,
    /// Recognized member of the household.
    Household,
    /// Recognized owner.
    Owner,
}

impl Role {
    /// Lowercase wire label, matching the persisted identity map.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unknown => "unknown",
            Role::Guest => "guest",
            Role::Household => "household",
            Role::Owner => "owner",
        }
    }

    /// Parse a stored role label; unrecognized labels map to `Guest`.
    #[must_use]
    pub fn parse(label: &str) -> Role {
        match label.trim().to_ascii_lowercase().as_str() {
            "owner" => Role::Owner,
            "household" => Role::Household,
            "unknown" => Role::Unknown,
            _ => Role::Guest,
        }
    }
}

/// Environmental state that modulates trust scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Normal occupied-home operation.
    #[default]
    Home,
    /// Household is away; unfamiliar voices are suspect.
    Away,
    /// Night hours; sensitive actions are narrowed.
    Night,
    /// Maintenance work in progress.
    Maintenance,
    /// Active security incident.
    Incident,
}

impl ContextMode {
    /// Score penalty subtracted for this mode.
    #[must_use]
    pub fn penalty(&self) -> f64 {
        match self {
            ContextMode::Home => 0.0,
            ContextMode::Maintenance => -5.0,
            ContextMode::Night => 8.0,
            ContextMode::Away => 15.0,
            ContextMode::Incident => 25.0,
        }
    }

    /// Lowercase wire label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Home => "home",
            ContextMode::Away => "away",
            ContextMode::Night => "night",
            ContextMode::Maintenance => "maintenance",
            ContextMode::Incident => "incident",
        }
    }

    /// Parse a stored mode label; unrecognized labels map to `Home`.
    #[must_use]
    pub fn parse(label: &str) -> ContextMode {
        match label.trim().to_ascii_lowercase().as_str() {
            "away" => ContextMode::Away,
            "night" => ContextMode::Night,
            "maintenance" => ContextMode::Maintenance,
            "incident" => ContextMode::Incident,
            _ => ContextMode::Home,
        }
    }
}

/// Persona preference derived alongside the trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaBias {
    /// Calm household persona preferred.
    Halston,
    /// Security persona preferred.
    Scarlet,
    /// No preference.
    Neutral,
}

impl PersonaBias {
    /// Wire label used in telemetry (`HALSTON` / `SCARLET` / `neutral`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaBias::Halston => "HALSTON",
            PersonaBias::Scarlet => "SCARLET",
            PersonaBias::Neutral => "neutral",
        }
    }
}

/// Inputs contributing to a single trust evaluation.
#[derive(Debug, Clone, Default)]
pub struct TrustInputs {
    /// Stable speaker UUID, when identity resolution produced one.
    pub speaker_id: Option<String>,
    /// Speaker-verification confidence, 0-1.
    pub voice_match: Option<f64>,
    /// Face-recognition confidence, 0-1.
    pub face_match: Option<f64>,
    /// Score from the previous evaluation (hysteresis anchor).
    pub prior_score: f64,
    /// Current environmental mode.
    pub context_mode: ContextMode,
    /// Accumulated reassurance signal, clamped to [-20, 20].
    pub reassurance: f64,
    /// Accumulated threat signal, clamped to [0, 30].
    pub threat: f64,
    /// Epoch seconds of the previous evaluation (0 = never).
    pub last_update_ts: f64,
    /// Epoch seconds now.
    pub now_ts: f64,
}

/// Outcome of a trust evaluation.
#[derive(Debug, Clone)]
pub struct TrustDecision {
    /// Final score in [0, 100].
    pub score: f64,
    /// Derived access tier.
    pub role: Role,
    /// Whether security-sensitive service calls are permitted.
    pub allow_sensitive: bool,
    /// Persona preference for this turn.
    pub persona_bias: PersonaBias,
    /// Diagnostic summary of the contributing terms.
    pub notes: String,
}

/// Numeric trust model with hysteresis and contextual adjustments.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustScorer;

impl TrustScorer {
    /// Floor applied before identity evidence is considered.
    pub const BASE_GUEST: f64 = 15.0;
    /// Score at or above which the owner hint is honored.
    pub const OWNER_THRESH: f64 = 75.0;
    /// Score at or above which household membership is granted.
    pub const HOUSEHOLD_THRESH: f64 = 55.0;
    /// Seconds during which the prior score anchors the new one.
    pub const COOLDOWN_SEC: f64 = 20.0;
    /// Band within which the prior score is kept during cooldown.
    pub const HYSTERESIS_BAND: f64 = 6.0;
    /// Voice confidence granting the night-mode owner exception.
    pub const NIGHT_OWNER_VOICE: f64 = 0.80;

    /// Calculate a trust decision from sensory and identity inputs.
    #[must_use]
    pub fn score(&self, inp: &TrustInputs, identity_role_hint: Option<Role>) -> TrustDecision {
        let voice = inp.voice_match.unwrap_or(0.0);
        let face = inp.face_match.unwrap_or(0.0);
        let id_strength = voice.max(face) * 100.0;

        let mut s = Self::BASE_GUEST.max(id_strength);
        s -= inp.context_mode.penalty();
        s += inp.reassurance.clamp(-20.0, 20.0);
        s -= inp.threat.clamp(0.0, 30.0);

        let dt = if inp.last_update_ts > 0.0 {
            inp.now_ts - inp.last_update_ts
        } else {
            f64::MAX
        };
        if dt < Self::COOLDOWN_SEC && (s - inp.prior_score).abs() < Self::HYSTERESIS_BAND {
            s = inp.prior_score;
        }

        s = s.clamp(0.0, 100.0);

        let role = if s >= Self::OWNER_THRESH {
            if identity_role_hint == Some(Role::Owner) {
                Role::Owner
            } else {
                Role::Household
            }
        } else if s >= Self::HOUSEHOLD_THRESH {
            Role::Household
        } else {
            Role::Guest
        };

        let mut allow_sensitive = matches!(role, Role::Owner | Role::Household)
            && matches!(inp.context_mode, ContextMode::Home | ContextMode::Maintenance);
        if inp.context_mode == ContextMode::Night
            && role == Role::Owner
            && voice >= Self::NIGHT_OWNER_VOICE
        {
            allow_sensitive = true;
        }

        let persona_bias = if inp.threat >= 15.0
            || matches!(inp.context_mode, ContextMode::Away | ContextMode::Incident)
        {
            PersonaBias::Scarlet
        } else if matches!(role, Role::Owner | Role::Household) && inp.threat <= 5.0 {
            PersonaBias::Halston
        } else {
            PersonaBias::Neutral
        };

        TrustDecision {
            score: s,
            role,
            allow_sensitive,
            persona_bias,
            notes: format!(
                "id_strength={id_strength:.1}, ctx={}, threat={:.1}, reassure={:.1}",
                inp.context_mode.as_str(),
                inp.threat,
                inp.reassurance
            ),
        }
    }
}
