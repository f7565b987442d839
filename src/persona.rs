//! Persona mode-switching finite state machine.
//!
//! Determines when the runtime switches between the HALSTON and SCARLET
//! personas. Threat and reassurance evidence accumulates in bounded sliding
//! windows; switches happen only on sustained evidence and are rate-limited
//! by a cooldown. Manual overrides always take precedence.

use crate::config::PersonaConfig;
use crate::error::{HalcyonError, Result};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::info;

/// One of the two response personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persona {
    /// Calm, verbose household persona. Initial state.
    Halston,
    /// Terse, security-minded persona.
    Scarlet,
}

impl Persona {
    /// Canonical uppercase name (`HALSTON` / `SCARLET`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Halston => "HALSTON",
            Persona::Scarlet => "SCARLET",
        }
    }

    /// Lowercase telemetry label (`halston` / `scarlet`).
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Persona::Halston => "halston",
            Persona::Scarlet => "scarlet",
        }
    }
}

/// Normalized threat detection signal.
///
/// Severity is in [0, 1]. The source and description fields keep the signal
/// auditable after the fact.
#[derive(Debug, Clone)]
pub struct ThreatSignal {
    /// Severity in [0, 1].
    pub severity: f64,
    /// Producer of the signal (detector name, `trust_bias`, ...).
    pub source: String,
    /// Free-text context, trimmed on construction.
    pub description: String,
}

impl ThreatSignal {
    /// Build a validated signal.
    pub fn new(severity: f64, source: &str, description: &str) -> Result<Self> {
        if !(0.0..=1.0).contains(&severity) {
            return Err(HalcyonError::Config(
                "threat severity must be within [0, 1]".into(),
            ));
        }
        if source.trim().is_empty() {
            return Err(HalcyonError::Config("threat source must be set".into()));
        }
        Ok(Self {
            severity,
            source: source.to_owned(),
            description: description.trim().to_owned(),
        })
    }
}

/// Explicit acknowledgement that the situation is safe.
#[derive(Debug, Clone)]
pub struct ReassuranceSignal {
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Producer of the signal.
    pub source: String,
}

impl ReassuranceSignal {
    /// Build a validated signal.
    pub fn new(confidence: f64, source: &str) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(HalcyonError::Config(
                "reassurance confidence must be within [0, 1]".into(),
            ));
        }
        if source.trim().is_empty() {
            return Err(HalcyonError::Config(
                "reassurance source must be set".into(),
            ));
        }
        Ok(Self {
            confidence,
            source: source.to_owned(),
        })
    }
}

/// Finite state machine managing persona transitions.
pub struct PersonaStateMachine {
    config: PersonaConfig,
    state: Persona,
    threat_signals: VecDeque<ThreatSignal>,
    reassurance_signals: VecDeque<ReassuranceSignal>,
    last_switch: Instant,
    manual_override: Option<Persona>,
}

impl PersonaStateMachine {
    /// Create a machine in the HALSTON state.
    pub fn new(config: PersonaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Persona::Halston,
            threat_signals: VecDeque::new(),
            reassurance_signals: VecDeque::new(),
            last_switch: Instant::now(),
            manual_override: None,
        })
    }

    /// Create a machine with an explicit starting state.
    pub fn with_state(config: PersonaConfig, state: Persona) -> Result<Self> {
        let mut machine = Self::new(config)?;
        machine.state = state;
        Ok(machine)
    }

    /// Current persona, honoring any manual override.
    #[must_use]
    pub fn state(&self) -> Persona {
        self.manual_override.unwrap_or(self.state)
    }

    /// Force the persona to a specific state, or pass `None` to clear the
    /// override and resume automatic switching.
    pub fn set_manual_override(&mut self, persona: Option<Persona>) {
        self.manual_override = persona;
        if let Some(persona) = persona {
            self.state = persona;
            self.last_switch = Instant::now();
            info!("persona manually pinned to {}", persona.as_str());
        }
    }

    /// Register a threat signal and evaluate transitions.
    pub fn register_threat(&mut self, signal: ThreatSignal) -> Persona {
        self.push_threat(signal);
        self.evaluate()
    }

    /// Register a reassurance signal and evaluate transitions.
    pub fn register_reassurance(&mut self, signal: ReassuranceSignal) -> Persona {
        self.push_reassurance(signal);
        self.evaluate()
    }

    /// Consume a batch of signals before a single transition evaluation.
    pub fn consume_bulk(
        &mut self,
        threats: impl IntoIterator<Item = ThreatSignal>,
        reassurances: impl IntoIterator<Item = ReassuranceSignal>,
    ) -> Persona {
        for threat in threats {
            self.push_threat(threat);
        }
        for reassurance in reassurances {
            self.push_reassurance(reassurance);
        }
        self.evaluate()
    }

    fn push_threat(&mut self, signal: ThreatSignal) {
        if self.threat_signals.len() == self.config.lookback_window {
            self.threat_signals.pop_front();
        }
        self.threat_signals.push_back(signal);
    }

    fn push_reassurance(&mut self, signal: ReassuranceSignal) {
        if self.reassurance_signals.len() == self.config.lookback_window {
            self.reassurance_signals.pop_front();
        }
        self.reassurance_signals.push_back(signal);
    }

    fn evaluate(&mut self) -> Persona {
        if let Some(persona) = self.manual_override {
            return persona;
        }

        // Within cooldown the state is frozen, but evidence keeps
        // accumulating for later evaluation.
        if self.last_switch.elapsed().as_secs_f64() < self.config.cooldown_seconds {
            return self.state;
        }

        if self.should_escalate() {
            self.state = Persona::Scarlet;
            self.last_switch = Instant::now();
            self.reassurance_signals.clear();
            info!("persona escalated to SCARLET");
        } else if self.should_deescalate() {
            self.state = Persona::Halston;
            self.last_switch = Instant::now();
            self.threat_signals.clear();
            info!("persona de-escalated to HALSTON");
        }
        self.state
    }

    fn should_escalate(&self) -> bool {
        let count = self.config.sustained_escalation_count;
        if self.threat_signals.len() < count {
            return false;
        }
        let recent: Vec<&ThreatSignal> =
            self.threat_signals.iter().rev().take(count).collect();
        if recent
            .iter()
            .any(|sig| sig.severity < self.config.escalate_threshold)
        {
            return false;
        }
        let mean = recent.iter().map(|sig| sig.severity).sum::<f64>() / recent.len() as f64;
        mean >= self.config.escalate_threshold
    }

    fn should_deescalate(&self) -> bool {
        let count = self.config.sustained_reassurance_count;
        if self.reassurance_signals.len() < count {
            return false;
        }
        let mean_confidence = self
            .reassurance_signals
            .iter()
            .rev()
            .take(count)
            .map(|sig| sig.confidence)
            .sum::<f64>()
            / count as f64;
        if mean_confidence < self.config.deescalate_threshold {
            return false;
        }
        if self.threat_signals.is_empty() {
            return true;
        }
        let mean_threat = self.threat_signals.iter().map(|sig| sig.severity).sum::<f64>()
            / self.threat_signals.len() as f64;
        mean_threat <= self.config.deescalate_threshold
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn fast_config() -> PersonaConfig {
        PersonaConfig {
            cooldown_seconds: 0.0,
            ..PersonaConfig::default()
        }
    }

    fn threat(severity: f64) -> ThreatSignal {
        ThreatSignal::new(severity, "test", "").unwrap()
    }

    fn reassurance(confidence: f64) -> ReassuranceSignal {
        ReassuranceSignal::new(confidence, "test").unwrap()
    }

    #[test]
    fn starts_in_halston() {
        let machine = PersonaStateMachine::new(PersonaConfig::default()).unwrap();
        assert_eq!(machine.state(), Persona::Halston);
    }

    #[test]
    fn sustained_threats_escalate() {
        let mut machine = PersonaStateMachine::new(fast_config()).unwrap();
        assert_eq!(machine.register_threat(threat(0.9)), Persona::Halston);
        assert_eq!(machine.register_threat(threat(0.8)), Persona::Scarlet);
    }

    #[test]
    fn single_threat_does_not_escalate() {
        let mut machine = PersonaStateMachine::new(fast_config()).unwrap();
        assert_eq!(machine.register_threat(threat(1.0)), Persona::Halston);
    }

    #[test]
    fn weak_threat_breaks_the_streak() {
        let mut machine = PersonaStateMachine::new(fast_config()).unwrap();
        machine.register_threat(threat(0.9));
        machine.register_threat(threat(0.2));
        assert_eq!(machine.state(), Persona::Halston);
    }

    #[test]
    fn escalation_clears_reassurance_window() {
        let mut machine = PersonaStateMachine::new(fast_config()).unwrap();
        machine.register_reassurance(reassurance(0.9));
        machine.register_reassurance(reassurance(0.9));
        machine.register_threat(threat(0.9));
        machine.register_threat(threat(0.9));
        assert_eq!(machine.state(), Persona::Scarlet);
        // A single fresh reassurance is not enough to flip back.
        assert_eq!(
            machine.register_reassurance(reassurance(0.9)),
            Persona::Scarlet
        );
    }

    #[test]
    fn sustained_reassurance_deescalates() {
        let mut machine = PersonaStateMachine::with_state(fast_config(), Persona::Scarlet).unwrap();
        machine.register_reassurance(reassurance(0.5));
        machine.register_reassurance(reassurance(0.5));
        assert_eq!(
            machine.register_reassurance(reassurance(0.5)),
            Persona::Halston
        );
    }

    #[test]
    fn lingering_threat_blocks_deescalation() {
        let mut machine = PersonaStateMachine::with_state(fast_config(), Persona::Scarlet).unwrap();
        machine.register_threat(threat(0.9));
        machine.register_reassurance(reassurance(0.5));
        machine.register_reassurance(reassurance(0.5));
        assert_eq!(
            machine.register_reassurance(reassurance(0.5)),
            Persona::Scarlet
        );
    }

    #[test]
    fn cooldown_freezes_state_but_not_evidence() {
        let config = PersonaConfig {
            cooldown_seconds: 60.0,
            ..PersonaConfig::default()
        };
        let mut machine = PersonaStateMachine::new(config).unwrap();
        // Fresh machine is inside the cooldown window.
        machine.register_threat(threat(0.9));
        assert_eq!(machine.register_threat(threat(0.9)), Persona::Halston);
        assert_eq!(machine.threat_signals.len(), 2);
    }

    #[test]
    fn no_double_switch_within_cooldown() {
        let config = PersonaConfig {
            cooldown_seconds: 0.0,
            ..PersonaConfig::default()
        };
        let mut machine = PersonaStateMachine::new(config).unwrap();
        machine.register_threat(threat(0.9));
        machine.register_threat(threat(0.9));
        assert_eq!(machine.state(), Persona::Scarlet);

        // Raise the cooldown: the switch just happened, so the sustained
        // reassurance below must not flip the state back yet.
        machine.config.cooldown_seconds = 60.0;
        for _ in 0..5 {
            machine.register_reassurance(reassurance(1.0));
        }
        assert_eq!(machine.state(), Persona::Scarlet);
    }

    #[test]
    fn manual_override_short_circuits() {
        let mut machine = PersonaStateMachine::new(fast_config()).unwrap();
        machine.set_manual_override(Some(Persona::Scarlet));
        assert_eq!(machine.state(), Persona::Scarlet);
        // Evidence cannot move an overridden machine.
        for _ in 0..5 {
            machine.register_reassurance(reassurance(1.0));
        }
        assert_eq!(machine.state(), Persona::Scarlet);

        machine.set_manual_override(None);
        for _ in 0..3 {
            machine.register_reassurance(reassurance(1.0));
        }
        assert_eq!(machine.state(), Persona::Halston);
    }

    #[test]
    fn consume_bulk_evaluates_once() {
        let mut machine = PersonaStateMachine::new(fast_config()).unwrap();
        let state = machine.consume_bulk(vec![threat(0.9), threat(0.9)], vec![]);
        assert_eq!(state, Persona::Scarlet);
    }

    #[test]
    fn window_is_bounded() {
        let config = PersonaConfig {
            lookback_window: 3,
            cooldown_seconds: 0.0,
            sustained_escalation_count: 5, // never met: window < count
            ..PersonaConfig::default()
        };
        let mut machine = PersonaStateMachine::new(config).unwrap();
        for _ in 0..10 {
            machine.register_threat(threat(0.9));
        }
        assert_eq!(machine.threat_signals.len(), 3);
        assert_eq!(machine.state(), Persona::Halston);
    }

    #[test]
    fn signal_validation_rejects_out_of_range() {
        assert!(ThreatSignal::new(1.5, "src", "").is_err());
        assert!(ThreatSignal::new(0.5, " ", "").is_err());
        assert!(ReassuranceSignal::new(-0.1, "src").is_err());
    }
}
