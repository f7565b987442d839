//! Persona response agents.
//!
//! Each persona renders spoken responses in its own register: HALSTON is
//! calm and verbose, SCARLET is terse and security-minded. The orchestrator
//! picks the agent matching the active persona and never calls both.

mod halston;
mod scarlet;

pub use halston::{HalstonAgent, HalstonConfig, IntentLexicon};
pub use scarlet::{EscalationHook, IncidentRecord, ScarletAgent, ScarletConfig};

use crate::trust::Role;
use serde_json::Value;

/// Reason an action was refused, handed to an agent for rendering.
#[derive(Debug, Clone, Default)]
pub struct AccessDenial {
    /// Human-readable reason, when one is known.
    pub reason: Option<String>,
    /// Minimum role that would have been required.
    pub required_role: Option<Role>,
}

impl AccessDenial {
    /// Denial with an explicit reason.
    #[must_use]
    pub fn with_reason(reason: &str) -> Self {
        Self {
            reason: Some(reason.to_owned()),
            required_role: None,
        }
    }
}

/// Common surface of the two persona agents.
pub trait PersonaAgent: Send {
    /// Infer an intent name from raw text, honoring an upstream hint.
    fn infer_intent(&self, text: &str, hint: Option<&str>) -> String;

    /// Produce the persona's spoken preamble for a turn.
    fn generate_response(&mut self, text: &str, intent: Option<&str>, metadata: &Value) -> String;

    /// Render a refusal in the persona's register.
    fn build_denied_response(&self, denial: &AccessDenial) -> String;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    #[test]
    fn agents_render_distinct_denials() {
        let halston = HalstonAgent::default();
        let scarlet = ScarletAgent::default();
        let denial = AccessDenial::with_reason("That function is not available right now.");

        let soft = halston.build_denied_response(&denial);
        let hard = scarlet.build_denied_response(&denial);
        assert!(soft.contains("I must decline"));
        assert!(hard.starts_with("Denied."));
        assert!(soft.contains("not available"));
        assert!(hard.contains("not available"));
    }

    #[test]
    fn agents_render_distinct_preambles() {
        let mut halston = HalstonAgent::default();
        let mut scarlet = ScarletAgent::default();
        let meta = json!({});

        let calm = halston.generate_response("turn on the light", Some("turn_on_light"), &meta);
        let sharp = scarlet.generate_response("turn on the light", Some("turn_on_light"), &meta);
        assert!(calm.contains("Halston here"));
        assert!(sharp.contains("Scarlet assuming control"));
    }
}
