//! SCARLET persona runtime: terse, security-oriented escalation protocols.

use super::{AccessDenial, PersonaAgent};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Escalation callback bound to the intents that should trigger it.
#[derive(Clone)]
pub struct EscalationHook {
    /// Intents that fire this hook.
    pub intents: Vec<String>,
    /// Callback receiving the intent name and turn metadata.
    pub callback: Arc<dyn Fn(&str, &Value) + Send + Sync>,
}

/// Configuration for SCARLET persona behaviour.
#[derive(Clone)]
pub struct ScarletConfig {
    /// Display name used in responses.
    pub name: String,
    /// Tone descriptor woven into responses.
    pub tone: String,
    /// Intents that produce an escalation notice.
    pub monitored_intents: Vec<String>,
    /// Intent assumed when nothing matches.
    pub fallback_intent: String,
    /// Hooks fired for monitored intents.
    pub escalation_hooks: Vec<EscalationHook>,
}

impl Default for ScarletConfig {
    fn default() -> Self {
        Self {
            name: "Scarlet".to_owned(),
            tone: "quiet, direct".to_owned(),
            monitored_intents: vec!["security.alert".to_owned(), "system.override".to_owned()],
            fallback_intent: "security.review".to_owned(),
            escalation_hooks: Vec::new(),
        }
    }
}

/// Captured audit record of a security incident.
#[derive(Debug, Clone)]
pub struct IncidentRecord {
    /// Intent under which the incident was recorded.
    pub intent: String,
    /// Raw transcript of the turn.
    pub transcript: String,
    /// Turn metadata at capture time.
    pub metadata: Value,
}

/// Security persona responsible for high-risk interactions.
pub struct ScarletAgent {
    config: ScarletConfig,
    monitored: HashSet<String>,
    incidents: Vec<IncidentRecord>,
}

impl Default for ScarletAgent {
    fn default() -> Self {
        Self::new(ScarletConfig::default())
    }
}

impl ScarletAgent {
    /// Create an agent with the given configuration.
    #[must_use]
    pub fn new(config: ScarletConfig) -> Self {
        let monitored = config.monitored_intents.iter().cloned().collect();
        Self {
            config,
            monitored,
            incidents: Vec::new(),
        }
    }

    /// Most recent incident records, newest last.
    #[must_use]
    pub fn recent_incidents(&self, limit: usize) -> &[IncidentRecord] {
        let start = self.incidents.len().saturating_sub(limit);
        &self.incidents[start..]
    }

    fn notify_hooks(&self, intent: &str, metadata: &Value) {
        for hook in &self.config.escalation_hooks {
            if hook.intents.iter().any(|candidate| candidate == intent) {
                (hook.callback)(intent, metadata);
            }
        }
    }
}

impl PersonaAgent for ScarletAgent {
    fn infer_intent(&self, text: &str, hint: Option<&str>) -> String {
        if let Some(hint) = hint {
            return hint.to_owned();
        }
        let lowered = text.to_lowercase();
        if ["panic", "intruder", "help"]
            .iter()
            .any(|keyword| lowered.contains(keyword))
        {
            return "security.alert".to_owned();
        }
        if lowered.contains("override") || lowered.contains("admin") {
            return "system.override".to_owned();
        }
        self.config.fallback_intent.clone()
    }

    fn generate_response(&mut self, text: &str, intent: Option<&str>, metadata: &Value) -> String {
        let intent_name = intent.unwrap_or(&self.config.fallback_intent).to_owned();
        self.incidents.push(IncidentRecord {
            intent: intent_name.clone(),
            transcript: text.to_owned(),
            metadata: metadata.clone(),
        });

        let monitored = self.monitored.contains(&intent_name);
        if monitored {
            self.notify_hooks(&intent_name, metadata);
        }

        let acknowledgement = if intent_name == "security.alert" {
            "Alert acknowledged."
        } else {
            "Understood."
        };
        let mut response = format!(
            "{acknowledgement} {} assuming control. Intent '{intent_name}' is being handled \
             with {} authority.",
            self.config.name, self.config.tone
        );
        if monitored {
            response.push_str(" I am escalating to the appropriate safeguards.");
        }
        response
    }

    fn build_denied_response(&self, denial: &AccessDenial) -> String {
        let reason = denial
            .reason
            .as_deref()
            .unwrap_or("The requested action is outside permitted scope.");
        format!("Denied. {reason}")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn security_keywords_map_to_alert() {
        let agent = ScarletAgent::default();
        assert_eq!(agent.infer_intent("there is an intruder", None), "security.alert");
        assert_eq!(agent.infer_intent("admin override now", None), "system.override");
        assert_eq!(agent.infer_intent("hello", None), "security.review");
        assert_eq!(agent.infer_intent("hello", Some("custom")), "custom");
    }

    #[test]
    fn incidents_are_recorded() {
        let mut agent = ScarletAgent::default();
        let meta = json!({"turn": 1});
        agent.generate_response("check the door", Some("security.review"), &meta);
        agent.generate_response("intruder!", Some("security.alert"), &meta);

        let recent = agent.recent_incidents(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].intent, "security.alert");
        assert_eq!(recent[1].transcript, "intruder!");
    }

    #[test]
    fn recent_incidents_respects_limit() {
        let mut agent = ScarletAgent::default();
        let meta = json!({});
        for i in 0..5 {
            agent.generate_response(&format!("event {i}"), Some("security.review"), &meta);
        }
        assert_eq!(agent.recent_incidents(2).len(), 2);
        assert_eq!(agent.recent_incidents(2)[1].transcript, "event 4");
    }

    #[test]
    fn monitored_intent_fires_hooks_and_escalation_notice() {
        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = fired.clone();
        let config = ScarletConfig {
            escalation_hooks: vec![EscalationHook {
                intents: vec!["security.alert".to_owned()],
                callback: Arc::new(move |intent, _meta| {
                    fired_clone.lock().unwrap().push(intent.to_owned());
                }),
            }],
            ..ScarletConfig::default()
        };
        let mut agent = ScarletAgent::new(config);
        let response = agent.generate_response("intruder", Some("security.alert"), &json!({}));

        assert!(response.contains("Alert acknowledged."));
        assert!(response.contains("escalating to the appropriate safeguards"));
        assert_eq!(fired.lock().unwrap().as_slice(), ["security.alert"]);
    }

    #[test]
    fn unmonitored_intent_skips_hooks() {
        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = fired.clone();
        let config = ScarletConfig {
            escalation_hooks: vec![EscalationHook {
                intents: vec!["security.alert".to_owned()],
                callback: Arc::new(move |intent, _meta| {
                    fired_clone.lock().unwrap().push(intent.to_owned());
                }),
            }],
            ..ScarletConfig::default()
        };
        let mut agent = ScarletAgent::new(config);
        agent.generate_response("hello", Some("security.review"), &json!({}));
        assert!(fired.lock().unwrap().is_empty());
    }
}
