//! HALSTON persona runtime: the calm, reassuring household voice.

use super::{AccessDenial, PersonaAgent};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};

/// Configurable keyword-to-intent mapping entry.
#[derive(Debug, Clone)]
pub struct IntentLexicon {
    /// Canonical intent name.
    pub intent: String,
    /// Keywords whose presence selects the intent.
    pub keywords: Vec<String>,
}

/// Configuration values for the HALSTON agent.
#[derive(Debug, Clone)]
pub struct HalstonConfig {
    /// Display name used in responses.
    pub name: String,
    /// Tone descriptor woven into responses.
    pub tone: String,
    /// Lexicon consulted when no intent hint is provided.
    pub intent_lexicon: Vec<IntentLexicon>,
    /// Intent assumed when nothing matches.
    pub fallback_intent: String,
    /// Conversation turns retained for context summaries.
    pub max_history: usize,
}

impl Default for HalstonConfig {
    fn default() -> Self {
        Self {
            name: "Halston".to_owned(),
            tone: "calm, reassuring".to_owned(),
            intent_lexicon: Vec::new(),
            fallback_intent: "general.assistance".to_owned(),
            max_history: 6,
        }
    }
}

struct ConversationMemory {
    intent: String,
}

/// Conversational agent for the HALSTON persona.
pub struct HalstonAgent {
    config: HalstonConfig,
    history: VecDeque<ConversationMemory>,
}

impl Default for HalstonAgent {
    fn default() -> Self {
        Self::new(HalstonConfig::default())
    }
}

impl HalstonAgent {
    /// Create an agent with the given configuration.
    #[must_use]
    pub fn new(config: HalstonConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    fn summarize_context(&self) -> Option<String> {
        if self.history.is_empty() {
            return None;
        }
        let intents: HashSet<&str> = self
            .history
            .iter()
            .map(|entry| entry.intent.as_str())
            .collect();
        if intents.len() == 1 {
            let intent = intents.iter().next().copied().unwrap_or_default();
            Some(format!("a series of '{intent}' tasks"))
        } else {
            Some("a mixture of tasks".to_owned())
        }
    }
}

impl PersonaAgent for HalstonAgent {
    fn infer_intent(&self, text: &str, hint: Option<&str>) -> String {
        if let Some(hint) = hint {
            return hint.to_owned();
        }
        let lowered = text.to_lowercase();
        for lex in &self.config.intent_lexicon {
            if lex
                .keywords
                .iter()
                .any(|keyword| lowered.contains(&keyword.to_lowercase()))
            {
                return lex.intent.clone();
            }
        }
        self.config.fallback_intent.clone()
    }

    fn generate_response(&mut self, _text: &str, intent: Option<&str>, _metadata: &Value) -> String {
        let intent_name = intent.unwrap_or(&self.config.fallback_intent).to_owned();
        let polite_prefix = if intent_name == self.config.fallback_intent {
            "Of course."
        } else {
            "Certainly."
        };
        let context_summary = self.summarize_context();

        if self.history.len() == self.config.max_history {
            self.history.pop_front();
        }
        self.history.push_back(ConversationMemory {
            intent: intent_name.clone(),
        });

        let mut response = format!(
            "{polite_prefix} {} here. I will handle the '{intent_name}' request with {} attention.",
            self.config.name, self.config.tone
        );
        if let Some(summary) = context_summary {
            response.push_str(&format!(" We have recently discussed {summary}."));
        }
        response
    }

    fn build_denied_response(&self, denial: &AccessDenial) -> String {
        let reason = match (&denial.reason, denial.required_role) {
            (Some(reason), _) => reason.clone(),
            (None, Some(role)) => format!(
                "This action requires {} clearance and cannot be performed just now.",
                role.as_str()
            ),
            (None, None) => "I am unable to comply with that request.".to_owned(),
        };
        format!(
            "Apologies, but I must decline. {reason} Please consult an administrator if you \
             believe this is in error."
        )
    }
}
