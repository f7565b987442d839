//! Deterministic keyword intent classification.
//!
//! The router applies ordered heuristics over lowercased text: media
//! phrases first, then security-sensitive commands, lighting, climate,
//! media playback, and finally a persona-biased fallback. First match
//! wins, and classification is a pure function of the text and role.

pub mod media;

use crate::trust::{PersonaBias, Role};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Outcome of lightweight keyword intent parsing.
#[derive(Debug, Clone)]
pub struct IntentClassification {
    /// Canonical intent name, or `None` when nothing matched.
    pub intent: Option<String>,
    /// Extracted parameters (entity ids, temperatures, picks).
    pub slots: Map<String, Value>,
    /// Whether the intent is security-sensitive.
    pub sensitive: bool,
    /// Persona preference suggested by the classification.
    pub persona_bias: PersonaBias,
    /// Heuristic confidence in [0, 1].
    pub confidence: f64,
}

impl IntentClassification {
    fn unmatched(persona_bias: PersonaBias, confidence: f64) -> Self {
        Self {
            intent: None,
            slots: Map::new(),
            sensitive: false,
            persona_bias,
            confidence,
        }
    }
}

/// Keyword -> entity mappings consulted during slot filling.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Room keyword to light entity.
    pub light_entities: HashMap<String, String>,
    /// Door keyword to lock entity.
    pub lock_entities: HashMap<String, String>,
    /// Room keyword to climate entity.
    pub climate_entities: HashMap<String, String>,
    /// Room keyword to media player entity.
    pub media_entities: HashMap<String, String>,
    /// Garage cover entity.
    pub garage_entity: String,
    /// Fallback light entity.
    pub default_light: Option<String>,
    /// Fallback lock entity.
    pub default_lock: Option<String>,
    /// Fallback media player entity.
    pub default_media_player: Option<String>,
    /// Fallback climate entity.
    pub default_climate: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let entity_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<HashMap<_, _>>()
        };
        Self {
            light_entities: entity_map(&[
                ("kitchen", "light.kitchen"),
                ("living room", "light.living_room"),
                ("hall", "light.hallway"),
            ]),
            lock_entities: entity_map(&[
                ("front", "lock.front_door"),
                ("back", "lock.back_door"),
                ("garage", "lock.garage_entry"),
            ]),
            climate_entities: entity_map(&[
                ("living", "climate.living"),
                ("bedroom", "climate.bedroom"),
            ]),
            media_entities: entity_map(&[
                ("living", "media_player.living_room"),
                ("kitchen", "media_player.kitchen"),
            ]),
            garage_entity: "cover.garage".to_owned(),
            default_light: Some("light.living_room".to_owned()),
            default_lock: Some("lock.front_door".to_owned()),
            default_media_player: Some("media_player.living_room".to_owned()),
            default_climate: Some("climate.living".to_owned()),
        }
    }
}

static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d{2,3})(?:\.?\d)?").expect("temperature pattern"));

/// Applies deterministic keyword heuristics to classify intents.
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    config: RouterConfig,
}

impl MessageRouter {
    /// Create a router with the given entity vocabularies.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Return the canonical intent, slots, and persona bias for `text`.
    #[must_use]
    pub fn classify(&self, text: &str, role: Role) -> IntentClassification {
        let lowered = text.to_lowercase();
        let lowered = lowered.trim();
        if lowered.is_empty() {
            return IntentClassification::unmatched(PersonaBias::Halston, 0.0);
        }

        if let Some((intent, slots)) = media::detect_media_intent(lowered) {
            return IntentClassification {
                intent: Some(intent.to_owned()),
                slots,
                sensitive: false,
                persona_bias: PersonaBias::Halston,
                confidence: 0.85,
            };
        }

        // Security-first commands.
        if lowered.contains("disarm") && lowered.contains("alarm") {
            return IntentClassification {
                intent: Some("disarm_alarm".to_owned()),
                slots: Map::new(),
                sensitive: true,
                persona_bias: PersonaBias::Scarlet,
                confidence: 0.9,
            };
        }
        if lowered.contains("unlock") && lowered.contains("door") {
            return IntentClassification {
                intent: Some("unlock_door".to_owned()),
                slots: self.entity_slot(lowered, &self.config.lock_entities, &self.config.default_lock),
                sensitive: true,
                persona_bias: PersonaBias::Scarlet,
                confidence: 0.85,
            };
        }
        if lowered.contains("open") && lowered.contains("garage") {
            let mut slots = Map::new();
            slots.insert("entity_id".to_owned(), json!(self.config.garage_entity));
            return IntentClassification {
                intent: Some("open_garage".to_owned()),
                slots,
                sensitive: true,
                persona_bias: PersonaBias::Scarlet,
                confidence: 0.8,
            };
        }
        if lowered.contains("lock") && lowered.contains("door") {
            return IntentClassification {
                intent: Some("lock_door".to_owned()),
                slots: self.entity_slot(lowered, &self.config.lock_entities, &self.config.default_lock),
                sensitive: true,
                persona_bias: if matches!(role, Role::Guest | Role::Unknown) {
                    PersonaBias::Scarlet
                } else {
                    PersonaBias::Neutral
                },
                confidence: 0.8,
            };
        }

        // Lighting.
        if ["turn on", "switch on", "lights on"]
            .iter()
            .any(|token| lowered.contains(token))
        {
            return IntentClassification {
                intent: Some("turn_on_light".to_owned()),
                slots: self.entity_slot(lowered, &self.config.light_entities, &self.config.default_light),
                sensitive: false,
                persona_bias: PersonaBias::Halston,
                confidence: 0.75,
            };
        }
        if ["turn off", "switch off", "lights off"]
            .iter()
            .any(|token| lowered.contains(token))
        {
            return IntentClassification {
                intent: Some("turn_off_light".to_owned()),
                slots: self.entity_slot(lowered, &self.config.light_entities, &self.config.default_light),
                sensitive: false,
                persona_bias: PersonaBias::Halston,
                confidence: 0.75,
            };
        }

        // Climate.
        if lowered.contains("temperature") || lowered.contains("thermostat") {
            let mut slots =
                self.entity_slot(lowered, &self.config.climate_entities, &self.config.default_climate);
            if let Some(temperature) = extract_temperature(lowered) {
                slots.insert("temperature".to_owned(), json!(temperature));
            }
            return IntentClassification {
                intent: Some("set_temperature".to_owned()),
                slots,
                sensitive: false,
                persona_bias: PersonaBias::Halston,
                confidence: 0.7,
            };
        }

        // Media playback.
        if lowered.contains("play") || lowered.contains("pause") {
            return IntentClassification {
                intent: Some("media_play_pause".to_owned()),
                slots: self.entity_slot(
                    lowered,
                    &self.config.media_entities,
                    &self.config.default_media_player,
                ),
                sensitive: false,
                persona_bias: PersonaBias::Halston,
                confidence: 0.6,
            };
        }

        // No clear intent.
        let bias = if matches!(role, Role::Guest | Role::Unknown) {
            PersonaBias::Scarlet
        } else {
            PersonaBias::Halston
        };
        IntentClassification::unmatched(bias, 0.3)
    }

    /// Longest-keyword entity match with a per-domain default.
    fn entity_slot(
        &self,
        lowered_text: &str,
        vocabulary: &HashMap<String, String>,
        default: &Option<String>,
    ) -> Map<String, Value> {
        let mut keywords: Vec<(&String, &String)> = vocabulary.iter().collect();
        keywords.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        let entity = keywords
            .into_iter()
            .find(|(keyword, _)| lowered_text.contains(keyword.as_str()))
            .map(|(_, entity)| entity.clone())
            .or_else(|| default.clone());

        let mut slots = Map::new();
        match entity {
            Some(entity) => {
                slots.insert("entity_id".to_owned(), json!(entity));
            }
            None => {
                slots.insert("entity_id".to_owned(), Value::Null);
            }
        }
        slots
    }
}

fn extract_temperature(lowered_text: &str) -> Option<f64> {
    TEMPERATURE
        .captures(lowered_text)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn classify(text: &str) -> IntentClassification {
        MessageRouter::default().classify(text, Role::Household)
    }

    #[test]
    fn kitchen_light_on() {
        let c = classify("Turn on the kitchen light");
        assert_eq!(c.intent.as_deref(), Some("turn_on_light"));
        assert_eq!(c.slots["entity_id"], json!("light.kitchen"));
        assert!(!c.sensitive);
        assert_eq!(c.persona_bias, PersonaBias::Halston);
    }

    #[test]
    fn lights_off_uses_default_entity() {
        let c = classify("switch off the lamp");
        assert_eq!(c.intent.as_deref(), Some("turn_off_light"));
        assert_eq!(c.slots["entity_id"], json!("light.living_room"));
    }

    #[test]
    fn longest_keyword_wins() {
        // "living room" must beat the shorter "living" climate key when both
        // vocabularies are in play for their own domains.
        let c = classify("turn on the living room lights");
        assert_eq!(c.slots["entity_id"], json!("light.living_room"));
    }

    #[test]
    fn disarm_alarm_is_sensitive_scarlet() {
        let c = classify("disarm the alarm now");
        assert_eq!(c.intent.as_deref(), Some("disarm_alarm"));
        assert!(c.sensitive);
        assert_eq!(c.persona_bias, PersonaBias::Scarlet);
    }

    #[test]
    fn unlock_door_resolves_lock_entity() {
        let c = classify("please unlock the front door");
        assert_eq!(c.intent.as_deref(), Some("unlock_door"));
        assert_eq!(c.slots["entity_id"], json!("lock.front_door"));
        assert!(c.sensitive);
    }

    #[test]
    fn open_garage_uses_cover_entity() {
        let c = classify("open the garage please");
        assert_eq!(c.intent.as_deref(), Some("open_garage"));
        assert_eq!(c.slots["entity_id"], json!("cover.garage"));
    }

    #[test]
    fn lock_door_bias_depends_on_role() {
        let router = MessageRouter::default();
        let guest = router.classify("lock the back door", Role::Guest);
        assert_eq!(guest.persona_bias, PersonaBias::Scarlet);
        let household = router.classify("lock the back door", Role::Household);
        assert_eq!(household.persona_bias, PersonaBias::Neutral);
        assert_eq!(household.slots["entity_id"], json!("lock.back_door"));
    }

    #[test]
    fn temperature_extraction() {
        let c = classify("set the thermostat to 21 degrees");
        assert_eq!(c.intent.as_deref(), Some("set_temperature"));
        assert_eq!(c.slots["temperature"], json!(21.0));
        assert_eq!(c.slots["entity_id"], json!("climate.living"));
    }

    #[test]
    fn temperature_missing_leaves_slot_out() {
        let c = classify("adjust the temperature a bit");
        assert_eq!(c.intent.as_deref(), Some("set_temperature"));
        assert!(!c.slots.contains_key("temperature"));
    }

    #[test]
    fn media_phrases_route_before_playback() {
        let c = classify("what should i watch tonight");
        assert_eq!(c.intent.as_deref(), Some(media::MEDIA_RECOMMEND));
    }

    #[test]
    fn play_routes_to_media_play_pause() {
        let c = classify("pause the living room tv");
        assert_eq!(c.intent.as_deref(), Some("media_play_pause"));
        assert_eq!(c.slots["entity_id"], json!("media_player.living_room"));
    }

    #[test]
    fn fallback_bias_by_role() {
        let router = MessageRouter::default();
        let guest = router.classify("tell me a story", Role::Guest);
        assert_eq!(guest.intent, None);
        assert_eq!(guest.persona_bias, PersonaBias::Scarlet);

        let owner = router.classify("tell me a story", Role::Owner);
        assert_eq!(owner.intent, None);
        assert_eq!(owner.persona_bias, PersonaBias::Halston);
    }

    #[test]
    fn empty_text_is_neutral_halston() {
        let c = classify("   ");
        assert_eq!(c.intent, None);
        assert_eq!(c.persona_bias, PersonaBias::Halston);
        assert!((c.confidence - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn classification_is_idempotent() {
        let router = MessageRouter::default();
        for text in [
            "turn on the kitchen light",
            "disarm the alarm",
            "what should i watch",
            "gibberish input",
        ] {
            let a = router.classify(text, Role::Guest);
            let b = router.classify(text, Role::Guest);
            assert_eq!(a.intent, b.intent);
            assert_eq!(a.slots, b.slots);
            assert_eq!(a.persona_bias, b.persona_bias);
            assert!((a.confidence - b.confidence).abs() < f64::EPSILON);
        }
    }
}
