//! Home-automation intent handlers.
//!
//! Each handler translates slots into a Home Assistant service-call record
//! published through the [`HaBridge`] and speaks a short confirmation or
//! failure line.

use super::{IntentContext, IntentDispatcherBuilder, IntentHandler, IntentResult};
use crate::telemetry::HaBridge;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Register the full set of home-automation handlers on a builder.
#[must_use]
pub fn register_home_intents(
    builder: IntentDispatcherBuilder,
    bridge: &HaBridge,
) -> IntentDispatcherBuilder {
    builder
        .register(
            "turn_on_light",
            Arc::new(ServiceCallHandler {
                bridge: bridge.clone(),
                domain: "light",
                service: "turn_on",
                success: "Done.",
                failure: "I couldn't reach that light.",
                entity: EntitySlot::Required("Which light?"),
            }),
        )
        .register(
            "turn_off_light",
            Arc::new(ServiceCallHandler {
                bridge: bridge.clone(),
                domain: "light",
                service: "turn_off",
                success: "Done.",
                failure: "I couldn't reach that light.",
                entity: EntitySlot::Required("Which light?"),
            }),
        )
        .register(
            "media_play_pause",
            Arc::new(ServiceCallHandler {
                bridge: bridge.clone(),
                domain: "media_player",
                service: "media_play_pause",
                success: "Okay.",
                failure: "I couldn't control that player.",
                entity: EntitySlot::Default("media_player.living_room"),
            }),
        )
        .register(
            "lock_door",
            Arc::new(ServiceCallHandler {
                bridge: bridge.clone(),
                domain: "lock",
                service: "lock",
                success: "Locked.",
                failure: "I couldn't lock it.",
                entity: EntitySlot::Default("lock.front_door"),
            }),
        )
        .register(
            "unlock_door",
            Arc::new(ServiceCallHandler {
                bridge: bridge.clone(),
                domain: "lock",
                service: "unlock",
                success: "Unlocked.",
                failure: "I couldn't unlock it.",
                entity: EntitySlot::Default("lock.front_door"),
            }),
        )
        .register(
            "open_garage",
            Arc::new(ServiceCallHandler {
                bridge: bridge.clone(),
                domain: "cover",
                service: "open_cover",
                success: "Opening the garage.",
                failure: "I couldn't open it.",
                entity: EntitySlot::Default("cover.garage"),
            }),
        )
        .register(
            "set_temperature",
            Arc::new(SetTemperatureHandler {
                bridge: bridge.clone(),
            }),
        )
        .register(
            "disarm_alarm",
            Arc::new(DisarmAlarmHandler {
                bridge: bridge.clone(),
            }),
        )
}

enum EntitySlot {
    /// Deny with the given prompt when the slot is absent.
    Required(&'static str),
    /// Fall back to a fixed entity when the slot is absent.
    Default(&'static str),
}

/// Generic single-entity service call.
struct ServiceCallHandler {
    bridge: HaBridge,
    domain: &'static str,
    service: &'static str,
    success: &'static str,
    failure: &'static str,
    entity: EntitySlot,
}

fn entity_from(slots: &Map<String, Value>) -> Option<String> {
    slots
        .get("entity_id")
        .and_then(Value::as_str)
        .filter(|entity| !entity.is_empty())
        .map(str::to_owned)
}

#[async_trait]
impl IntentHandler for ServiceCallHandler {
    async fn handle(&self, slots: &Map<String, Value>, _ctx: &IntentContext) -> IntentResult {
        let entity = match (&self.entity, entity_from(slots)) {
            (_, Some(entity)) => entity,
            (EntitySlot::Default(default), None) => (*default).to_owned(),
            (EntitySlot::Required(prompt), None) => return IntentResult::deny(prompt),
        };
        let ok = self
            .bridge
            .call_service(self.domain, self.service, json!({"entity_id": entity}));
        IntentResult::from_call(ok, self.success, self.failure)
    }
}

/// Climate control with a required temperature slot.
struct SetTemperatureHandler {
    bridge: HaBridge,
}

#[async_trait]
impl IntentHandler for SetTemperatureHandler {
    async fn handle(&self, slots: &Map<String, Value>, _ctx: &IntentContext) -> IntentResult {
        let entity = entity_from(slots).unwrap_or_else(|| "climate.living".to_owned());
        let Some(temperature) = slots.get("temperature").and_then(Value::as_f64) else {
            return IntentResult::deny("What temperature?");
        };
        let ok = self.bridge.call_service(
            "climate",
            "set_temperature",
            json!({"entity_id": entity, "temperature": temperature}),
        );
        IntentResult::from_call(ok, "Temperature set.", "I couldn't complete that.")
    }
}

/// Alarm disarm; the dispatcher guarantees a code is present.
struct DisarmAlarmHandler {
    bridge: HaBridge,
}

#[async_trait]
impl IntentHandler for DisarmAlarmHandler {
    async fn handle(&self, slots: &Map<String, Value>, _ctx: &IntentContext) -> IntentResult {
        let Some(code) = slots.get("code").filter(|code| !code.is_null()) else {
            return IntentResult::deny("I need the code to disarm.");
        };
        let entity = entity_from(slots).unwrap_or_else(|| "alarm_control_panel.home".to_owned());
        let ok = self.bridge.call_service(
            "alarm_control_panel",
            "alarm_disarm",
            json!({"entity_id": entity, "code": code}),
        );
        IntentResult::from_call(ok, "Alarm disarmed.", "I couldn't disarm the alarm.")
    }
}
