//! Telemetry event bus and Home Assistant service-call bridge.
//!
//! Both ride on an injected [`MqttPublisher`] — the runtime never owns an
//! MQTT client directly. Diagnostic publishes are fire-and-forget at QoS 0
//! and must never raise into the request path; service calls go out at
//! QoS 1 and report delivery so intent handlers can speak an honest result.

use crate::clock::epoch_secs;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Topic all orchestrator telemetry is published under.
pub const BASE_TOPIC: &str = "halcyon";
/// Topic carrying Home Assistant service-call records.
pub const HA_SERVICE_TOPIC: &str = "halcyon/ha/call";
/// Topic filter the external bridge subscribes to for HA state events.
pub const HA_EVENT_TOPIC: &str = "halcyon/ha/event/#";

/// Transport seam for an MQTT-like pub/sub broker connection.
///
/// Implementations wrap whatever client the deployment uses; tests supply
/// a recording publisher (see [`crate::test_utils::RecordingPublisher`]).
pub trait MqttPublisher: Send + Sync {
    /// Publish a JSON payload. Returns whether the broker accepted delivery
    /// at the requested QoS level.
    fn publish(&self, topic: &str, payload: &Value, qos: u8) -> bool;
}

/// Publishes orchestrator telemetry to diagnostic topics.
#[derive(Clone)]
pub struct EventBus {
    publisher: Arc<dyn MqttPublisher>,
    base_topic: String,
}

impl EventBus {
    /// Create a bus over `publisher` with the default `halcyon` base topic.
    #[must_use]
    pub fn new(publisher: Arc<dyn MqttPublisher>) -> Self {
        Self::with_base_topic(publisher, BASE_TOPIC)
    }

    /// Create a bus with a custom base topic (trailing slashes trimmed).
    #[must_use]
    pub fn with_base_topic(publisher: Arc<dyn MqttPublisher>, base_topic: &str) -> Self {
        Self {
            publisher,
            base_topic: base_topic.trim_end_matches('/').to_owned(),
        }
    }

    /// Publish a payload under `{base_topic}/{suffix}`, stamping `ts` with
    /// the current epoch seconds when the payload does not already carry one.
    ///
    /// Failures are dropped; diagnostics never break the core loop.
    pub fn publish(&self, topic_suffix: &str, payload: Value) {
        let topic = format!("{}/{}", self.base_topic, topic_suffix.trim_start_matches('/'));
        let mut message = match payload {
            Value::Object(map) => map,
            other => {
                debug!("non-object telemetry payload on {topic}: {other}");
                return;
            }
        };
        message
            .entry("ts")
            .or_insert_with(|| json!(epoch_secs()));
        if !self.publisher.publish(&topic, &Value::Object(message), 0) {
            debug!("telemetry publish dropped for {topic}");
        }
    }
}

/// Home Assistant bridge publishing service-call records over MQTT.
#[derive(Clone)]
pub struct HaBridge {
    publisher: Arc<dyn MqttPublisher>,
    service_topic: String,
}

impl HaBridge {
    /// Create a bridge publishing to the default service-call topic.
    #[must_use]
    pub fn new(publisher: Arc<dyn MqttPublisher>) -> Self {
        Self {
            publisher,
            service_topic: HA_SERVICE_TOPIC.to_owned(),
        }
    }

    /// Request a Home Assistant service call.
    ///
    /// The record is `{domain, service, data, ts}` at QoS 1. Returns whether
    /// the broker acknowledged the publish.
    pub fn call_service(&self, domain: &str, service: &str, data: Value) -> bool {
        let payload = json!({
            "domain": domain,
            "service": service,
            "data": data,
            "ts": epoch_secs(),
        });
        let ok = self.publisher.publish(&self.service_topic, &payload, 1);
        if !ok {
            debug!("service call publish failed: {domain}.{service}");
        }
        ok
    }
}
