//! Trust-gated intent dispatch.
//!
//! Every intent maps to a registered handler through an explicit name
//! table built once at startup. Admission rules run before any handler:
//! sensitive intents require `allow_sensitive`, alarm disarming requires a
//! code, and media intents require a configured media handler. Denials are
//! ordinary `IntentResult`s; handlers never panic the request path.

pub mod home;
pub mod media;

use crate::persona::Persona;
use crate::trust::{ContextMode, Role};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Intents that require `allow_sensitive` to pass admission.
pub const SENSITIVE_INTENTS: &[&str] = &["unlock_door", "open_garage", "disarm_alarm"];

/// Runtime context describing the caller's trust posture.
#[derive(Debug, Clone)]
pub struct IntentContext {
    /// Derived role for this turn.
    pub role: Role,
    /// Whether security-sensitive service calls are permitted.
    pub allow_sensitive: bool,
    /// Environmental mode.
    pub mode: ContextMode,
    /// Stable speaker UUID, if known.
    pub speaker_uuid: Option<String>,
    /// Temporary session identifier.
    pub session_id: Option<String>,
    /// Active persona for the turn.
    pub persona: Persona,
}

impl Default for IntentContext {
    fn default() -> Self {
        Self {
            role: Role::Guest,
            allow_sensitive: false,
            mode: ContextMode::Home,
            speaker_uuid: None,
            session_id: None,
            persona: Persona::Halston,
        }
    }
}

/// Result returned after attempting to fulfil an intent.
#[derive(Debug, Clone)]
pub struct IntentResult {
    /// Whether the intent was fulfilled.
    pub ok: bool,
    /// Spoken text for the persona agent to deliver.
    pub spoken: String,
    /// Structured details for telemetry and follow-up turns.
    pub details: Value,
}

impl IntentResult {
    /// Successful result with spoken confirmation.
    #[must_use]
    pub fn success(spoken: &str) -> Self {
        Self {
            ok: true,
            spoken: spoken.to_owned(),
            details: json!({}),
        }
    }

    /// Denial with a spoken reason.
    #[must_use]
    pub fn deny(spoken: &str) -> Self {
        Self {
            ok: false,
            spoken: spoken.to_owned(),
            details: json!({}),
        }
    }

    /// Pick success or failure wording from a service-call outcome.
    #[must_use]
    pub fn from_call(ok: bool, success: &str, failure: &str) -> Self {
        if ok {
            Self::success(success)
        } else {
            Self::deny(failure)
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// A single intent fulfilment routine.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    /// Fulfil the intent with the extracted slots.
    async fn handle(&self, slots: &Map<String, Value>, ctx: &IntentContext) -> IntentResult;
}

/// Conversational media operations, implemented by the media intent
/// handler. The dispatcher holds this interface so the media stack stays
/// optional and the dependency points one way.
#[async_trait]
pub trait MediaIntents: Send + Sync {
    /// Offer recommendations and cache them for follow-up picks.
    async fn recommend(&self, ctx: &IntentContext, slots: &Map<String, Value>) -> IntentResult;
    /// Request a previously offered title.
    async fn add_request(&self, ctx: &IntentContext, slots: &Map<String, Value>) -> IntentResult;
    /// Save a previously offered title to the watch list.
    async fn add_to_list(&self, ctx: &IntentContext, slots: &Map<String, Value>) -> IntentResult;
}

/// Builder assembling the intent name table.
#[derive(Default)]
pub struct IntentDispatcherBuilder {
    handlers: HashMap<String, Arc<dyn IntentHandler>>,
    media: Option<Arc<dyn MediaIntents>>,
}

impl IntentDispatcherBuilder {
    /// Register a handler under a canonical intent name.
    #[must_use]
    pub fn register(mut self, intent: &str, handler: Arc<dyn IntentHandler>) -> Self {
        self.handlers.insert(intent.to_lowercase(), handler);
        self
    }

    /// Attach the media operations interface.
    #[must_use]
    pub fn with_media(mut self, media: Arc<dyn MediaIntents>) -> Self {
        self.media = Some(media);
        self
    }

    /// Finish the table.
    #[must_use]
    pub fn build(self) -> IntentDispatcher {
        IntentDispatcher {
            handlers: self.handlers,
            media: self.media,
        }
    }
}

/// Maps normalized intents to their handlers with trust-gated admission.
pub struct IntentDispatcher {
    handlers: HashMap<String, Arc<dyn IntentHandler>>,
    media: Option<Arc<dyn MediaIntents>>,
}

impl IntentDispatcher {
    /// Start building a dispatcher.
    #[must_use]
    pub fn builder() -> IntentDispatcherBuilder {
        IntentDispatcherBuilder::default()
    }

    /// Whether media operations are configured.
    #[must_use]
    pub fn media_enabled(&self) -> bool {
        self.media.is_some()
    }

    /// Dispatch the requested intent.
    pub async fn handle(
        &self,
        intent: &str,
        slots: &Map<String, Value>,
        ctx: &IntentContext,
    ) -> IntentResult {
        let normalized = intent.trim().to_lowercase();
        if normalized.is_empty() {
            return IntentResult::deny("I didn't catch that.");
        }

        if SENSITIVE_INTENTS.contains(&normalized.as_str()) && !ctx.allow_sensitive {
            warn!(
                "sensitive intent {normalized} denied for role {}",
                ctx.role.as_str()
            );
            return IntentResult::deny("That function is not available right now.");
        }
        if normalized == "disarm_alarm" && !has_value(slots.get("code")) {
            return IntentResult::deny("I need the code to disarm.");
        }

        if matches!(
            normalized.as_str(),
            "media_recommend" | "media_request" | "media_add_to_list"
        ) {
            let Some(media) = &self.media else {
                return IntentResult::deny("Media services are not configured.");
            };
            return match normalized.as_str() {
                "media_recommend" => media.recommend(ctx, slots).await,
                "media_request" => media.add_request(ctx, slots).await,
                _ => media.add_to_list(ctx, slots).await,
            };
        }

        match self.handlers.get(&normalized) {
            Some(handler) => handler.handle(slots, ctx).await,
            None => IntentResult::deny("I can't do that yet."),
        }
    }
}

fn has_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl IntentHandler for EchoHandler {
        async fn handle(&self, _slots: &Map<String, Value>, _ctx: &IntentContext) -> IntentResult {
            IntentResult::success("Echo.")
        }
    }

    fn dispatcher() -> IntentDispatcher {
        IntentDispatcher::builder()
            .register("turn_on_light", Arc::new(EchoHandler))
            .register("disarm_alarm", Arc::new(EchoHandler))
            .register("unlock_door", Arc::new(EchoHandler))
            .build()
    }

    fn sensitive_ctx() -> IntentContext {
        IntentContext {
            allow_sensitive: true,
            role: Role::Owner,
            ..IntentContext::default()
        }
    }

    #[tokio::test]
    async fn empty_intent_is_denied() {
        let result = dispatcher().handle("  ", &Map::new(), &IntentContext::default()).await;
        assert!(!result.ok);
        assert_eq!(result.spoken, "I didn't catch that.");
    }

    #[tokio::test]
    async fn unknown_intent_is_denied() {
        let result = dispatcher()
            .handle("launch_rocket", &Map::new(), &IntentContext::default())
            .await;
        assert!(!result.ok);
        assert_eq!(result.spoken, "I can't do that yet.");
    }

    #[tokio::test]
    async fn sensitive_intent_requires_allow_sensitive() {
        let result = dispatcher()
            .handle("unlock_door", &Map::new(), &IntentContext::default())
            .await;
        assert!(!result.ok);
        assert!(result.spoken.contains("not available"));

        let result = dispatcher()
            .handle("unlock_door", &Map::new(), &sensitive_ctx())
            .await;
        assert!(result.ok);
    }

    #[tokio::test]
    async fn disarm_requires_code() {
        let result = dispatcher()
            .handle("disarm_alarm", &Map::new(), &sensitive_ctx())
            .await;
        assert!(!result.ok);
        assert_eq!(result.spoken, "I need the code to disarm.");

        let mut slots = Map::new();
        slots.insert("code".to_owned(), json!("1234"));
        let result = dispatcher()
            .handle("disarm_alarm", &slots, &sensitive_ctx())
            .await;
        assert!(result.ok);
    }

    #[tokio::test]
    async fn media_without_handler_is_denied() {
        let result = dispatcher()
            .handle("media_recommend", &Map::new(), &IntentContext::default())
            .await;
        assert!(!result.ok);
        assert_eq!(result.spoken, "Media services are not configured.");
    }

    #[tokio::test]
    async fn intent_names_are_normalized() {
        let result = dispatcher()
            .handle("  TURN_ON_LIGHT  ", &Map::new(), &IntentContext::default())
            .await;
        assert!(result.ok);
    }
}
