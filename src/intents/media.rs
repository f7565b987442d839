//! Conversational media intent handlers: recommend, request, watchlist.
//!
//! Offers are cached per speaker in the KV store so a follow-up "add number
//! two" lands on the list the speaker just heard, even if another device
//! picks up the conversation.

use super::{IntentContext, IntentResult, MediaIntents};
use crate::config::MediaCacheConfig;
use crate::kv::KvStore;
use crate::media::sources::MediaRequester;
use crate::media::{MediaCandidate, MediaRecommender};
use crate::persona::Persona;
use crate::router::media::ordinal_pick;
use crate::telemetry::EventBus;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Handle conversational media intents against the recommender and the
/// request gateway.
pub struct MediaIntentHandler {
    recommender: Arc<MediaRecommender>,
    requester: Arc<dyn MediaRequester>,
    kv: Arc<dyn KvStore>,
    events: EventBus,
    offer_ttl: Duration,
}

impl MediaIntentHandler {
    /// Create a handler with the default offer-cache TTL.
    #[must_use]
    pub fn new(
        recommender: Arc<MediaRecommender>,
        requester: Arc<dyn MediaRequester>,
        kv: Arc<dyn KvStore>,
        events: EventBus,
        config: MediaCacheConfig,
    ) -> Self {
        Self {
            recommender,
            requester,
            kv,
            events,
            offer_ttl: Duration::from_secs(config.offer_ttl_secs),
        }
    }

    fn offer_key(ctx: &IntentContext) -> String {
        if let Some(uuid) = &ctx.speaker_uuid {
            return format!("halcyon:media:last:{uuid}");
        }
        if let Some(session_id) = &ctx.session_id {
            return format!("halcyon:media:last:session:{session_id}");
        }
        "halcyon:media:last:guest".to_owned()
    }

    async fn store_offers(&self, ctx: &IntentContext, options: &[MediaCandidate]) {
        let Ok(payload) = serde_json::to_string(options) else {
            return;
        };
        if let Err(err) = self
            .kv
            .set(&Self::offer_key(ctx), &payload, Some(self.offer_ttl))
            .await
        {
            warn!("failed to cache media offers: {err}");
        }
    }

    async fn load_offers(&self, ctx: &IntentContext) -> Vec<MediaCandidate> {
        match self.kv.get(&Self::offer_key(ctx)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("failed to load media offers: {err}");
                Vec::new()
            }
        }
    }

    /// Interpret the `pick` slot as a 1-based index.
    fn resolve_pick(slots: &Map<String, Value>) -> Option<i64> {
        match slots.get("pick") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(word)) => ordinal_pick(word),
            _ => Some(1),
        }
    }

    fn publish_media_error(&self, ctx: &IntentContext, code: &str, message: &str) {
        self.events.publish(
            "media/error",
            json!({
                "uuid": ctx.speaker_uuid,
                "code": code,
                "message": message,
            }),
        );
    }

    /// Pull a prior offer out of the cache, or explain why there is none.
    async fn pick_offer(
        &self,
        ctx: &IntentContext,
        slots: &Map<String, Value>,
        missing: &str,
    ) -> std::result::Result<MediaCandidate, IntentResult> {
        let offers = self.load_offers(ctx).await;
        if offers.is_empty() {
            return Err(IntentResult::deny(missing));
        }
        let pick = Self::resolve_pick(slots);
        let Some(pick) = pick.filter(|p| *p >= 1 && *p <= offers.len() as i64) else {
            return Err(IntentResult::deny("Please choose one of the numbered options."));
        };
        Ok(offers[(pick - 1) as usize].clone())
    }
}

#[async_trait]
impl MediaIntents for MediaIntentHandler {
    async fn recommend(&self, ctx: &IntentContext, _slots: &Map<String, Value>) -> IntentResult {
        let options = match self
            .recommender
            .recommend_for_user(ctx.speaker_uuid.as_deref(), 3)
            .await
        {
            Ok(options) => options,
            Err(err) => {
                warn!("recommendation pipeline failed: {err}");
                self.publish_media_error(ctx, "recommendation_error", &err.to_string());
                return IntentResult::deny("I couldn't find anything suitable right now.");
            }
        };
        if options.is_empty() {
            return IntentResult::deny("I couldn't find anything suitable right now.");
        }
        self.store_offers(ctx, &options).await;
        let spoken = MediaRecommender::format_spoken(&options, ctx.persona);
        IntentResult::success(&spoken)
            .with_details(json!({"options": options}))
    }

    async fn add_request(&self, ctx: &IntentContext, slots: &Map<String, Value>) -> IntentResult {
        let choice = match self
            .pick_offer(ctx, slots, "I don't have a recommendation to act on yet.")
            .await
        {
            Ok(choice) => choice,
            Err(denial) => return denial,
        };
        if !ctx.allow_sensitive && choice.adult {
            return IntentResult::deny("That title isn't available right now.");
        }

        let response = match self.requester.request(choice.tmdb_id, choice.media_type).await {
            Ok(response) => response,
            Err(err) => {
                self.publish_media_error(ctx, "overseerr_request_error", &err.to_string());
                return IntentResult::deny("I couldn't file that request.");
            }
        };
        self.events.publish(
            "media/request",
            json!({
                "uuid": ctx.speaker_uuid,
                "tmdb_id": choice.tmdb_id,
                "type": choice.media_type.as_str(),
                "title": choice.title,
                "ok": true,
            }),
        );
        let spoken = match ctx.persona {
            Persona::Scarlet => "Request filed.",
            Persona::Halston => "Added to your requests. I'll notify you when it's available.",
        };
        IntentResult::success(spoken).with_details(json!({"request": response}))
    }

    async fn add_to_list(&self, ctx: &IntentContext, slots: &Map<String, Value>) -> IntentResult {
        let choice = match self
            .pick_offer(ctx, slots, "I don't have a recommendation to save yet.")
            .await
        {
            Ok(choice) => choice,
            Err(denial) => return denial,
        };

        let added = match self.requester.add_to_list(choice.tmdb_id, "watch-next").await {
            Ok(added) => added,
            Err(err) => {
                self.publish_media_error(ctx, "overseerr_add_list_error", &err.to_string());
                return IntentResult::deny("I couldn't add that to your list.");
            }
        };
        if !added {
            return IntentResult::deny("I couldn't add that to your list.");
        }
        let spoken = match ctx.persona {
            Persona::Halston => "Added to your watchlist.",
            Persona::Scarlet => "Added.",
        };
        IntentResult::success(spoken).with_details(json!({"added": choice}))
    }
}
