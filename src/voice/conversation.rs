//! Conversation-to-room routing with follow-me handoff.
//!
//! Per-speaker room state (last room, last sighting, manual pin) lives in
//! the shared KV store so any host can continue a conversation. A global
//! last-active-room key feeds the wakeword collision tie-break.

use crate::clock::epoch_secs;
use crate::config::ConversationConfig;
use crate::error::{HalcyonError, Result};
use crate::kv::KvStore;
use crate::persona::Persona;
use crate::telemetry::EventBus;
use crate::voice::rooms::RoomRegistry;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Household-level key recording the room of the most recent interaction.
pub const LAST_ACTIVE_ROOM_KEY: &str = "halcyon:voice:last_active_room";

/// Routes conversations to rooms and arbitrates follow-me handoffs.
pub struct ConversationRouter {
    registry: Arc<RoomRegistry>,
    events: EventBus,
    kv: Arc<dyn KvStore>,
    config: ConversationConfig,
}

impl ConversationRouter {
    /// Create a router over the shared room registry and KV store.
    #[must_use]
    pub fn new(
        registry: Arc<RoomRegistry>,
        events: EventBus,
        kv: Arc<dyn KvStore>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            registry,
            events,
            kv,
            config,
        }
    }

    fn key_last_room(uuid: &str) -> String {
        format!("halcyon:voice:last_room:{uuid}")
    }

    fn key_last_seen(uuid: &str) -> String {
        format!("halcyon:voice:last_seen:{uuid}")
    }

    fn key_room_lock(uuid: &str) -> String {
        format!("halcyon:voice:room_lock:{uuid}")
    }

    fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.config.state_ttl_secs)
    }

    /// Select the active room for a conversation.
    ///
    /// Priority: manual room lock, then the wake-room hint, then the
    /// speaker's last room, then the default room, then the first
    /// registered room. Fails only when no rooms are configured.
    pub async fn select_active_room(
        &self,
        uuid: Option<&str>,
        _temp_id: &str,
        room_hint: Option<&str>,
    ) -> Result<String> {
        if let Some(uuid) = uuid
            && let Some(locked) = self.kv.get(&Self::key_room_lock(uuid)).await?
        {
            debug!("room lock pins {uuid} to {locked}");
            return Ok(locked);
        }

        if let Some(hint) = room_hint
            && self.registry.get_room(hint).is_some()
        {
            if let Some(uuid) = uuid {
                self.write_room_state(uuid, hint).await?;
            }
            self.kv
                .set(LAST_ACTIVE_ROOM_KEY, hint, Some(self.state_ttl()))
                .await?;
            return Ok(hint.to_owned());
        }

        if let Some(uuid) = uuid
            && let Some(last_room) = self.kv.get(&Self::key_last_room(uuid)).await?
            && self.registry.get_room(&last_room).is_some()
        {
            return Ok(last_room);
        }

        if let Some(default) = self.registry.get_default_room() {
            return Ok(default.to_owned());
        }
        if let Some(first) = self.registry.list_rooms().first() {
            return Ok(first.id.clone());
        }
        Err(HalcyonError::NoRoomsConfigured)
    }

    /// Attempt a follow-me handoff to a new room.
    ///
    /// Returns the new room only when the speaker is known, was heard
    /// recently, and a candidate other than the current room clears the
    /// confidence bar. Publishes `voice/handoff` on success.
    pub async fn follow_me(
        &self,
        uuid: Option<&str>,
        candidate_rooms: &[(String, f64)],
    ) -> Result<Option<String>> {
        let Some(uuid) = uuid else {
            return Ok(None);
        };
        if candidate_rooms.is_empty() {
            return Ok(None);
        }

        let Some(last_seen_raw) = self.kv.get(&Self::key_last_seen(uuid)).await? else {
            return Ok(None);
        };
        let Ok(last_seen) = last_seen_raw.parse::<f64>() else {
            return Ok(None);
        };
        let now = epoch_secs();
        if now - last_seen > self.config.follow_me_max_gap_secs {
            debug!("follow-me gap expired for {uuid}");
            return Ok(None);
        }

        let Some(last_room) = self.kv.get(&Self::key_last_room(uuid)).await? else {
            return Ok(None);
        };

        let mut best: Option<(&str, f64)> = None;
        for (room_id, confidence) in candidate_rooms {
            if room_id == &last_room || *confidence < self.config.handoff_min_confidence {
                continue;
            }
            if best.is_none_or(|(_, best_conf)| *confidence > best_conf) {
                best = Some((room_id.as_str(), *confidence));
            }
        }
        let Some((new_room, confidence)) = best else {
            return Ok(None);
        };

        self.write_room_state(uuid, new_room).await?;
        self.kv
            .set(LAST_ACTIVE_ROOM_KEY, new_room, Some(self.state_ttl()))
            .await?;
        info!("follow-me handoff {uuid}: {last_room} -> {new_room}");
        self.events.publish(
            "voice/handoff",
            json!({
                "uuid": uuid,
                "from": last_room,
                "to": new_room,
                "confidence": (confidence * 1000.0).round() / 1000.0,
            }),
        );
        Ok(Some(new_room.to_owned()))
    }

    /// Whether speech output is allowed in a room for a persona.
    ///
    /// Privacy zones always deny. DND zones deny everything except
    /// SCARLET announcements.
    #[must_use]
    pub fn can_speak_in(&self, room_id: &str, persona: Persona) -> bool {
        if self.registry.is_privacy_zone(room_id) {
            return false;
        }
        if self.registry.is_dnd_zone(room_id) {
            return persona == Persona::Scarlet;
        }
        true
    }

    /// Manually pin a speaker to a room, or clear the pin with `None`.
    pub async fn set_room_lock(&self, uuid: &str, room_id: Option<&str>) -> Result<()> {
        let key = Self::key_room_lock(uuid);
        match room_id {
            Some(room_id) => {
                self.kv.set(&key, room_id, Some(self.state_ttl())).await?;
            }
            None => self.kv.delete(&key).await?,
        }
        Ok(())
    }

    /// Record the room a speaker was just served in and publish
    /// `voice/active_room`.
    pub async fn update_last_room(&self, uuid: Option<&str>, room_id: &str) -> Result<()> {
        self.kv
            .set(LAST_ACTIVE_ROOM_KEY, room_id, Some(self.state_ttl()))
            .await?;
        let Some(uuid) = uuid else {
            return Ok(());
        };
        self.write_room_state(uuid, room_id).await?;
        self.events.publish(
            "voice/active_room",
            json!({"uuid": uuid, "room_id": room_id}),
        );
        Ok(())
    }

    async fn write_room_state(&self, uuid: &str, room_id: &str) -> Result<()> {
        let ttl = Some(self.state_ttl());
        self.kv
            .set(&Self::key_last_room(uuid), room_id, ttl)
            .await?;
        self.kv
            .set(&Self::key_last_seen(uuid), &epoch_secs().to_string(), ttl)
            .await?;
        Ok(())
    }
}
