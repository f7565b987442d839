//! Privacy- and DND-aware TTS output routing.
//!
//! Audio is delivered to a room's Wyoming target through a pooled
//! transport connection, one per `(host, port)`. Rooms that deny speech
//! get a short notice chime instead, so the speaker still knows the
//! assistant heard them.

use crate::error::Result;
use crate::persona::Persona;
use crate::telemetry::EventBus;
use crate::voice::conversation::ConversationRouter;
use crate::voice::rooms::RoomRegistry;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Duration of the privacy-zone notice chime.
const PRIVACY_CHIME_MS: u32 = 200;
/// Duration of the DND-zone notice chime.
const DND_CHIME_MS: u32 = 150;
/// Chime tone frequency.
const CHIME_FREQUENCY_HZ: f64 = 800.0;
const CHIME_SAMPLE_RATE: u32 = 16_000;

/// Persona-aware speech synthesis seam (the TTS engine lives elsewhere).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` in the persona's voice, returning WAV bytes.
    async fn synth(&self, persona: Persona, text: &str) -> Result<Vec<u8>>;
}

/// One audio delivery connection (Wyoming protocol client).
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Deliver WAV audio. Returns whether delivery was acknowledged.
    async fn send_tts(&self, wav: &[u8]) -> Result<bool>;
}

/// Creates audio delivery connections for output targets.
pub trait AudioOutputFactory: Send + Sync {
    /// Open (or hand back) a connection to `host:port`.
    fn connect(&self, host: &str, port: u16) -> Arc<dyn AudioOutput>;
}

/// Routes TTS audio to rooms, honoring privacy and DND zones.
pub struct OutputRouter {
    registry: Arc<RoomRegistry>,
    conversation: Arc<ConversationRouter>,
    events: EventBus,
    factory: Arc<dyn AudioOutputFactory>,
    pool: Mutex<HashMap<(String, u16), Arc<dyn AudioOutput>>>,
}

impl OutputRouter {
    /// Create a router delivering through `factory` connections.
    #[must_use]
    pub fn new(
        registry: Arc<RoomRegistry>,
        conversation: Arc<ConversationRouter>,
        events: EventBus,
        factory: Arc<dyn AudioOutputFactory>,
    ) -> Self {
        Self {
            registry,
            conversation,
            events,
            factory,
            pool: Mutex::new(HashMap::new()),
        }
    }

    /// Route TTS audio to a room. Returns whether speech was delivered.
    pub async fn route(
        &self,
        persona: Persona,
        uuid: Option<&str>,
        room_id: &str,
        wav_bytes: &[u8],
    ) -> bool {
        if !self.conversation.can_speak_in(room_id, persona) {
            if self.registry.is_privacy_zone(room_id) {
                debug!("privacy zone {room_id}: denying speech output");
                self.send_chime(room_id, PRIVACY_CHIME_MS).await;
                self.events.publish(
                    "voice/error",
                    json!({
                        "code": "privacy_zone",
                        "message": format!("Speech denied in privacy zone: {room_id}"),
                        "room_id": room_id,
                        "uuid": uuid,
                    }),
                );
            } else {
                debug!("DND zone {room_id}: denying speech for {}", persona.as_str());
                self.send_chime(room_id, DND_CHIME_MS).await;
            }
            return false;
        }

        let (host, port) = match self.registry.get_output_target(room_id) {
            Ok(target) => target,
            Err(err) => {
                error!("failed to resolve output target for {room_id}: {err}");
                self.events.publish(
                    "voice/error",
                    json!({
                        "code": "room_not_found",
                        "message": format!("Room {room_id} not found"),
                        "room_id": room_id,
                    }),
                );
                return false;
            }
        };

        let client = self.client_for(&host, port);
        match client.send_tts(wav_bytes).await {
            Ok(true) => {
                debug!("routed TTS to room {room_id} ({host}:{port})");
                true
            }
            Ok(false) => {
                warn!("TTS delivery not acknowledged for room {room_id}");
                false
            }
            Err(err) => {
                error!("failed to route TTS to room {room_id}: {err}");
                self.events.publish(
                    "voice/error",
                    json!({
                        "code": "routing_failed",
                        "message": format!("Failed to route TTS: {err}"),
                        "room_id": room_id,
                        "uuid": uuid,
                    }),
                );
                false
            }
        }
    }

    async fn send_chime(&self, room_id: &str, duration_ms: u32) {
        let Ok((host, port)) = self.registry.get_output_target(room_id) else {
            return;
        };
        let chime = chime_wav(duration_ms, CHIME_FREQUENCY_HZ);
        let client = self.client_for(&host, port);
        if let Err(err) = client.send_tts(&chime).await {
            warn!("failed to send notice chime to {room_id}: {err}");
        }
    }

    fn client_for(&self, host: &str, port: u16) -> Arc<dyn AudioOutput> {
        let mut pool = self
            .pool
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pool.entry((host.to_owned(), port))
            .or_insert_with(|| self.factory.connect(host, port))
            .clone()
    }
}

/// Generate a short 16kHz mono sine chime with fade-in/out as WAV bytes.
#[must_use]
pub fn chime_wav(duration_ms: u32, frequency: f64) -> Vec<u8> {
    let num_samples = (CHIME_SAMPLE_RATE * duration_ms / 1000) as usize;
    let fade_samples = (num_samples / 10).max(1);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: CHIME_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = match hound::WavWriter::new(&mut cursor, spec) {
            Ok(writer) => writer,
            Err(_) => return Vec::new(),
        };
        for i in 0..num_samples {
            let t = i as f64 / f64::from(CHIME_SAMPLE_RATE);
            let fade = if i < fade_samples {
                i as f64 / fade_samples as f64
            } else if i > num_samples - fade_samples {
                (num_samples - i) as f64 / fade_samples as f64
            } else {
                1.0
            };
            let amplitude =
                (32767.0 * 0.3 * fade * (2.0 * std::f64::consts::PI * frequency * t).sin()) as i16;
            if writer.write_sample(amplitude).is_err() {
                return Vec::new();
            }
        }
        if writer.finalize().is_err() {
            return Vec::new();
        }
    }
    cursor.into_inner()
}
