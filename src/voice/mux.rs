//! Input multiplexer enforcing the single-stream-per-conversation rule.
//!
//! Frames from microphones without an active wake session never reach the
//! STT engine; at most they feed the always-on wakeword listener. A wake
//! event opens a session for its mic, and the session is released at end
//! of utterance.

use crate::clock::epoch_secs_whole;
use crate::telemetry::EventBus;
use crate::voice::rooms::RoomRegistry;
use crate::voice::wakeword::{WakeEvent, WakewordBus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// Expected PCM frame size: 16kHz, 16-bit, mono, 20ms.
pub const FRAME_SIZE_BYTES: usize = 640;

/// Minimum interval between `stream_state` publications per session.
const STATE_PUBLISH_INTERVAL_MS: u128 = 250;

/// Streaming speech-to-text sink. The engine behind it is a deployment
/// concern; frames are 20ms PCM chunks.
pub trait SttSink: Send + Sync {
    /// Accept one audio frame for transcription.
    fn push_audio(&self, frame: &[u8]);
}

/// Always-on listener fed with sessionless frames (wakeword detection).
pub type WakewordListener = Arc<dyn Fn(&[u8]) + Send + Sync>;

struct ActiveSession {
    uuid: Option<String>,
    temp_id: String,
    /// `None` until the first frame; the first and every ~250ms thereafter
    /// publish a `stt` stream-state event.
    last_state_publish: Option<Instant>,
}

/// Multiplexes audio input from many microphones into a single STT stream.
pub struct InputMux {
    stt: Arc<dyn SttSink>,
    registry: Arc<RoomRegistry>,
    events: EventBus,
    wakeword_listener: Option<WakewordListener>,
    sessions: Mutex<HashMap<String, ActiveSession>>,
}

impl InputMux {
    /// Create a multiplexer.
    #[must_use]
    pub fn new(
        stt: Arc<dyn SttSink>,
        registry: Arc<RoomRegistry>,
        events: EventBus,
        wakeword_listener: Option<WakewordListener>,
    ) -> Arc<Self> {
        Arc::new(Self {
            stt,
            registry,
            events,
            wakeword_listener,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe this multiplexer to resolved wake events on a bus.
    pub fn attach(self: &Arc<Self>, bus: &WakewordBus) -> u64 {
        let mux = Arc::downgrade(self);
        bus.subscribe(Arc::new(move |event: &WakeEvent| {
            if let Some(mux) = mux.upgrade() {
                mux.on_wake(event);
            }
        }))
    }

    /// Open a session for the mic that won the wake arbitration.
    pub fn on_wake(&self, event: &WakeEvent) {
        let mic_id = &event.mic_id;
        let Some(room_id) = self.registry.get_room_for_mic(mic_id) else {
            warn!("wake event from unknown mic: {mic_id}");
            return;
        };
        let temp_id = format!("mic:{mic_id}:{}", epoch_secs_whole());

        {
            let mut sessions = self.lock_sessions();
            sessions.insert(
                mic_id.clone(),
                ActiveSession {
                    uuid: None,
                    temp_id: temp_id.clone(),
                    last_state_publish: None,
                },
            );
        }

        self.events.publish(
            "voice/stream_state",
            json!({
                "mic_id": mic_id,
                "state": "awake",
                "uuid": null,
                "temp_id": temp_id,
            }),
        );
        debug!("wake from mic {mic_id} (room {room_id}), temp_id {temp_id}");
    }

    /// Push a 20ms PCM frame from a microphone.
    ///
    /// Malformed frames are dropped. Frames from mics without an active
    /// session go to the wakeword listener only, never to STT.
    pub fn push(&self, mic_id: &str, frame_20ms: &[u8]) {
        if frame_20ms.len() != FRAME_SIZE_BYTES {
            debug!(
                "dropping malformed frame from mic {mic_id} (size {})",
                frame_20ms.len()
            );
            return;
        }

        let state_event = {
            let mut sessions = self.lock_sessions();
            let Some(session) = sessions.get_mut(mic_id) else {
                drop(sessions);
                if let Some(listener) = &self.wakeword_listener {
                    listener(frame_20ms);
                }
                return;
            };
            let due = session
                .last_state_publish
                .is_none_or(|last| last.elapsed().as_millis() >= STATE_PUBLISH_INTERVAL_MS);
            if due {
                session.last_state_publish = Some(Instant::now());
                Some(json!({
                    "mic_id": mic_id,
                    "state": "stt",
                    "uuid": session.uuid,
                    "temp_id": session.temp_id,
                }))
            } else {
                None
            }
        };

        self.stt.push_audio(frame_20ms);
        if let Some(payload) = state_event {
            self.events.publish("voice/stream_state", payload);
        }
    }

    /// Release an active microphone session (end of utterance).
    pub fn release_session(&self, mic_id: &str) {
        let removed = self.lock_sessions().remove(mic_id).is_some();
        if removed {
            self.events.publish(
                "voice/stream_state",
                json!({"mic_id": mic_id, "state": "idle"}),
            );
            debug!("released session for mic {mic_id}");
        }
    }

    /// Record the resolved speaker UUID on an active session.
    pub fn set_uuid_for_session(&self, mic_id: &str, uuid: Option<&str>) {
        if let Some(session) = self.lock_sessions().get_mut(mic_id) {
            session.uuid = uuid.map(str::to_owned);
        }
    }

    /// Active microphone currently bound to the given speaker.
    #[must_use]
    pub fn active_mic_for_uuid(&self, uuid: &str) -> Option<String> {
        self.lock_sessions()
            .iter()
            .find(|(_, session)| session.uuid.as_deref() == Some(uuid))
            .map(|(mic_id, _)| mic_id.clone())
    }

    /// Temporary session id for a mic, when one is active.
    #[must_use]
    pub fn temp_id_for_mic(&self, mic_id: &str) -> Option<String> {
        self.lock_sessions()
            .get(mic_id)
            .map(|session| session.temp_id.clone())
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::ZoneConfig;
    use crate::test_utils::{CountingStt, RecordingPublisher};

    const ROOMS: &str = "
rooms:
  - id: lounge
    wyoming_port: 10700
    mics:
      - id: mic_lounge_1
  - id: kitchen
    wyoming_port: 10710
    mics:
      - id: mic_kitchen_1
";

    struct Fixture {
        mux: Arc<InputMux>,
        stt: Arc<CountingStt>,
        sink: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(
            RoomRegistry::from_yaml_str(ROOMS, ZoneConfig::default()).unwrap(),
        );
        let stt = Arc::new(CountingStt::default());
        let sink = Arc::new(RecordingPublisher::default());
        let mux = InputMux::new(stt.clone(), registry, EventBus::new(sink.clone()), None);
        Fixture { mux, stt, sink }
    }

    fn wake(mic_id: &str) -> WakeEvent {
        WakeEvent {
            mic_id: mic_id.to_owned(),
            confidence: 0.9,
            keyword: "halcyon".to_owned(),
            timestamp: 0.0,
        }
    }

    #[test]
    fn only_active_mic_streams_to_stt() {
        let fx = fixture();
        fx.mux.on_wake(&wake("mic_lounge_1"));

        let frame = vec![0_u8; FRAME_SIZE_BYTES];
        fx.mux.push("mic_lounge_1", &frame);
        fx.mux.push("mic_kitchen_1", &frame);
        assert_eq!(fx.stt.frames(), 1);

        fx.mux.release_session("mic_lounge_1");
        fx.mux.push("mic_lounge_1", &frame);
        fx.mux.push("mic_kitchen_1", &frame);
        assert_eq!(fx.stt.frames(), 1);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let fx = fixture();
        fx.mux.on_wake(&wake("mic_lounge_1"));
        fx.mux.push("mic_lounge_1", &[0_u8; 100]);
        fx.mux.push("mic_lounge_1", &[0_u8; FRAME_SIZE_BYTES + 1]);
        assert_eq!(fx.stt.frames(), 0);
    }

    #[test]
    fn sessionless_frames_feed_wakeword_listener() {
        let registry = Arc::new(
            RoomRegistry::from_yaml_str(ROOMS, ZoneConfig::default()).unwrap(),
        );
        let stt = Arc::new(CountingStt::default());
        let sink = Arc::new(RecordingPublisher::default());
        let heard: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let heard_clone = heard.clone();
        let mux = InputMux::new(
            stt.clone(),
            registry,
            EventBus::new(sink),
            Some(Arc::new(move |_frame: &[u8]| {
                *heard_clone.lock().unwrap() += 1;
            })),
        );

        mux.push("mic_lounge_1", &vec![0_u8; FRAME_SIZE_BYTES]);
        assert_eq!(*heard.lock().unwrap(), 1);
        assert_eq!(stt.frames(), 0);
    }

    #[test]
    fn wake_from_unknown_mic_is_ignored() {
        let fx = fixture();
        fx.mux.on_wake(&wake("mic_attic_1"));
        fx.mux.push("mic_attic_1", &vec![0_u8; FRAME_SIZE_BYTES]);
        assert_eq!(fx.stt.frames(), 0);
    }

    #[test]
    fn wake_publishes_awake_state_with_temp_id() {
        let fx = fixture();
        fx.mux.on_wake(&wake("mic_lounge_1"));

        let event = fx.sink.last_for("halcyon/voice/stream_state").unwrap();
        assert_eq!(event["state"], json!("awake"));
        assert_eq!(event["mic_id"], json!("mic_lounge_1"));
        let temp_id = event["temp_id"].as_str().unwrap();
        assert!(temp_id.starts_with("mic:mic_lounge_1:"));
        assert_eq!(fx.mux.temp_id_for_mic("mic_lounge_1").unwrap(), temp_id);
    }

    #[test]
    fn release_publishes_idle_state() {
        let fx = fixture();
        fx.mux.on_wake(&wake("mic_lounge_1"));
        fx.mux.release_session("mic_lounge_1");

        let event = fx.sink.last_for("halcyon/voice/stream_state").unwrap();
        assert_eq!(event["state"], json!("idle"));
    }

    #[test]
    fn uuid_binding_tracks_active_mic() {
        let fx = fixture();
        fx.mux.on_wake(&wake("mic_lounge_1"));
        fx.mux.set_uuid_for_session("mic_lounge_1", Some("uuid-1"));

        assert_eq!(
            fx.mux.active_mic_for_uuid("uuid-1").as_deref(),
            Some("mic_lounge_1")
        );
        assert_eq!(fx.mux.active_mic_for_uuid("uuid-2"), None);
    }

    #[tokio::test]
    async fn attach_routes_bus_winners_to_sessions() {
        use crate::config::WakewordConfig;
        use crate::kv::MemoryKvStore;

        let fx = fixture();
        let bus = WakewordBus::new(
            Arc::new(MemoryKvStore::new()),
            None,
            WakewordConfig {
                collision_window_ms: 40,
                ..WakewordConfig::default()
            },
        );
        fx.mux.attach(&bus);

        bus.emit_wake("mic_lounge_1", 0.9, "halcyon");
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;

        fx.mux.push("mic_lounge_1", &vec![0_u8; FRAME_SIZE_BYTES]);
        assert_eq!(fx.stt.frames(), 1);
    }
}
