//! Wakeword event bus with cross-mic collision resolution.
//!
//! When several microphones hear the same wakeword, the bus delivers
//! exactly one notification per collision group. Events are collected for
//! the duration of the collision window and resolved by a timer task:
//! the clearly strongest detection wins outright, near-ties prefer the mic
//! in the household's last interaction room, and otherwise the earliest
//! strong arrival is kept. Per-mic debouncing suppresses rapid re-triggers
//! from the same device.

use crate::clock::epoch_secs;
use crate::config::WakewordConfig;
use crate::kv::KvStore;
use crate::voice::conversation::LAST_ACTIVE_ROOM_KEY;
use crate::voice::rooms::RoomRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Wakeword detection event.
#[derive(Debug, Clone)]
pub struct WakeEvent {
    /// Microphone that detected the wakeword.
    pub mic_id: String,
    /// Detection confidence (0.0 to 1.0).
    pub confidence: f64,
    /// Keyword that was detected.
    pub keyword: String,
    /// Epoch seconds of the detection.
    pub timestamp: f64,
}

type WakeHandler = Arc<dyn Fn(&WakeEvent) + Send + Sync>;

struct BusState {
    subscribers: Vec<(u64, WakeHandler)>,
    next_subscriber_id: u64,
    pending: Vec<WakeEvent>,
    group_open: bool,
    last_emit: HashMap<String, Instant>,
}

struct BusInner {
    config: WakewordConfig,
    kv: Arc<dyn KvStore>,
    registry: Option<Arc<RoomRegistry>>,
    state: Mutex<BusState>,
    cancel: CancellationToken,
}

/// Event bus for wake events with collision resolution.
#[derive(Clone)]
pub struct WakewordBus {
    inner: Arc<BusInner>,
}

impl WakewordBus {
    /// Create a bus. The registry enables the last-room tie-break; without
    /// it, near-ties fall back to arrival order.
    #[must_use]
    pub fn new(
        kv: Arc<dyn KvStore>,
        registry: Option<Arc<RoomRegistry>>,
        config: WakewordConfig,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                kv,
                registry,
                state: Mutex::new(BusState {
                    subscribers: Vec::new(),
                    next_subscriber_id: 0,
                    pending: Vec::new(),
                    group_open: false,
                    last_emit: HashMap::new(),
                }),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to resolved wake events. Returns a token for
    /// [`Self::unsubscribe`].
    pub fn subscribe(&self, handler: WakeHandler) -> u64 {
        let mut state = self.inner.lock_state();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.push((id, handler));
        id
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, token: u64) {
        let mut state = self.inner.lock_state();
        state.subscribers.retain(|(id, _)| *id != token);
    }

    /// Emit a wakeword detection.
    ///
    /// Must be called from within a tokio runtime: the collision group is
    /// resolved by a timer task once the window closes.
    pub fn emit_wake(&self, mic_id: &str, confidence: f64, keyword: &str) {
        let now = Instant::now();
        let debounce = Duration::from_millis(self.inner.config.debounce_ms);
        let mut state = self.inner.lock_state();

        if let Some(last) = state.last_emit.get(mic_id)
            && now.duration_since(*last) < debounce
        {
            debug!("debounced wake from {mic_id}");
            return;
        }
        state.last_emit.insert(mic_id.to_owned(), now);

        state.pending.push(WakeEvent {
            mic_id: mic_id.to_owned(),
            confidence,
            keyword: keyword.to_owned(),
            timestamp: epoch_secs(),
        });

        if !state.group_open {
            state.group_open = true;
            drop(state);
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let window = Duration::from_millis(inner.config.collision_window_ms);
                tokio::select! {
                    () = inner.cancel.cancelled() => return,
                    () = tokio::time::sleep(window) => {}
                }
                resolve_group(&inner).await;
            });
        }
    }

    /// Cancel pending collision groups. Undelivered events are dropped.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl BusInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

async fn resolve_group(inner: &Arc<BusInner>) {
    let (events, subscribers) = {
        let mut state = inner.lock_state();
        state.group_open = false;
        let events = std::mem::take(&mut state.pending);
        let subscribers: Vec<WakeHandler> = state
            .subscribers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        (events, subscribers)
    };
    if events.is_empty() {
        return;
    }

    let winner = if events.len() == 1 {
        events.into_iter().next()
    } else {
        resolve_collision(inner, events).await
    };
    let Some(winner) = winner else {
        return;
    };

    debug!(
        "wake delivered for {} (confidence {:.2})",
        winner.mic_id, winner.confidence
    );
    for handler in subscribers {
        handler(&winner);
    }
}

/// Pick the single winner of a collision group.
async fn resolve_collision(inner: &Arc<BusInner>, events: Vec<WakeEvent>) -> Option<WakeEvent> {
    // Stable sort: equal confidences keep arrival order.
    let mut sorted = events;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let top_confidence = sorted.first().map(|event| event.confidence)?;
    let second_confidence = sorted.get(1).map_or(0.0, |event| event.confidence);
    if top_confidence - second_confidence > inner.config.tie_break_margin {
        return sorted.into_iter().next();
    }

    // Near-tie: prefer the mic in the household's last interaction room.
    if let Some(registry) = &inner.registry {
        match inner.kv.get(LAST_ACTIVE_ROOM_KEY).await {
            Ok(Some(last_room)) => {
                if let Some(idx) = sorted.iter().position(|event| {
                    registry.get_room_for_mic(&event.mic_id) == Some(last_room.as_str())
                }) {
                    return Some(sorted.swap_remove(idx));
                }
            }
            Ok(None) => {}
            Err(err) => warn!("last-room lookup failed during collision resolution: {err}"),
        }
    }

    sorted.into_iter().next()
}
