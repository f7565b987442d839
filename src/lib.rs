//! HALCYON: multi-room household voice assistant coordination runtime.
//!
//! This crate is the coordination layer between the audio edge (wakeword
//! detectors, STT/TTS engines) and home services (automation bridge, media
//! backends):
//!
//! - **Identity**: transient speaker IDs resolve to persistent identities
//!   with confidence-gated degradation
//! - **Trust**: a numeric scorer fuses biometrics, context mode, and
//!   threat/reassurance signals with hysteresis
//! - **Personas**: a state machine arbitrates between the calm HALSTON and
//!   security-minded SCARLET response styles
//! - **Intents**: a deterministic classifier feeds a trust-gated dispatch
//!   table over the home-automation bridge and media services
//! - **Voice pipeline**: room registry, wakeword collision resolution,
//!   single-stream input multiplexing, follow-me conversation routing, and
//!   privacy/DND-aware output delivery
//!
//! External engines and stores (STT, TTS, MQTT, Redis-like KV, Wyoming,
//! Plex/TMDB/Overseerr) stay behind trait seams; see the module docs.

pub mod agent;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod intents;
pub mod kv;
pub mod media;
pub mod orchestrator;
pub mod persona;
pub mod router;
pub mod session;
pub mod telemetry;
pub mod trust;
pub mod voice;

#[doc(hidden)]
pub mod test_utils;

pub use config::HalcyonConfig;
pub use error::{HalcyonError, Result};
pub use orchestrator::{Orchestrator, OrchestratorDeps, VoiceRouting};
pub use persona::Persona;
pub use trust::{Role, TrustDecision};
