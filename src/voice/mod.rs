//! Multi-room voice pipeline: room topology, wakeword arbitration, input
//! multiplexing, conversation routing, and output delivery.

pub mod conversation;
pub mod mic;
pub mod mux;
pub mod output;
pub mod rooms;
pub mod wakeword;

pub use conversation::ConversationRouter;
pub use mic::MicManager;
pub use mux::{FRAME_SIZE_BYTES, InputMux, SttSink};
pub use output::{AudioOutput, AudioOutputFactory, OutputRouter, SpeechSynthesizer};
pub use rooms::{Room, RoomRegistry};
pub use wakeword::{WakeEvent, WakewordBus};
