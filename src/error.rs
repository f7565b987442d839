//! Error types for the HALCYON runtime.

/// Top-level error type for the coordination layer.
#[derive(Debug, thiserror::Error)]
pub enum HalcyonError {
    /// Caller supplied unusable input (e.g. whitespace-only text).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (bad room YAML, out-of-range threshold).
    #[error("config error: {0}")]
    Config(String),

    /// Identity resolution / persistence error.
    #[error("identity error: {0}")]
    Identity(String),

    /// Session store error.
    #[error("session error: {0}")]
    Session(String),

    /// An external collaborator (KV store, MQTT, HTTP, Wyoming) failed.
    #[error("external service error: {0}")]
    External(String),

    /// A room lookup failed.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// The room registry is empty and a room was required.
    #[error("no rooms configured")]
    NoRoomsConfigured,

    /// Media pipeline error.
    #[error("media error: {0}")]
    Media(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HalcyonError>;
