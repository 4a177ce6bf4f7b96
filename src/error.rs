//! Error types for the Bookline gateway

use thiserror::Error;

/// Result type alias for Bookline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Bookline gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Telephony transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Audio codec error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Reasoning provider error
    #[error("reasoning error: {0}")]
    Reasoning(String),

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(String),

    /// Calendar collaborator error
    #[error("calendar error: {0}")]
    Calendar(String),

    /// Notification collaborator error
    #[error("notification error: {0}")]
    Notify(String),

    /// Call session error
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
