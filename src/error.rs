//! Error types for the companion engine.

/// Top-level error type for the companion controller.
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// Overlay channel error (bind, accept, framing).
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration load/save error.
    #[error("config error: {0}")]
    Config(String),

    /// Persisted state error (history, window placement).
    #[error("persist error: {0}")]
    Persist(String),

    /// External feed fetch error.
    #[error("feed error: {0}")]
    Feed(String),

    /// Speech synthesis pipeline error.
    #[error("speech error: {0}")]
    Speech(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CompanionError>;
