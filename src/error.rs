//! Error types for the reminder service.

/// Top-level error type for the ayah reminder.
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// Verse API request failed, timed out, returned a non-success status,
    /// or produced a payload that could not be decoded.
    #[error("network error: {0}")]
    Network(String),

    /// The host timer service refused or lost a timer.
    #[error("timer creation error: {0}")]
    TimerCreation(String),

    /// Persisted state store read/write failure.
    #[error("store error: {0}")]
    Store(String),

    /// Desktop notification could not be shown.
    #[error("notification error: {0}")]
    Notification(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// User-supplied settings outside the accepted range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Malformed control envelope or payload.
    #[error("contract error: {0}")]
    Contract(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ReminderError>;
