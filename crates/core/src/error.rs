/// Result alias that carries the custom [`DuelError`] type.
pub type Result<T> = std::result::Result<T, DuelError>;

/// Common error type for the core crate.
///
/// Very little inside the battle loop ever returns an error: capture and
/// effect-chain failures are logged and swallowed so a bad tick never stops
/// the next one. The variants below cover the fallible edges — opening
/// devices, loading rating data — where surfacing a message is useful.
#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    /// Generic message wrapper for one-off failures.
    #[error("{0}")]
    Message(String),
    /// The audio capture backend could not be opened or has gone away.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
    /// A caller handed the crate malformed input (rating JSON, etc.).
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON decode errors from the rating index loader.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl DuelError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for DuelError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for DuelError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
