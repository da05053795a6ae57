/// Result alias that carries the custom [`CameliaError`] type.
pub type Result<T> = std::result::Result<T, CameliaError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum CameliaError {
    /// A caller supplied value or named mode that cannot be honoured.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Failure reported by an external media tool (ffmpeg, ffprobe).
    #[error("media error: {0}")]
    Media(String),
    /// Free-form message for failures that do not fit elsewhere.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON job file or tool output.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl CameliaError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn media<T: Into<String>>(msg: T) -> Self {
        Self::Media(msg.into())
    }
}
