/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The host exposes no audio processing capability. Once observed, the
    /// graph reports this permanently and playback requests become no-ops.
    #[error("audio processing is not available on this host")]
    UnsupportedPlatform,
    /// The asynchronous start of a media handle settled with a failure
    /// (blocked autoplay, decode error, failed preview fetch).
    #[error("playback start rejected: {0}")]
    StartRejected(String),
    /// A media handle was offered to a second source node. Handles bind
    /// exactly once; a replay allocates a fresh handle instead.
    #[error("media handle is already bound to a source node")]
    AlreadyBound,
    /// The drawing surface is missing or detached at frame time.
    #[error("drawing surface is unavailable")]
    SurfaceUnavailable,
    /// Internal condition that only needs a readable message, e.g. a
    /// poisoned lock around a shared node.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
