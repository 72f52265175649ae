//! Error handling for the playback pipeline.

use thiserror::Error;

/// Convenient result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors that may occur while loading the chip module, converting input,
/// rendering audio or driving the output device.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The chip module did not expose its synthesis entry point in time.
    #[error("chip module initialization timed out")]
    LoadTimeout,

    /// The chip module could not be fetched or injected at all.
    #[error("failed to load chip module: {0}")]
    LoadFailure(String),

    /// Attachment text is not syntactically valid JSON or uses an
    /// unrecognized tone shape. Rejected locally, before the conversion
    /// engine is called.
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// The conversion engine reported a failure, or refused the input.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// The engine output was not parseable at the top level.
    #[error("unreadable conversion output: {0}")]
    Decode(String),

    /// Render was requested for a sequence with no events.
    #[error("no events to render")]
    NoEvents,

    /// The chip module handle is missing or not yet initialized.
    /// Recoverable: retry once the module finishes loading.
    #[error("chip module not ready")]
    ModuleNotReady,

    /// A foreign call failed during synthesis (allocation, block write,
    /// synthesis or readback). Recoverable: derived playback state is
    /// reset, the source sequence stays intact.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Audio output device error.
    #[error("audio device error: {0}")]
    AudioDevice(String),

    /// IO error from filesystem or device.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl From<String> for PlayerError {
    fn from(msg: String) -> Self {
        PlayerError::Other(msg)
    }
}

impl From<&str> for PlayerError {
    fn from(msg: &str) -> Self {
        PlayerError::Other(msg.to_string())
    }
}
