use apdulink_frame::FrameError;
use apdulink_transport::TransportError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The packet configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[source] FrameError),

    /// No target device exists at the requested index.
    #[error("device not found at index {index}")]
    DeviceNotFound { index: usize },

    /// The command is shorter than an APDU header.
    #[error("invalid command ({len} bytes, min {min})")]
    InvalidCommand { len: usize, min: usize },

    /// The command length does not fit the packet length field.
    #[error("command too large ({size} bytes, max {max})")]
    CommandTooLarge { size: usize, max: usize },

    /// Writing a command packet to the raw channel failed.
    #[error("transport write failed: {0}")]
    TransportWriteFailed(#[source] TransportError),

    /// The device did not complete its response before the deadline.
    #[error("timed out after {0:?} waiting for response")]
    ExchangeTimeout(std::time::Duration),

    /// The background reader stopped before the response was complete.
    #[error("read channel closed before response was complete")]
    ReadChannelClosed,

    /// Fewer than two response bytes (no status word) were received.
    #[error("response too short: {len} bytes")]
    ResponseTooShort { len: usize },

    /// Another exchange is in flight on this session.
    #[error("session busy: another exchange is in flight")]
    Busy,

    /// The session has been closed.
    #[error("session closed")]
    Closed,

    /// Enumerating, opening or closing the device failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidConfiguration { .. } => SessionError::InvalidConfiguration(err),
            FrameError::CommandTooLarge { size, max } => SessionError::CommandTooLarge { size, max },
            FrameError::Write(source) => SessionError::TransportWriteFailed(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
