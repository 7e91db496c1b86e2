/// Errors that can occur in raw channel and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device at the given path.
    #[error("failed to open device {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// An I/O error occurred on the raw channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The platform HID layer reported an error.
    #[cfg(feature = "hid")]
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// The raw channel has been closed.
    #[error("raw channel closed")]
    Closed,
}

impl TransportError {
    /// Returns true for transient errors that should be retried by the caller.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TransportError::Io(err) if err.kind() == std::io::ErrorKind::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
