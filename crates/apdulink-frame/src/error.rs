use apdulink_transport::TransportError;

/// Errors that can occur during packet framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The packet size cannot hold a header plus at least one payload byte.
    #[error("invalid packet size {packet_size} (min {min})")]
    InvalidConfiguration { packet_size: usize, min: usize },

    /// The command length does not fit the 16-bit length field.
    #[error("command too large ({size} bytes, max {max})")]
    CommandTooLarge { size: usize, max: usize },

    /// The raw channel rejected a packet write.
    #[error("packet write failed: {0}")]
    Write(#[source] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
