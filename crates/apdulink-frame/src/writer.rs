use apdulink_transport::{RawChannel, TransportError};
use tracing::trace;

use crate::codec::PacketConfig;
use crate::error::{FrameError, Result};

/// Writes complete commands, packet by packet, to a raw channel.
pub struct PacketWriter<C> {
    inner: C,
    config: PacketConfig,
}

impl<C: RawChannel> PacketWriter<C> {
    /// Create a writer with the default channel and packet size.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a writer with explicit configuration.
    pub fn with_config(inner: C, config: PacketConfig) -> Self {
        Self { inner, config }
    }

    /// Fragment a command and write every packet in order (blocking).
    ///
    /// Returns the number of packets written.
    pub fn send(&self, command: &[u8]) -> Result<usize> {
        let packets = self.config.wrap(command)?;
        for (index, packet) in packets.iter().enumerate() {
            self.write_packet(packet)?;
            trace!(index, total = packets.len(), "packet written");
        }
        Ok(packets.len())
    }

    /// Write one packet, re-issuing the write until its full length is accepted.
    ///
    /// Each retry hands the channel the same whole packet: a packet is a
    /// single report on the wire and is never split.
    pub fn write_packet(&self, packet: &[u8]) -> Result<()> {
        let mut written = 0usize;
        while written < packet.len() {
            match self.inner.write(packet) {
                Ok(0) => {
                    return Err(FrameError::Write(TransportError::Io(
                        std::io::Error::from(std::io::ErrorKind::WriteZero),
                    )))
                }
                Ok(n) => written += n,
                Err(err) if err.is_interrupted() => continue,
                Err(err) => return Err(FrameError::Write(err)),
            }
        }
        Ok(())
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    /// Consume the writer and return the inner channel.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}
