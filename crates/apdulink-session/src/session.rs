use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use apdulink_frame::{PacketConfig, PacketWriter, Push, Reassembly, ResponseAssembler};
use apdulink_transport::{DeviceDescriptor, DeviceFilter, DeviceRegistry, RawChannel};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, trace, warn};

use crate::error::{Result, SessionError};
use crate::reader;

/// Overall deadline for one exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Shortest accepted command: a bare APDU header.
pub const MIN_COMMAND_LEN: usize = 5;

/// Per-session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Channel identifier and packet width.
    pub packet: PacketConfig,
    /// Deadline for the receive phase of one exchange.
    pub exchange_timeout: Duration,
    /// Commands shorter than this are rejected before anything is written.
    pub min_command_len: usize,
    /// How the end of a response is detected.
    pub reassembly: Reassembly,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            packet: PacketConfig::default(),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            min_command_len: MIN_COMMAND_LEN,
            reassembly: Reassembly::default(),
        }
    }
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    Exchanging,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Open => "open",
            SessionState::Exchanging => "exchanging",
        };
        f.write_str(name)
    }
}

/// One open device and the exchanges running over it.
///
/// A session serializes exchanges: a second `exchange` issued while one is
/// in flight fails with [`SessionError::Busy`] instead of interleaving
/// packets. The background reader is started by the first exchange and
/// lives until the raw channel stops returning data.
pub struct Session {
    descriptor: Option<DeviceDescriptor>,
    writer: PacketWriter<Arc<dyn RawChannel>>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    handoff: OnceLock<Receiver<Bytes>>,
}

impl Session {
    /// Open the `index`-th device of `registry` that matches `filter`.
    pub fn open<R>(
        registry: &R,
        filter: &DeviceFilter,
        index: usize,
        config: SessionConfig,
    ) -> Result<Self>
    where
        R: DeviceRegistry + ?Sized,
    {
        config
            .packet
            .validate()
            .map_err(SessionError::InvalidConfiguration)?;

        let descriptor = registry
            .enumerate()?
            .into_iter()
            .filter(|d| filter.matches(d))
            .nth(index)
            .ok_or(SessionError::DeviceNotFound { index })?;

        let channel = registry.open(&descriptor)?;
        debug!(index, device = %descriptor, "session opened");
        Ok(Self::build(Some(descriptor), channel, config))
    }

    /// Open a session over an already opened raw channel.
    pub fn from_channel(channel: Arc<dyn RawChannel>, config: SessionConfig) -> Result<Self> {
        config
            .packet
            .validate()
            .map_err(SessionError::InvalidConfiguration)?;
        Ok(Self::build(None, channel, config))
    }

    fn build(
        descriptor: Option<DeviceDescriptor>,
        channel: Arc<dyn RawChannel>,
        config: SessionConfig,
    ) -> Self {
        Self {
            descriptor,
            writer: PacketWriter::with_config(channel, config.packet),
            config,
            state: Mutex::new(SessionState::Open),
            handoff: OnceLock::new(),
        }
    }

    /// Send one command APDU and wait for its response APDU.
    ///
    /// The response includes the trailing status word. Every failure ends
    /// the exchange; the session returns to [`SessionState::Open`] unless the
    /// read side of the channel is gone, in which case it is closed.
    ///
    /// A closed session fails with [`SessionError::Closed`] and a busy one
    /// with [`SessionError::Busy`] before the command length is checked.
    pub fn exchange(&self, command: &[u8]) -> Result<Bytes> {
        self.begin(command)?;
        let result = self.run_exchange(command);
        self.finish(&result);
        result
    }

    /// Close the session and its raw channel. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closed;
        }
        self.writer.get_ref().close()?;
        debug!("session closed");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Descriptor of the device, when opened through a registry.
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, command: &[u8]) -> Result<()> {
        let mut state = self.lock_state();
        match *state {
            SessionState::Closed => Err(SessionError::Closed),
            SessionState::Exchanging => Err(SessionError::Busy),
            SessionState::Open if command.len() < self.config.min_command_len => {
                Err(SessionError::InvalidCommand {
                    len: command.len(),
                    min: self.config.min_command_len,
                })
            }
            SessionState::Open => {
                *state = SessionState::Exchanging;
                Ok(())
            }
        }
    }

    fn finish(&self, result: &Result<Bytes>) {
        let reader_gone = matches!(result, Err(SessionError::ReadChannelClosed));
        {
            let mut state = self.lock_state();
            // close() may have run while the exchange was in flight.
            if *state != SessionState::Exchanging {
                return;
            }
            *state = if reader_gone {
                SessionState::Closed
            } else {
                SessionState::Open
            };
        }
        if reader_gone {
            if let Err(err) = self.writer.get_ref().close() {
                warn!(%err, "closing channel after reader stopped failed");
            }
        }
    }

    fn run_exchange(&self, command: &[u8]) -> Result<Bytes> {
        let handoff = self.handoff.get_or_init(|| {
            reader::spawn(
                Arc::clone(self.writer.get_ref()),
                self.config.packet.packet_size,
            )
        });
        let deadline = Instant::now().checked_add(self.config.exchange_timeout);

        debug!(command = %hex::encode(command), "=>");

        discard_stale(handoff);
        let packets = self.writer.send(command)?;
        trace!(packets, "command sent");

        let response = self.receive(handoff, deadline)?;
        debug!(response = %hex::encode(&response), "<=");

        if response.len() < 2 {
            return Err(SessionError::ResponseTooShort {
                len: response.len(),
            });
        }
        Ok(response)
    }

    fn receive(&self, handoff: &Receiver<Bytes>, deadline: Option<Instant>) -> Result<Bytes> {
        let mut assembler = ResponseAssembler::with_mode(self.config.packet, self.config.reassembly);
        loop {
            let packet = match deadline {
                Some(deadline) => handoff.recv_deadline(deadline),
                None => handoff.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let packet = match packet {
                Ok(packet) => packet,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        received = assembler.len(),
                        packets = assembler.packets(),
                        "no complete response before deadline"
                    );
                    return Err(SessionError::ExchangeTimeout(self.config.exchange_timeout));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(SessionError::ReadChannelClosed),
            };

            match assembler.push(&packet) {
                Push::Foreign => warn!(len = packet.len(), "discarding packet for another channel"),
                Push::Accepted {
                    more_expected: true,
                } => {}
                Push::Accepted {
                    more_expected: false,
                } => return Ok(assembler.finish()),
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("descriptor", &self.descriptor)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Empty the handoff of packets left over from an earlier exchange.
fn discard_stale(handoff: &Receiver<Bytes>) {
    let stale = handoff.try_iter().count();
    if stale > 0 {
        warn!(stale, "discarded stale packets before send");
    }
}
