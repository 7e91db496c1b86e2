//! In-memory device backend for running the full stack without hardware.
//!
//! [`MockChannel`] reassembles every written command, asks a responder for
//! the response APDU and queues the response packets for reading. Response
//! packets are framed like commands: the first packet's length field holds
//! the total response length. Sessions therefore need
//! [`Reassembly::DeclaredLength`](apdulink_frame::Reassembly::DeclaredLength)
//! to complete an exchange against the mock; the per-packet heuristic keeps
//! waiting after a single-packet response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use apdulink_frame::{PacketConfig, Push, Reassembly, ResponseAssembler};
use apdulink_transport::{
    DeviceDescriptor, DeviceRegistry, RawChannel, Result as TransportResult, TransportError,
};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

/// Produces the response APDU for one command APDU.
pub type Responder = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Response given to every command by default.
pub const DEFAULT_RESPONSE: [u8; 2] = [0x90, 0x00];

/// Gap between consecutive response packets, roughly one USB interrupt frame.
pub const DEFAULT_PACKET_INTERVAL: Duration = Duration::from_millis(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of mock devices.
pub struct MockRegistry {
    devices: Vec<DeviceDescriptor>,
    packet: PacketConfig,
    responder: Responder,
    packet_interval: Duration,
    opened: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockRegistry {
    /// One device answering every command with `90 00`.
    pub fn new() -> Self {
        Self::with_devices(1)
    }

    /// `count` identical devices.
    pub fn with_devices(count: usize) -> Self {
        Self {
            devices: (0..count).map(mock_descriptor).collect(),
            packet: PacketConfig::default(),
            responder: Arc::new(|_| DEFAULT_RESPONSE.to_vec()),
            packet_interval: DEFAULT_PACKET_INTERVAL,
            opened: Mutex::default(),
        }
    }

    /// Channel and packet width the devices speak.
    pub fn with_packet_config(mut self, packet: PacketConfig) -> Self {
        self.packet = packet;
        self
    }

    /// Replace the responder of devices opened from now on.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// Gap between consecutive response packets.
    pub fn with_packet_interval(mut self, interval: Duration) -> Self {
        self.packet_interval = interval;
        self
    }

    /// Every channel opened so far, in open order.
    pub fn opened(&self) -> Vec<Arc<MockChannel>> {
        lock(&self.opened).clone()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_descriptor(index: usize) -> DeviceDescriptor {
    DeviceDescriptor {
        path: format!("mock:{index}"),
        serial_number: Some(format!("MOCK{index:04}")),
        manufacturer: Some("apdulink".to_string()),
        product: Some("Mock Device".to_string()),
        ..DeviceDescriptor::default()
    }
}

impl DeviceRegistry for MockRegistry {
    fn enumerate(&self) -> TransportResult<Vec<DeviceDescriptor>> {
        Ok(self.devices.clone())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> TransportResult<Arc<dyn RawChannel>> {
        if !self.devices.iter().any(|d| d.path == descriptor.path) {
            return Err(TransportError::OpenFailed {
                path: descriptor.path.clone(),
                reason: "no such mock device".to_string(),
            });
        }
        let channel = Arc::new(
            MockChannel::new(self.packet, Arc::clone(&self.responder))
                .with_packet_interval(self.packet_interval),
        );
        lock(&self.opened).push(Arc::clone(&channel));
        debug!(path = %descriptor.path, "opened mock device");
        Ok(channel as Arc<dyn RawChannel>)
    }
}

/// One open mock device.
pub struct MockChannel {
    packet: PacketConfig,
    responder: Responder,
    packet_interval: Duration,
    inbound: Mutex<ResponseAssembler>,
    commands: Mutex<Vec<Vec<u8>>>,
    outbound_tx: Mutex<Option<Sender<Bytes>>>,
    outbound_rx: Receiver<Bytes>,
    closed: AtomicBool,
}

impl MockChannel {
    pub fn new(packet: PacketConfig, responder: Responder) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            packet,
            responder,
            packet_interval: DEFAULT_PACKET_INTERVAL,
            inbound: Mutex::new(Self::command_assembler(packet)),
            commands: Mutex::default(),
            outbound_tx: Mutex::new(Some(tx)),
            outbound_rx: rx,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_packet_interval(mut self, interval: Duration) -> Self {
        self.packet_interval = interval;
        self
    }

    /// Commands received so far, reassembled.
    pub fn commands(&self) -> Vec<Vec<u8>> {
        lock(&self.commands).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn command_assembler(packet: PacketConfig) -> ResponseAssembler {
        ResponseAssembler::with_mode(packet, Reassembly::DeclaredLength)
    }

    fn respond(&self, command: Vec<u8>) {
        let response = (self.responder)(&command);
        lock(&self.commands).push(command);

        let packets = match self.packet.wrap(&response) {
            Ok(packets) => packets,
            Err(err) => {
                warn!(%err, "mock response cannot be framed");
                return;
            }
        };
        if let Some(tx) = lock(&self.outbound_tx).as_ref() {
            for packet in packets {
                let _ = tx.send(packet);
            }
        }
    }
}

impl RawChannel for MockChannel {
    fn write(&self, buf: &[u8]) -> TransportResult<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let command = {
            let mut inbound = lock(&self.inbound);
            if inbound.push(buf) == Push::Foreign {
                warn!(len = buf.len(), "mock ignored packet for another channel");
                return Ok(buf.len());
            }
            if !inbound.is_complete() {
                return Ok(buf.len());
            }
            let done = std::mem::replace(&mut *inbound, Self::command_assembler(self.packet));
            done.finish()
        };

        trace!(len = command.len(), "mock received command");
        self.respond(command.to_vec());
        Ok(buf.len())
    }

    fn read(&self, buf: &mut [u8]) -> TransportResult<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let packet = self
            .outbound_rx
            .recv()
            .map_err(|_| TransportError::Closed)?;
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if !self.packet_interval.is_zero() {
            thread::sleep(self.packet_interval);
        }

        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        Ok(n)
    }

    fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        lock(&self.outbound_tx).take();
        debug!("closed mock device");
        Ok(())
    }
}
