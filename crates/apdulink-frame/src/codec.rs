use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Packet header: channel (2) + tag (1) + length/sequence (2) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Tag byte carried by every APDU packet.
pub const TAG_APDU: u8 = 0x05;

/// Default packet width (one USB HID report).
pub const DEFAULT_PACKET_SIZE: usize = 64;

/// Default channel identifier.
pub const DEFAULT_CHANNEL: u16 = 0x0101;

/// Largest command whose length fits the 16-bit header field.
pub const MAX_COMMAND_SIZE: usize = u16::MAX as usize;

/// Smallest packet that carries a header and one payload byte.
const MIN_PACKET_SIZE: usize = HEADER_SIZE + 1;

/// Channel and width shared by every packet of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketConfig {
    /// Channel identifier stamped on outbound packets and required on inbound ones.
    pub channel: u16,
    /// Fixed packet width in bytes.
    pub packet_size: usize,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL,
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }
}

impl PacketConfig {
    /// Check that the packet size leaves room for payload.
    pub fn validate(&self) -> Result<()> {
        check_packet_size(self.packet_size)
    }

    /// Payload bytes per packet.
    pub fn payload_capacity(&self) -> usize {
        self.packet_size.saturating_sub(HEADER_SIZE)
    }

    /// [`wrap_command`] with this configuration.
    pub fn wrap(&self, command: &[u8]) -> Result<Vec<Bytes>> {
        wrap_command(self.channel, command, self.packet_size)
    }

    /// [`unwrap_response`] with this configuration.
    pub fn unwrap<'a>(&self, packet: &'a [u8]) -> Option<Fragment<'a>> {
        unwrap_response(self.channel, packet, self.packet_size)
    }
}

/// Payload recovered from one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Payload with trailing zero padding stripped.
    ///
    /// A payload that really ends in zero bytes cannot be told apart from
    /// padding and comes back truncated.
    pub payload: &'a [u8],
    /// Payload region before padding was stripped.
    pub raw: &'a [u8],
    /// Raw length/sequence field of the header.
    pub marker: u16,
    /// True when `marker > 0` and `payload` is non-empty.
    ///
    /// The marker is a total length on first packets and a sequence number
    /// on continuations, so this is a heuristic: a continuation with sequence
    /// number 0 always reports `false`.
    pub more_expected: bool,
}

/// Split a command into fixed-width packets.
///
/// Wire format of each packet:
/// ```text
/// ┌──────────────┬──────────┬──────────────────┬──────────────────────────┐
/// │ Channel (2B) │ Tag (1B) │ Field (2B BE)     │ Payload                  │
/// │ BE           │ 0x05     │ first: total len  │ packet_size - 5 bytes,   │
/// │              │          │ next: seq 0, 1, ..│ zero-padded on the last  │
/// └──────────────┴──────────┴──────────────────┴──────────────────────────┘
/// ```
///
/// Fails with [`FrameError::InvalidConfiguration`] when `packet_size` is
/// below 6 (the header plus one payload byte), and with
/// [`FrameError::CommandTooLarge`] above 65535 command bytes.
pub fn wrap_command(channel: u16, command: &[u8], packet_size: usize) -> Result<Vec<Bytes>> {
    check_packet_size(packet_size)?;
    if command.len() > MAX_COMMAND_SIZE {
        return Err(FrameError::CommandTooLarge {
            size: command.len(),
            max: MAX_COMMAND_SIZE,
        });
    }

    let capacity = packet_size - HEADER_SIZE;
    let mut packets = Vec::with_capacity(packet_count(command.len(), packet_size));

    let (first, rest) = command.split_at(command.len().min(capacity));
    packets.push(encode_packet(channel, command.len() as u16, first, packet_size));

    let mut sequence = 0u16;
    for chunk in rest.chunks(capacity) {
        packets.push(encode_packet(channel, sequence, chunk, packet_size));
        sequence += 1;
    }

    Ok(packets)
}

/// Extract the payload of one inbound packet.
///
/// Returns `None` when the packet is too short or carries another channel
/// identifier or tag; such packets are not part of this conversation.
pub fn unwrap_response(channel: u16, packet: &[u8], packet_size: usize) -> Option<Fragment<'_>> {
    if packet.len() < HEADER_SIZE {
        return None;
    }
    if u16::from_be_bytes([packet[0], packet[1]]) != channel || packet[2] != TAG_APDU {
        return None;
    }

    let marker = u16::from_be_bytes([packet[3], packet[4]]);
    let end = packet.len().min(packet_size).max(HEADER_SIZE);
    let candidate = &packet[HEADER_SIZE..end];
    let len = candidate
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    let payload = &candidate[..len];

    Some(Fragment {
        payload,
        raw: candidate,
        marker,
        more_expected: marker > 0 && !payload.is_empty(),
    })
}

/// Number of packets [`wrap_command`] emits for a command of `command_len` bytes.
///
/// Returns 0 when `packet_size` cannot hold any payload.
pub fn packet_count(command_len: usize, packet_size: usize) -> usize {
    if packet_size < MIN_PACKET_SIZE {
        return 0;
    }
    let capacity = packet_size - HEADER_SIZE;
    if command_len <= capacity {
        1
    } else {
        1 + (command_len - capacity).div_ceil(capacity)
    }
}

fn check_packet_size(packet_size: usize) -> Result<()> {
    if packet_size < MIN_PACKET_SIZE {
        return Err(FrameError::InvalidConfiguration {
            packet_size,
            min: MIN_PACKET_SIZE,
        });
    }
    Ok(())
}

fn encode_packet(channel: u16, field: u16, payload: &[u8], packet_size: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(packet_size);
    buf.put_u16(channel);
    buf.put_u8(TAG_APDU);
    buf.put_u16(field);
    buf.put_slice(payload);
    buf.resize(packet_size, 0);
    buf.freeze()
}
