//! Fixed-size APDU packet framing over raw channels.
//!
//! Every packet is exactly `packet_size` bytes wide and starts with a 5-byte
//! header:
//! - A 2-byte big-endian channel identifier
//! - A 1-byte tag (`0x05`)
//! - A 2-byte big-endian field: the total command length on the first
//!   packet of a message, a 0-based sequence number on continuations
//!
//! The rest of the packet carries payload, zero-padded on the last packet.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    packet_count, unwrap_response, wrap_command, Fragment, PacketConfig, DEFAULT_CHANNEL,
    DEFAULT_PACKET_SIZE, HEADER_SIZE, MAX_COMMAND_SIZE, TAG_APDU,
};
pub use error::{FrameError, Result};
pub use reader::{Push, Reassembly, ResponseAssembler};
pub use writer::PacketWriter;
