//! APDU exchange over fixed-size HID packets.
//!
//! apdulink frames command APDUs into fixed-width packets, writes them to a
//! device, and reassembles the response APDU from the packets read back.
//!
//! # Crate Structure
//!
//! - [`transport`]: Raw channel and device registry contracts, HID backend (behind `hid` feature)
//! - [`frame`]: Packet codec, packet writer and response assembler
//! - [`session`]: Exchange sessions and device discovery (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use apdulink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use apdulink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use apdulink_session::*;
}
