//! APDU exchange sessions over packet channels.
//!
//! This is the "just works" layer. Find a device, open a [`Session`] on it,
//! exchange command APDUs for response APDUs, close it.
//!
//! ```no_run
//! # #[cfg(feature = "hid")]
//! # fn main() -> apdulink_session::Result<()> {
//! use apdulink_session::Admin;
//! use apdulink_transport::{DeviceFilter, HidRegistry};
//!
//! let admin = Admin::new(HidRegistry::new()?).with_filter(DeviceFilter::vendor(0x2c97));
//! let session = admin.connect(0)?;
//! let response = session.exchange(&[0xE0, 0x01, 0x00, 0x00, 0x00])?;
//! println!("{}", hex::encode(&response));
//! session.close()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "hid"))]
//! # fn main() {}
//! ```

pub mod admin;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
mod reader;
pub mod session;
pub mod status;

pub use admin::Admin;
pub use error::{Result, SessionError};
pub use session::{Session, SessionConfig, SessionState, DEFAULT_EXCHANGE_TIMEOUT, MIN_COMMAND_LEN};
pub use status::{split_status, StatusWord};

#[cfg(feature = "mock")]
pub use mock::{MockChannel, MockRegistry};
