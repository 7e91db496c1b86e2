//! Raw packet channel abstraction for APDU devices.
//!
//! This is the lowest layer of apdulink. It defines the contract the framing
//! and session layers rely on:
//! - [`RawChannel`]: blocking fixed-width packet read/write plus close
//! - [`DeviceRegistry`]: enumerate devices and open a channel to one of them
//! - [`DeviceFilter`]: caller-supplied predicate selecting target devices
//!
//! A USB HID backend built on `hidapi` is available behind the `hid` feature.

pub mod descriptor;
pub mod error;
pub mod traits;

#[cfg(feature = "hid")]
pub mod hid;

pub use descriptor::{DeviceDescriptor, DeviceFilter};
pub use error::{Result, TransportError};
pub use traits::{DeviceRegistry, RawChannel};

#[cfg(feature = "hid")]
pub use hid::{HidChannel, HidRegistry};
