use std::sync::Arc;

use crate::descriptor::DeviceDescriptor;
use crate::error::Result;

/// A packet-oriented link to one device.
///
/// Every call transfers at most one packet. Implementations are shared
/// between the thread that writes commands and the background reader, so
/// all operations take `&self`.
pub trait RawChannel: Send + Sync {
    /// Write one packet, returning the number of bytes accepted.
    ///
    /// A short count means the caller should re-issue the write.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Read one packet into `buf` (blocking), returning its length.
    ///
    /// Must return `Err(TransportError::Closed)` once [`RawChannel::close`]
    /// has been called, including for a read already blocked on another thread.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Release the underlying handle. Idempotent.
    fn close(&self) -> Result<()>;
}

impl<T: RawChannel + ?Sized> RawChannel for Arc<T> {
    fn write(&self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

impl<T: RawChannel + ?Sized> RawChannel for &T {
    fn write(&self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// Source of devices and the channels that talk to them.
pub trait DeviceRegistry {
    /// List every device currently attached, unfiltered.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open an exclusive channel to the described device.
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn RawChannel>>;
}

impl<R: DeviceRegistry + ?Sized> DeviceRegistry for &R {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        (**self).enumerate()
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn RawChannel>> {
        (**self).open(descriptor)
    }
}
