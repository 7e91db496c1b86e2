use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use hidapi::{DeviceInfo, HidApi, HidDevice};
use tracing::{debug, trace};

use crate::descriptor::DeviceDescriptor;
use crate::error::{Result, TransportError};
use crate::traits::{DeviceRegistry, RawChannel};

/// HID report id prepended to every output report.
const REPORT_ID: u8 = 0x00;

/// USB HID device registry.
///
/// Enumerates every HID device visible to the platform stack (hidraw on
/// Linux, IOKit on macOS, the HID class driver on Windows).
pub struct HidRegistry {
    api: Mutex<HidApi>,
}

impl HidRegistry {
    /// Initialise the platform HID library.
    pub fn new() -> Result<Self> {
        let api = HidApi::new()?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HidApi> {
        self.api.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeviceRegistry for HidRegistry {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut api = self.lock();
        api.refresh_devices()?;
        Ok(api.device_list().map(descriptor_from_info).collect())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn RawChannel>> {
        let path = CString::new(descriptor.path.as_bytes()).map_err(|e| {
            TransportError::OpenFailed {
                path: descriptor.path.clone(),
                reason: e.to_string(),
            }
        })?;
        let device = self
            .lock()
            .open_path(&path)
            .map_err(|e| TransportError::OpenFailed {
                path: descriptor.path.clone(),
                reason: e.to_string(),
            })?;
        debug!(path = %descriptor.path, "opened hid device");
        Ok(Arc::new(HidChannel::new(device)))
    }
}

/// Enumeration fields copied into a [`DeviceDescriptor`].
trait HidInfo {
    fn path(&self) -> &CStr;
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn release_number(&self) -> u16;
    fn serial_number(&self) -> Option<&str>;
    fn manufacturer(&self) -> Option<&str>;
    fn product(&self) -> Option<&str>;
    fn usage_page(&self) -> u16;
    fn usage(&self) -> u16;
    fn interface_number(&self) -> i32;
}

impl HidInfo for DeviceInfo {
    fn path(&self) -> &CStr {
        DeviceInfo::path(self)
    }
    fn vendor_id(&self) -> u16 {
        DeviceInfo::vendor_id(self)
    }
    fn product_id(&self) -> u16 {
        DeviceInfo::product_id(self)
    }
    fn release_number(&self) -> u16 {
        DeviceInfo::release_number(self)
    }
    fn serial_number(&self) -> Option<&str> {
        DeviceInfo::serial_number(self)
    }
    fn manufacturer(&self) -> Option<&str> {
        self.manufacturer_string()
    }
    fn product(&self) -> Option<&str> {
        self.product_string()
    }
    fn usage_page(&self) -> u16 {
        DeviceInfo::usage_page(self)
    }
    fn usage(&self) -> u16 {
        DeviceInfo::usage(self)
    }
    fn interface_number(&self) -> i32 {
        DeviceInfo::interface_number(self)
    }
}

fn descriptor_from_info(info: &impl HidInfo) -> DeviceDescriptor {
    DeviceDescriptor {
        path: info.path().to_string_lossy().into_owned(),
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        release_number: info.release_number(),
        serial_number: info.serial_number().map(str::to_owned),
        manufacturer: info.manufacturer().map(str::to_owned),
        product: info.product().map(str::to_owned),
        usage_page: info.usage_page(),
        usage: info.usage(),
        interface_number: info.interface_number(),
    }
}

/// Output report for one packet: report id, then the packet bytes.
fn output_report(packet: &[u8]) -> Vec<u8> {
    let mut report = Vec::with_capacity(packet.len() + 1);
    report.push(REPORT_ID);
    report.extend_from_slice(packet);
    report
}

/// Packet bytes accounted for by a report write of `written` bytes.
fn payload_written(written: usize, packet_len: usize) -> usize {
    written.saturating_sub(1).min(packet_len)
}

/// Shared device handle where writers go ahead of a polling reader.
///
/// `std::sync::Mutex` is not fair: a reader that releases the lock between
/// polls and immediately takes it again can keep a writer waiting for many
/// poll intervals. Writers announce themselves first and the reader yields
/// while any are pending, so a write waits for at most the poll in flight.
struct DeviceSlot<D> {
    device: Mutex<Option<D>>,
    pending_writers: AtomicUsize,
}

impl<D> DeviceSlot<D> {
    fn new(device: D) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            pending_writers: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<D>> {
        self.device
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_ahead_of_reader(&self) -> MutexGuard<'_, Option<D>> {
        self.pending_writers.fetch_add(1, Ordering::SeqCst);
        let guard = self.lock();
        self.pending_writers.fetch_sub(1, Ordering::SeqCst);
        guard
    }

    fn write<T>(&self, op: impl FnOnce(&D) -> Result<T>) -> Result<T> {
        let guard = self.lock_ahead_of_reader();
        let device = guard.as_ref().ok_or(TransportError::Closed)?;
        op(device)
    }

    fn poll<T>(&self, op: impl FnOnce(&D) -> Result<T>) -> Result<T> {
        while self.pending_writers.load(Ordering::SeqCst) > 0 {
            thread::yield_now();
        }
        let guard = self.lock();
        let device = guard.as_ref().ok_or(TransportError::Closed)?;
        op(device)
    }

    fn take(&self) -> Option<D> {
        self.lock_ahead_of_reader().take()
    }
}

/// A raw channel over one open HID device.
///
/// Reads poll the device so that a `close()` issued from another thread is
/// observed by a blocked reader within one poll interval. A write issued
/// while a read is blocked waits for the current poll only.
pub struct HidChannel {
    slot: DeviceSlot<HidDevice>,
    closed: AtomicBool,
    poll_interval: Duration,
}

impl HidChannel {
    /// Default read poll interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Wrap an already opened device.
    pub fn new(device: HidDevice) -> Self {
        Self {
            slot: DeviceSlot::new(device),
            closed: AtomicBool::new(false),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the read poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl RawChannel for HidChannel {
    fn write(&self, buf: &[u8]) -> Result<usize> {
        let report = output_report(buf);
        let written = self.slot.write(|device| Ok(device.write(&report)?))?;
        trace!(written, "hid write");
        Ok(payload_written(written, buf.len()))
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let timeout_ms = i32::try_from(self.poll_interval.as_millis()).unwrap_or(i32::MAX);
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            let read = self
                .slot
                .poll(|device| Ok(device.read_timeout(buf, timeout_ms)?))?;
            if read > 0 {
                trace!(read, "hid read");
                return Ok(read);
            }
            thread::yield_now();
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.slot.take().is_some() {
            debug!("closed hid device");
        }
        Ok(())
    }
}

impl Drop for HidChannel {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
