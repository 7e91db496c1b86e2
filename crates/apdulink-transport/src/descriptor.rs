use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity and capability data for one attached device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Platform path used to open the device.
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub release_number: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub usage_page: u16,
    pub usage: u16,
    /// USB interface number, `-1` when the platform does not report one.
    pub interface_number: i32,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} {} ({})",
            self.vendor_id,
            self.product_id,
            self.product.as_deref().unwrap_or("unknown product"),
            self.path
        )
    }
}

/// Predicate deciding whether a device is a target for this library.
///
/// Hardware identification is the caller's business: the registry lists every
/// device and the filter picks the ones a session may be opened on.
#[derive(Clone)]
pub struct DeviceFilter {
    predicate: Arc<dyn Fn(&DeviceDescriptor) -> bool + Send + Sync>,
}

impl DeviceFilter {
    /// Build a filter from an arbitrary predicate.
    pub fn new(predicate: impl Fn(&DeviceDescriptor) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Accept every device.
    pub fn any() -> Self {
        Self::new(|_| true)
    }

    /// Accept devices with exactly this vendor id.
    pub fn vendor(vendor_id: u16) -> Self {
        Self::new(move |d| d.vendor_id == vendor_id)
    }

    /// Returns true if the device is a target.
    pub fn matches(&self, descriptor: &DeviceDescriptor) -> bool {
        (self.predicate)(descriptor)
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceFilter").finish_non_exhaustive()
    }
}
