use apdulink_transport::{DeviceDescriptor, DeviceFilter, DeviceRegistry};
use tracing::{debug, info};

use crate::error::Result;
use crate::session::{Session, SessionConfig};

/// Device discovery and session factory over one registry.
pub struct Admin<R> {
    registry: R,
    filter: DeviceFilter,
    session_config: SessionConfig,
}

impl<R: DeviceRegistry> Admin<R> {
    /// Accept every device the registry reports, with default session settings.
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            filter: DeviceFilter::any(),
            session_config: SessionConfig::default(),
        }
    }

    /// Restrict discovery to devices accepted by `filter`.
    pub fn with_filter(mut self, filter: DeviceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Configuration applied to every session opened by [`Admin::connect`].
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Descriptors of every matching device, in enumeration order.
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let all = self.registry.enumerate()?;
        if all.is_empty() {
            info!("no devices found; a device may be locked or held by another program");
        }
        for device in &all {
            debug!(
                path = %device.path,
                vendor_id = device.vendor_id,
                product_id = device.product_id,
                usage_page = device.usage_page,
                interface = device.interface_number,
                "enumerated device"
            );
        }
        Ok(all
            .into_iter()
            .filter(|d| self.filter.matches(d))
            .collect())
    }

    /// Number of matching devices.
    pub fn count_devices(&self) -> Result<usize> {
        Ok(self.list_devices()?.len())
    }

    /// Open a session on the `index`-th matching device.
    pub fn connect(&self, index: usize) -> Result<Session> {
        Session::open(&self.registry, &self.filter, index, self.session_config)
    }

    /// Borrow the underlying registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn filter(&self) -> &DeviceFilter {
        &self.filter
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }
}
