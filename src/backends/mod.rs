//! Host HID subsystem backends.
//!
//! The native HID subsystem is consumed through three traits:
//! - [`HidHost`] loads the capability and opens a manager session.
//! - [`HostSession`] is one live session: matching, enumeration, properties, report sources.
//! - [`ReportSource`] is a blocking, timeout-bounded stream of input reports for one device.
//!
//! # Feature flags
//! - **`hid`** (default) enables [`hid::HidApiHost`], built on `hidapi`. On macOS `hidapi`
//!   drives the IOHIDManager, on Linux hidraw, on Windows the HID class driver.
//!
//! [`simulated::SimulatedHost`] is always available for tests and dry runs.

use crate::device::{DeviceRef, MatchCriteria};
use crate::error::Result;
use crate::property::{IdLayout, PropertyKey, PropertyValue};
use std::time::Duration;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;
pub mod simulated;

/// Options applied when a manager session is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Enumerate attached devices while opening. When `false` the device list stays empty
    /// until matching criteria are set or the first enumeration.
    pub enumerate_on_open: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            enumerate_on_open: true,
        }
    }
}

/// Identifies one host-owned device set returned by [`HostSession::copy_devices`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SetId(pub u64);

/// A device set copied out of the host. Must be handed back via
/// [`HostSession::release_devices`].
#[derive(Debug)]
pub struct DeviceSet {
    pub id: SetId,
    pub devices: Vec<DeviceRef>,
}

/// A loadable host HID capability.
pub trait HidHost {
    /// Load the capability and open a session.
    ///
    /// Fails with [`Error::SubsystemUnavailable`](crate::Error::SubsystemUnavailable) when the
    /// native library cannot be initialized and [`Error::OpenFailed`](crate::Error::OpenFailed)
    /// when the session cannot be established.
    fn open(&self, options: &ManagerOptions) -> Result<Box<dyn HostSession>>;
}

/// One open manager session.
pub trait HostSession {
    /// Restrict future enumerations. `None` matches every device.
    fn set_matching(&self, criteria: Option<&[MatchCriteria]>) -> Result<()>;

    /// Number of devices the host currently reports for the active matching.
    fn device_count(&self) -> Result<usize>;

    /// Copy the current device set out of the host.
    fn copy_devices(&self) -> Result<DeviceSet>;

    /// Return a set obtained from [`copy_devices`](Self::copy_devices).
    fn release_devices(&self, set: SetId);

    /// Raw property lookup. `None` when the key is not present.
    fn property(&self, device: DeviceRef, key: &PropertyKey) -> Option<PropertyValue>;

    /// How this host packs vendor/product ids.
    fn id_layout(&self) -> IdLayout {
        IdLayout::Plain
    }

    /// Open an input report stream for `device`.
    fn open_reports(&self, device: DeviceRef) -> Result<Box<dyn ReportSource>>;

    /// Tear the session down. Called exactly once.
    fn close(&self);
}

/// Blocking source of input reports for a single device.
pub trait ReportSource: Send {
    /// Read one report into `buf`, waiting at most `timeout`.
    ///
    /// `Ok(0)` means no report arrived in time. An error ends delivery.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

