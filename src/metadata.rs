//! Device metadata record.
//!
//! [`DeviceMeta`] is an owned, cloneable description of a device suitable for
//! listing, logging and JSON output. It is built from a
//! [`DeviceHandle`](crate::device::DeviceHandle) and, unlike the handle, may outlive
//! the snapshot it came from. Unknown fields remain `None`.
//!
//! # Conventions
//! - `transport` is the host's bus hint, e.g. `"usb"` or `"bluetooth"`.
//! - `vid`/`pid` are already decoded with the host's id layout.
//! - `path` is an OS path, useful for diagnostics; treat it as opaque.
//!
//! # Example
//! ```no_run
//! use hidtap::{HidApiHost, Manager, ManagerOptions};
//!
//! let mgr = Manager::open(&HidApiHost, &ManagerOptions::default()).expect("open manager");
//! let snapshot = mgr.enumerate().expect("enumerate");
//! for device in snapshot.iter() {
//!     println!("{}", device.metadata());
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owned description of a single device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMeta {
    /// Position in the snapshot the record was taken from.
    pub index: usize,

    /// Bus classification reported by the host.
    pub transport: Option<String>,

    /// Vendor ID, if readable.
    pub vid: Option<u16>,

    /// Product ID, if readable.
    pub pid: Option<u16>,

    /// Manufacturer string from the device firmware.
    pub manufacturer: Option<String>,

    /// Human-readable product name.
    pub product_string: Option<String>,

    pub serial_number: Option<String>,

    /// HID interface index. Some stacks use `-1` for "not applicable".
    pub interface_number: Option<i32>,

    /// Primary usage page (e.g. `0x01` Generic Desktop).
    pub usage_page: Option<u16>,

    /// Primary usage within the page (e.g. `0x05` Gamepad).
    pub usage: Option<u16>,

    pub path: Option<String>,
}

impl fmt::Display for DeviceMeta {
    /// `(index, manufacturer, vendor id, product id)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |v: Option<u16>| v.map_or_else(|| "?".to_string(), |v| format!("0x{v:04X}"));
        write!(
            f,
            "({}, {}, {}, {})",
            self.index,
            self.manufacturer.as_deref().unwrap_or("Unknown"),
            id(self.vid),
            id(self.pid),
        )
    }
}
