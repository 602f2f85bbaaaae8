//! hidtap: HID device discovery and input report capture.
//!
//! Opens a manager session on the host HID subsystem, enumerates matching devices
//! into an immutable snapshot, reads typed per-device properties, and delivers
//! input reports from a chosen device to a callback or a channel.
//!
//! ```no_run
//! use hidtap::{allocate_report_buffer, find_device, subscribe, HidApiHost, Manager};
//! use hidtap::{ManagerOptions, ReportSettings, DUALSHOCK4_PRODUCT_ID, SONY_VENDOR_ID};
//! use std::time::Duration;
//!
//! let mgr = Manager::open(&HidApiHost, &ManagerOptions::default())?;
//! let devices = mgr.enumerate()?;
//! let pad = find_device(&devices, SONY_VENDOR_ID, DUALSHOCK4_PRODUCT_ID);
//!
//! let buffer = allocate_report_buffer(64)?;
//! if let Some(sub) = subscribe(pad, &buffer, &ReportSettings::default())? {
//!     while let Some(report) = sub.recv_timeout(Duration::from_secs(1)) {
//!         println!("{} bytes", report.data.len());
//!     }
//! }
//! # Ok::<(), hidtap::Error>(())
//! ```

pub mod backends;
pub mod config;
pub mod device;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod property;
pub mod report;
pub mod snapshot;
pub mod usage;

#[cfg(feature = "hid")]
pub use backends::hid::HidApiHost;
pub use backends::simulated::{SimDevice, SimStats, SimulatedHost};
pub use backends::{HidHost, HostSession, ManagerOptions, ReportSource};
pub use config::Config;
pub use device::*;
pub use error::{Error, Result};
pub use manager::*;
pub use metadata::DeviceMeta;
pub use property::{IdLayout, PropertyKey, PropertyType, PropertyValue};
pub use report::*;
pub use snapshot::*;
pub use usage::{lookup, name_of, GenericDesktopUsage, UsagePage};
