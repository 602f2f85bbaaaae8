//! Error taxonomy.
//!
//! Subsystem-level failures ([`Error::SubsystemUnavailable`], [`Error::OpenFailed`]) are
//! fatal for a session. Per-device failures ([`Error::PropertyAbsentOrWrongType`],
//! [`Error::DeviceNotFound`]) are soft: the primary APIs return `Option` and these
//! variants exist for callers that prefer `?` over matching on `None`.

use crate::device::DeviceRef;
use crate::property::{PropertyKey, PropertyType};
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The native HID capability could not be loaded or initialized.
    #[error("HID subsystem unavailable: {0}")]
    SubsystemUnavailable(String),

    /// The manager session could not be established.
    #[error("failed to open HID manager: {0}")]
    OpenFailed(String),

    /// A property was missing, or present with a different type than requested.
    #[error("property {key} absent or not a {expected:?}")]
    PropertyAbsentOrWrongType {
        key: PropertyKey,
        expected: PropertyType,
    },

    /// Enumeration succeeded but no device matched.
    #[error("no device with vendor 0x{vendor:04X} product 0x{product:04X}")]
    DeviceNotFound { vendor: u16, product: u16 },

    /// The host failed to rescan its device list. The session stays usable.
    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    /// Report buffers must hold at least one byte.
    #[error("invalid report buffer size: {0}")]
    InvalidBufferSize(usize),

    /// The device already has an active report registration.
    #[error("{0} already has a report registration")]
    AlreadyRegistered(DeviceRef),

    /// The host could not open a report stream for a device.
    #[error("failed to open {device}: {reason}")]
    DeviceOpen { device: DeviceRef, reason: String },

    /// Reading an input report failed (device gone, transport error).
    #[error("input report read failed: {0}")]
    Read(String),

    /// The report delivery thread could not be started.
    #[error("failed to spawn report delivery thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
