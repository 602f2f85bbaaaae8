//! Typed device properties.
//!
//! Host subsystems expose per-device key/value properties. Values arrive as a tagged
//! [`PropertyValue`]; callers ask for a specific [`PropertyType`] and get `None` when the
//! key is missing or the value has another shape. Nothing is coerced implicitly.
//!
//! ## Vendor/product id layout
//! Some hosts report vendor and product ids packed together with a source tag in the
//! low byte. [`IdLayout`] captures that per backend: `Packed { shift: 8 }` recovers the
//! 16-bit id as `raw >> 8`. The layout is a contract of the host, so each backend
//! declares its own (see [`HostSession::id_layout`](crate::backends::HostSession::id_layout)).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known property keys, plus an escape hatch for host-specific ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    VendorId,
    ProductId,
    VersionNumber,
    Manufacturer,
    Product,
    SerialNumber,
    Transport,
    PrimaryUsagePage,
    PrimaryUsage,
    InterfaceNumber,
    Path,
    Custom(String),
}

impl PropertyKey {
    /// Host-style key name (mirrors the `kIOHID*Key` spellings).
    pub fn as_str(&self) -> &str {
        match self {
            PropertyKey::VendorId => "VendorID",
            PropertyKey::ProductId => "ProductID",
            PropertyKey::VersionNumber => "VersionNumber",
            PropertyKey::Manufacturer => "Manufacturer",
            PropertyKey::Product => "Product",
            PropertyKey::SerialNumber => "SerialNumber",
            PropertyKey::Transport => "Transport",
            PropertyKey::PrimaryUsagePage => "PrimaryUsagePage",
            PropertyKey::PrimaryUsage => "PrimaryUsage",
            PropertyKey::InterfaceNumber => "InterfaceNumber",
            PropertyKey::Path => "Path",
            PropertyKey::Custom(name) => name,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape a caller expects a property to have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    RawBytes,
}

/// A property value as reported by the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Number(i64),
    Boolean(bool),
    RawBytes(Vec<u8>),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyType {
        match self {
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Number(_) => PropertyType::Number,
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::RawBytes(_) => PropertyType::RawBytes,
        }
    }

    /// Keep the value only if it has the expected shape.
    pub fn checked(self, expected: PropertyType) -> Option<Self> {
        (self.kind() == expected).then_some(self)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::RawBytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// How a host encodes vendor/product ids in its numeric properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdLayout {
    /// The property is the id itself.
    #[default]
    Plain,
    /// The id sits above a `shift`-bit source tag.
    Packed { shift: u32 },
}

impl IdLayout {
    /// The packed layout with an 8-bit source tag.
    pub const PACKED_TAG_BYTE: IdLayout = IdLayout::Packed { shift: 8 };

    /// Recover a 16-bit id from a raw property value.
    ///
    /// Negative values and ids that do not fit in 16 bits are treated as absent.
    pub fn decode(self, raw: i64) -> Option<u16> {
        let raw = u64::try_from(raw).ok()?;
        let id = match self {
            IdLayout::Plain => raw,
            IdLayout::Packed { shift } => raw.checked_shr(shift).unwrap_or(0),
        };
        u16::try_from(id).ok()
    }

    /// Inverse of [`decode`](Self::decode), tagging the low bits with `tag`.
    pub fn encode(self, id: u16, tag: u8) -> i64 {
        match self {
            IdLayout::Plain => i64::from(id),
            IdLayout::Packed { shift } => {
                let mask = 1i64.checked_shl(shift).map_or(i64::MAX, |bit| bit.wrapping_sub(1));
                i64::from(id).checked_shl(shift).unwrap_or(0) | (i64::from(tag) & mask)
            }
        }
    }
}
