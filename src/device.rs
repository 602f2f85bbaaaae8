//! Device identity and per-device property access.
//!
//! A [`DeviceHandle`] is a non-owning view of one host device. It borrows the
//! [`DeviceSnapshot`](crate::snapshot::DeviceSnapshot) it came from, so it can never
//! outlive the host device set backing it.
//!
//! Property lookups fail softly: a missing key or a value of the wrong shape yields
//! `None`, never a panic. A device whose vendor or product id cannot be read simply
//! never matches.

use crate::backends::{HostSession, ReportSource};
use crate::error::{Error, Result};
use crate::metadata::DeviceMeta;
use crate::property::{PropertyKey, PropertyType, PropertyValue};
use crate::report::RegistrationTable;
use crate::usage::UsagePage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Sony Interactive Entertainment.
pub const SONY_VENDOR_ID: u16 = 0x054C;
/// Dualshock4 (first revision, CUH-ZCT1).
pub const DUALSHOCK4_PRODUCT_ID: u16 = 0x05C4;

/// Opaque host reference to a device. Never null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceRef(NonZeroU64);

impl DeviceRef {
    /// `None` for the null reference.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for DeviceRef {
    fn from(raw: NonZeroU64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

/// Borrowed handle to one device in a snapshot.
#[derive(Clone, Copy)]
pub struct DeviceHandle<'s> {
    session: &'s dyn HostSession,
    registrations: &'s RegistrationTable,
    raw: DeviceRef,
    index: usize,
}

impl<'s> DeviceHandle<'s> {
    pub(crate) fn new(
        session: &'s dyn HostSession,
        registrations: &'s RegistrationTable,
        raw: DeviceRef,
        index: usize,
    ) -> Self {
        Self {
            session,
            registrations,
            raw,
            index,
        }
    }

    /// Host reference of this device.
    pub fn id(&self) -> DeviceRef {
        self.raw
    }

    /// Position in the snapshot this handle came from.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Look up `key`, keeping the value only if it has the `expected` shape.
    pub fn get_property(&self, key: &PropertyKey, expected: PropertyType) -> Option<PropertyValue> {
        self.session.property(self.raw, key)?.checked(expected)
    }

    /// Like [`get_property`](Self::get_property) but absence is an error.
    pub fn require_property(&self, key: &PropertyKey, expected: PropertyType) -> Result<PropertyValue> {
        self.get_property(key, expected)
            .ok_or_else(|| Error::PropertyAbsentOrWrongType {
                key: key.clone(),
                expected,
            })
    }

    fn string_property(&self, key: PropertyKey) -> Option<String> {
        self.get_property(&key, PropertyType::String)?.into_string()
    }

    fn number_property(&self, key: PropertyKey) -> Option<i64> {
        self.get_property(&key, PropertyType::Number)?.as_number()
    }

    /// Vendor id, decoded with the host's [`IdLayout`](crate::property::IdLayout).
    pub fn vendor_id(&self) -> Option<u16> {
        let raw = self.number_property(PropertyKey::VendorId)?;
        self.session.id_layout().decode(raw)
    }

    /// Product id, decoded with the host's [`IdLayout`](crate::property::IdLayout).
    pub fn product_id(&self) -> Option<u16> {
        let raw = self.number_property(PropertyKey::ProductId)?;
        self.session.id_layout().decode(raw)
    }

    pub fn manufacturer(&self) -> Option<String> {
        self.string_property(PropertyKey::Manufacturer)
    }

    pub fn product(&self) -> Option<String> {
        self.string_property(PropertyKey::Product)
    }

    pub fn serial_number(&self) -> Option<String> {
        self.string_property(PropertyKey::SerialNumber)
    }

    pub fn transport(&self) -> Option<String> {
        self.string_property(PropertyKey::Transport)
    }

    pub fn path(&self) -> Option<String> {
        self.string_property(PropertyKey::Path)
    }

    pub fn usage_page(&self) -> Option<UsagePage> {
        let raw = self.number_property(PropertyKey::PrimaryUsagePage)?;
        u16::try_from(raw).ok().map(UsagePage::from_code)
    }

    pub fn usage(&self) -> Option<u16> {
        u16::try_from(self.number_property(PropertyKey::PrimaryUsage)?).ok()
    }

    pub fn interface_number(&self) -> Option<i32> {
        i32::try_from(self.number_property(PropertyKey::InterfaceNumber)?).ok()
    }

    /// `true` only when both ids are readable and equal to the given pair.
    pub fn matches(&self, vendor: u16, product: u16) -> bool {
        self.vendor_id() == Some(vendor) && self.product_id() == Some(product)
    }

    /// Collect everything known about this device into an owned record.
    pub fn metadata(&self) -> DeviceMeta {
        DeviceMeta {
            index: self.index,
            transport: self.transport(),
            vid: self.vendor_id(),
            pid: self.product_id(),
            manufacturer: self.manufacturer(),
            product_string: self.product(),
            serial_number: self.serial_number(),
            interface_number: self.interface_number(),
            usage_page: self.usage_page().map(UsagePage::code),
            usage: self.usage(),
            path: self.path(),
        }
    }

    pub(crate) fn open_reports(&self) -> Result<Box<dyn ReportSource>> {
        self.session.open_reports(self.raw)
    }

    pub(crate) fn registrations(&self) -> &'s RegistrationTable {
        self.registrations
    }
}

impl fmt::Debug for DeviceHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("raw", &self.raw)
            .field("index", &self.index)
            .finish()
    }
}

impl PartialEq for DeviceHandle<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.index == other.index
    }
}

impl Eq for DeviceHandle<'_> {}

/// Restricts which devices a session enumerates. Unset fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchCriteria {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub usage_page: Option<u16>,
    pub usage: Option<u16>,
}

impl MatchCriteria {
    pub fn device(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn usage(usage_page: u16, usage: u16) -> Self {
        Self {
            usage_page: Some(usage_page),
            usage: Some(usage),
            ..Self::default()
        }
    }

    /// Check decoded identity fields against this criterion.
    ///
    /// A field the device does not report only matches an unset criterion.
    pub fn accepts(
        &self,
        vendor_id: Option<u16>,
        product_id: Option<u16>,
        usage_page: Option<u16>,
        usage: Option<u16>,
    ) -> bool {
        fn field(want: Option<u16>, have: Option<u16>) -> bool {
            want.map_or(true, |w| have == Some(w))
        }
        field(self.vendor_id, vendor_id)
            && field(self.product_id, product_id)
            && field(self.usage_page, usage_page)
            && field(self.usage, usage)
    }
}

/// `true` if any criterion accepts the device, or if there are no criteria.
pub fn criteria_accept(
    criteria: Option<&[MatchCriteria]>,
    vendor_id: Option<u16>,
    product_id: Option<u16>,
    usage_page: Option<u16>,
    usage: Option<u16>,
) -> bool {
    match criteria {
        None => true,
        Some([]) => true,
        Some(list) => list
            .iter()
            .any(|c| c.accepts(vendor_id, product_id, usage_page, usage)),
    }
}
