//! Enumeration snapshot.
//!
//! [`DeviceSnapshot`] is the ordered device set captured by one
//! [`Manager::enumerate`](crate::manager::Manager::enumerate) call.
//!
//! # Semantics
//! - A snapshot is **immutable**. Devices attached or removed afterwards are not
//!   reflected; enumerate again for a fresh view.
//! - Order is the host's enumeration order and is stable for the snapshot's lifetime.
//! - The host-owned device set is released exactly once, by [`DeviceSnapshot::release`]
//!   or on drop.
//! - [`DeviceHandle`]s borrow the snapshot and cannot outlive it.

use crate::backends::{HostSession, SetId};
use crate::device::{DeviceHandle, DeviceRef};
use crate::error::{Error, Result};
use crate::metadata::DeviceMeta;
use crate::report::RegistrationTable;
use tracing::debug;

pub struct DeviceSnapshot<'m> {
    session: &'m dyn HostSession,
    registrations: &'m RegistrationTable,
    set: SetId,
    devices: Vec<DeviceRef>,
    released: bool,
}

impl<'m> DeviceSnapshot<'m> {
    pub(crate) fn new(
        session: &'m dyn HostSession,
        registrations: &'m RegistrationTable,
        set: SetId,
        devices: Vec<DeviceRef>,
    ) -> Self {
        Self {
            session,
            registrations,
            set,
            devices,
            released: false,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<DeviceHandle<'_>> {
        let raw = *self.devices.get(index)?;
        Some(DeviceHandle::new(self.session, self.registrations, raw, index))
    }

    /// Handles in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = DeviceHandle<'_>> + '_ {
        self.devices
            .iter()
            .enumerate()
            .map(move |(index, raw)| {
                DeviceHandle::new(self.session, self.registrations, *raw, index)
            })
    }

    /// First device whose vendor and product ids match. Devices with unreadable ids never match.
    pub fn find(&self, vendor: u16, product: u16) -> Option<DeviceHandle<'_>> {
        self.iter().find(|device| device.matches(vendor, product))
    }

    /// Like [`find`](Self::find), but a miss is [`Error::DeviceNotFound`].
    pub fn find_or_err(&self, vendor: u16, product: u16) -> Result<DeviceHandle<'_>> {
        self.find(vendor, product)
            .ok_or(Error::DeviceNotFound { vendor, product })
    }

    /// Owned metadata for every device, in snapshot order.
    pub fn metadata(&self) -> Vec<DeviceMeta> {
        self.iter().map(|device| device.metadata()).collect()
    }

    /// Release the host device set now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            debug!(set = self.set.0, devices = self.devices.len(), "releasing device set");
            self.session.release_devices(self.set);
        }
    }
}

impl Drop for DeviceSnapshot<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for DeviceSnapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSnapshot")
            .field("set", &self.set)
            .field("devices", &self.devices)
            .finish()
    }
}

/// Linear scan for the first `(vendor, product)` match, in snapshot order.
pub fn find_device<'s>(
    snapshot: &'s DeviceSnapshot<'_>,
    vendor: u16,
    product: u16,
) -> Option<DeviceHandle<'s>> {
    snapshot.find(vendor, product)
}
