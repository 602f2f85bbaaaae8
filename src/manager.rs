//! Manager session.
//!
//! [`Manager`] owns one host session. Everything acquired through it is torn down
//! on every exit path:
//! - snapshots borrow the manager and release their device set on drop;
//! - closing (or dropping) the manager stops and joins every report delivery thread
//!   registered through it, then closes the host session exactly once.

use crate::backends::{HidHost, HostSession, ManagerOptions};
use crate::device::MatchCriteria;
use crate::error::Result;
use crate::report::RegistrationTable;
use crate::snapshot::DeviceSnapshot;
use tracing::{debug, info, warn};

/// An open HID manager session.
///
/// Closed exactly once, by [`Manager::close`] or on drop. Snapshots borrow the
/// manager, so it cannot be closed while one is still alive.
pub struct Manager {
    session: Box<dyn HostSession>,
    registrations: RegistrationTable,
    closed: bool,
}

impl Manager {
    /// Open a session on `host`.
    ///
    /// On failure nothing has been enumerated and there is nothing to close.
    pub fn open<H>(host: &H, options: &ManagerOptions) -> Result<Self>
    where
        H: HidHost + ?Sized,
    {
        let session = host.open(options).inspect_err(|e| {
            warn!(error = %e, "HID manager open failed");
        })?;
        info!(enumerate_on_open = options.enumerate_on_open, "HID manager opened");
        Ok(Self {
            session,
            registrations: RegistrationTable::default(),
            closed: false,
        })
    }

    /// Restrict enumeration. `None` or an empty list matches every device.
    pub fn set_matching(&self, criteria: Option<&[MatchCriteria]>) -> Result<()> {
        self.session.set_matching(criteria)
    }

    /// Number of devices currently matching.
    pub fn device_count(&self) -> Result<usize> {
        self.session.device_count()
    }

    /// Capture the matching devices as an ordered snapshot.
    pub fn enumerate(&self) -> Result<DeviceSnapshot<'_>> {
        let set = self.session.copy_devices()?;
        debug!(set = set.id.0, devices = set.devices.len(), "enumerated");
        // Owned from here on, so every exit path releases the set.
        let snapshot =
            DeviceSnapshot::new(&*self.session, &self.registrations, set.id, set.devices);
        let count = self.session.device_count()?;
        if count != snapshot.len() {
            warn!(
                count,
                copied = snapshot.len(),
                "device set changed during enumeration"
            );
        }
        Ok(snapshot)
    }

    /// Devices with an active report registration.
    pub fn active_registrations(&self) -> usize {
        self.registrations.active()
    }

    pub fn close(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if !self.closed {
            self.closed = true;
            let stopped = self.registrations.stop_all();
            if stopped > 0 {
                info!(stopped, "stopped report delivery before close");
            }
            self.session.close();
            info!("HID manager closed");
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.close_inner();
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("closed", &self.closed)
            .field("active_registrations", &self.registrations.active())
            .finish()
    }
}
