//! `hidapi` host backend.
//!
//! - [`HidApiHost::open`] initializes `hidapi` (optionally without the initial scan).
//! - Matching criteria become `reset_devices` + `add_devices(vid, pid)` calls; usage
//!   page/usage are filtered afterwards since `hidapi` cannot match on them.
//! - Each [`copy_devices`](HostSession::copy_devices) re-scans and hands out fresh
//!   [`DeviceRef`]s, backed by cloned `DeviceInfo` entries until the set is released.
//! - Ids are reported plainly ([`IdLayout::Plain`]).

use crate::backends::{DeviceSet, HidHost, HostSession, ManagerOptions, ReportSource, SetId};
use crate::device::{criteria_accept, DeviceRef, MatchCriteria};
use crate::error::{Error, Result};
use crate::property::{PropertyKey, PropertyValue};
use hidapi::{DeviceInfo, HidApi, HidDevice, HidError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opens sessions backed by the platform `hidapi` library.
#[derive(Clone, Copy, Debug, Default)]
pub struct HidApiHost;

impl HidHost for HidApiHost {
    fn open(&self, options: &ManagerOptions) -> Result<Box<dyn HostSession>> {
        let api = if options.enumerate_on_open {
            HidApi::new()
        } else {
            HidApi::new_without_enumerate()
        }
        .map_err(open_error)?;

        info!(
            devices = api.device_list().count(),
            "hidapi session opened"
        );

        Ok(Box::new(HidApiSession {
            state: Mutex::new(State {
                api,
                criteria: None,
                next_ref: 1,
                next_set: 1,
                known: HashMap::new(),
                sets: HashMap::new(),
            }),
        }))
    }
}

fn open_error(e: HidError) -> Error {
    match e {
        HidError::InitializationError => {
            Error::SubsystemUnavailable("hidapi failed to initialize".into())
        }
        other => Error::OpenFailed(other.to_string()),
    }
}

struct State {
    api: HidApi,
    criteria: Option<Vec<MatchCriteria>>,
    next_ref: u64,
    next_set: u64,
    known: HashMap<DeviceRef, DeviceInfo>,
    sets: HashMap<SetId, Vec<DeviceRef>>,
}

impl State {
    /// Re-scan according to the active criteria.
    fn rescan(&mut self) -> Result<()> {
        match self.criteria.as_deref() {
            None | Some([]) => self.api.refresh_devices().map_err(rescan_error),
            Some(list) => {
                self.api.reset_devices().map_err(rescan_error)?;
                for c in list {
                    self.api
                        .add_devices(c.vendor_id.unwrap_or(0), c.product_id.unwrap_or(0))
                        .map_err(rescan_error)?;
                }
                Ok(())
            }
        }
    }

    /// Current device list after criteria filtering, one entry per path.
    fn matching(&self) -> Vec<&DeviceInfo> {
        let mut seen = HashSet::new();
        self.api
            .device_list()
            .filter(|info| {
                criteria_accept(
                    self.criteria.as_deref(),
                    Some(info.vendor_id()),
                    Some(info.product_id()),
                    Some(info.usage_page()),
                    Some(info.usage()),
                )
            })
            .filter(|info| seen.insert(info.path().to_owned()))
            .collect()
    }
}

fn rescan_error(e: HidError) -> Error {
    Error::Enumeration(e.to_string())
}

pub struct HidApiSession {
    state: Mutex<State>,
}

impl HostSession for HidApiSession {
    fn set_matching(&self, criteria: Option<&[MatchCriteria]>) -> Result<()> {
        let mut state = self.state.lock();
        state.criteria = criteria.map(<[MatchCriteria]>::to_vec);
        debug!(criteria = ?state.criteria, "matching updated");
        state.rescan()
    }

    fn device_count(&self) -> Result<usize> {
        Ok(self.state.lock().matching().len())
    }

    fn copy_devices(&self) -> Result<DeviceSet> {
        let mut state = self.state.lock();
        state.rescan()?;

        let infos: Vec<DeviceInfo> = state.matching().into_iter().cloned().collect();
        let mut devices = Vec::with_capacity(infos.len());
        for info in infos {
            let Some(raw) = DeviceRef::new(state.next_ref) else {
                continue;
            };
            state.next_ref += 1;
            state.known.insert(raw, info);
            devices.push(raw);
        }

        let id = SetId(state.next_set);
        state.next_set += 1;
        state.sets.insert(id, devices.clone());
        Ok(DeviceSet { id, devices })
    }

    fn release_devices(&self, set: SetId) {
        let mut state = self.state.lock();
        match state.sets.remove(&set) {
            Some(refs) => {
                for raw in refs {
                    state.known.remove(&raw);
                }
            }
            None => warn!(set = set.0, "release of unknown device set"),
        }
    }

    fn property(&self, device: DeviceRef, key: &PropertyKey) -> Option<PropertyValue> {
        let state = self.state.lock();
        let info = state.known.get(&device)?;
        property_of(info, key)
    }

    fn open_reports(&self, device: DeviceRef) -> Result<Box<dyn ReportSource>> {
        let state = self.state.lock();
        let info = state.known.get(&device).ok_or_else(|| Error::DeviceOpen {
            device,
            reason: "device is not part of a live snapshot".into(),
        })?;
        let raw = info.open_device(&state.api).map_err(|e| Error::DeviceOpen {
            device,
            reason: e.to_string(),
        })?;
        debug!(
            %device,
            vid = info.vendor_id(),
            pid = info.product_id(),
            path = %info.path().to_string_lossy(),
            "opened report stream"
        );
        Ok(Box::new(HidReportSource { raw }))
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if !state.sets.is_empty() {
            warn!(outstanding = state.sets.len(), "closing session with unreleased device sets");
        }
        state.sets.clear();
        state.known.clear();
        info!("hidapi session closed");
    }
}

/// Map a `hidapi` device entry onto the property model. Unknown keys are absent.
fn property_of(info: &DeviceInfo, key: &PropertyKey) -> Option<PropertyValue> {
    let string = |s: Option<&str>| s.map(|s| PropertyValue::String(s.to_string()));
    match key {
        PropertyKey::VendorId => Some(PropertyValue::Number(i64::from(info.vendor_id()))),
        PropertyKey::ProductId => Some(PropertyValue::Number(i64::from(info.product_id()))),
        PropertyKey::VersionNumber => {
            Some(PropertyValue::Number(i64::from(info.release_number())))
        }
        PropertyKey::Manufacturer => string(info.manufacturer_string()),
        PropertyKey::Product => string(info.product_string()),
        PropertyKey::SerialNumber => string(info.serial_number()),
        PropertyKey::Transport => Some(PropertyValue::String(
            format!("{:?}", info.bus_type()).to_lowercase(),
        )),
        PropertyKey::PrimaryUsagePage => Some(PropertyValue::Number(i64::from(info.usage_page()))),
        PropertyKey::PrimaryUsage => Some(PropertyValue::Number(i64::from(info.usage()))),
        PropertyKey::InterfaceNumber => {
            let n = info.interface_number();
            (n >= 0).then(|| PropertyValue::Number(i64::from(n)))
        }
        PropertyKey::Path => Some(PropertyValue::String(
            info.path().to_string_lossy().into_owned(),
        )),
        PropertyKey::Custom(_) => None,
    }
}

/// Input reports from an opened `hidapi` device.
struct HidReportSource {
    raw: HidDevice,
}

impl ReportSource for HidReportSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.raw
            .read_timeout(buf, timeout_ms)
            .map_err(|e| Error::Read(e.to_string()))
    }
}
