//! In-process host for tests and dry runs.
//!
//! [`SimulatedHost`] scripts a device set without touching real hardware. It encodes
//! vendor/product ids with a configurable [`IdLayout`] (packed with a tag byte by
//! default), can be told to fail loading or opening, accepts injected input reports,
//! and counts lifecycle calls so callers can check that every open is closed and every
//! device set is released.
//!
//! Property lookups answer from the device sets a session has copied out and not yet
//! released, so a snapshot stays readable after its devices are detached.

use crate::backends::{DeviceSet, HidHost, HostSession, ManagerOptions, ReportSource, SetId};
use crate::device::{
    criteria_accept, DeviceRef, MatchCriteria, DUALSHOCK4_PRODUCT_ID, SONY_VENDOR_ID,
};
use crate::error::{Error, Result};
use crate::property::{IdLayout, PropertyKey, PropertyValue};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builder for one scripted device.
#[derive(Clone, Debug)]
pub struct SimDevice {
    properties: HashMap<PropertyKey, PropertyValue>,
    vendor_id: Option<u16>,
    product_id: Option<u16>,
    source_tag: u8,
}

impl SimDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            properties: HashMap::new(),
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            source_tag: 0,
        }
    }

    /// A wired Dualshock4 on the Generic Desktop / Gamepad usage.
    pub fn dualshock4() -> Self {
        Self::new(SONY_VENDOR_ID, DUALSHOCK4_PRODUCT_ID)
            .manufacturer("Sony Computer Entertainment")
            .product("Wireless Controller")
            .transport("usb")
            .usage(0x01, 0x05)
    }

    pub fn manufacturer(self, name: &str) -> Self {
        self.property(PropertyKey::Manufacturer, PropertyValue::String(name.into()))
    }

    pub fn product(self, name: &str) -> Self {
        self.property(PropertyKey::Product, PropertyValue::String(name.into()))
    }

    pub fn transport(self, name: &str) -> Self {
        self.property(PropertyKey::Transport, PropertyValue::String(name.into()))
    }

    pub fn usage(self, usage_page: u16, usage: u16) -> Self {
        self.property(
            PropertyKey::PrimaryUsagePage,
            PropertyValue::Number(i64::from(usage_page)),
        )
        .property(PropertyKey::PrimaryUsage, PropertyValue::Number(i64::from(usage)))
    }

    /// Low bits stored under packed ids.
    pub fn source_tag(mut self, tag: u8) -> Self {
        self.source_tag = tag;
        self
    }

    /// Drop the vendor id property entirely.
    pub fn without_vendor_id(mut self) -> Self {
        self.vendor_id = None;
        self
    }

    /// Set an arbitrary property. Overrides the encoded ids when used with their keys.
    pub fn property(mut self, key: PropertyKey, value: PropertyValue) -> Self {
        self.properties.insert(key, value);
        self
    }

    fn into_properties(self, layout: IdLayout) -> HashMap<PropertyKey, PropertyValue> {
        let mut props = HashMap::new();
        if let Some(vid) = self.vendor_id {
            props.insert(
                PropertyKey::VendorId,
                PropertyValue::Number(layout.encode(vid, self.source_tag)),
            );
        }
        if let Some(pid) = self.product_id {
            props.insert(
                PropertyKey::ProductId,
                PropertyValue::Number(layout.encode(pid, self.source_tag)),
            );
        }
        props.extend(self.properties);
        props
    }
}

/// Counters of lifecycle calls made against a [`SimulatedHost`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub opens: usize,
    pub closes: usize,
    pub enumerations: usize,
    pub outstanding_sets: usize,
    pub released_sets: usize,
    pub report_streams: usize,
}

type Properties = Arc<HashMap<PropertyKey, PropertyValue>>;

struct SimEntry {
    raw: DeviceRef,
    properties: Properties,
    attached: Arc<AtomicBool>,
    reports_tx: Sender<Vec<u8>>,
    reports_rx: Receiver<Vec<u8>>,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    enumerations: AtomicUsize,
    outstanding_sets: AtomicUsize,
    released_sets: AtomicUsize,
    report_streams: AtomicUsize,
}

struct Inner {
    layout: IdLayout,
    devices: Mutex<Vec<SimEntry>>,
    next_ref: AtomicU64,
    unavailable: AtomicBool,
    open_refused: AtomicBool,
    counters: Counters,
}

/// Scripted host. Clones share the same device set and counters.
#[derive(Clone)]
pub struct SimulatedHost {
    inner: Arc<Inner>,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    /// Host with packed ids (`id << 8 | tag`).
    pub fn new() -> Self {
        Self::with_layout(IdLayout::PACKED_TAG_BYTE)
    }

    pub fn with_layout(layout: IdLayout) -> Self {
        Self {
            inner: Arc::new(Inner {
                layout,
                devices: Mutex::new(Vec::new()),
                next_ref: AtomicU64::new(0),
                unavailable: AtomicBool::new(false),
                open_refused: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Attach a device; it appears in enumerations from now on, in attach order.
    pub fn attach(&self, device: SimDevice) -> DeviceRef {
        let n = self.inner.next_ref.fetch_add(1, Ordering::Relaxed);
        let raw = DeviceRef::from(NonZeroU64::MIN.saturating_add(n));
        let (reports_tx, reports_rx) = channel::unbounded();
        self.inner.devices.lock().push(SimEntry {
            raw,
            properties: Arc::new(device.into_properties(self.inner.layout)),
            attached: Arc::new(AtomicBool::new(true)),
            reports_tx,
            reports_rx,
        });
        raw
    }

    /// Detach a device. Open report streams for it start failing.
    pub fn detach(&self, raw: DeviceRef) {
        let mut devices = self.inner.devices.lock();
        if let Some(pos) = devices.iter().position(|e| e.raw == raw) {
            let entry = devices.remove(pos);
            entry.attached.store(false, Ordering::Release);
        }
    }

    /// Make the next opens fail as if the native library were missing.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Make the next opens fail with a non-success status.
    pub fn set_open_refused(&self, refused: bool) {
        self.inner.open_refused.store(refused, Ordering::Relaxed);
    }

    /// Handle for pushing input reports to an attached device.
    pub fn injector(&self, raw: DeviceRef) -> Option<ReportInjector> {
        let devices = self.inner.devices.lock();
        let entry = devices.iter().find(|e| e.raw == raw)?;
        Some(ReportInjector {
            tx: entry.reports_tx.clone(),
        })
    }

    pub fn stats(&self) -> SimStats {
        let c = &self.inner.counters;
        SimStats {
            opens: c.opens.load(Ordering::SeqCst),
            closes: c.closes.load(Ordering::SeqCst),
            enumerations: c.enumerations.load(Ordering::SeqCst),
            outstanding_sets: c.outstanding_sets.load(Ordering::SeqCst),
            released_sets: c.released_sets.load(Ordering::SeqCst),
            report_streams: c.report_streams.load(Ordering::SeqCst),
        }
    }
}

impl HidHost for SimulatedHost {
    fn open(&self, _options: &ManagerOptions) -> Result<Box<dyn HostSession>> {
        if self.inner.unavailable.load(Ordering::Relaxed) {
            return Err(Error::SubsystemUnavailable(
                "simulated HID library not loaded".into(),
            ));
        }
        if self.inner.open_refused.load(Ordering::Relaxed) {
            return Err(Error::OpenFailed("simulated open returned 0xE00002C5".into()));
        }
        self.inner.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimSession {
            inner: Arc::clone(&self.inner),
            criteria: Mutex::new(None),
            sets: Mutex::new(HashMap::new()),
            next_set: AtomicU64::new(1),
        }))
    }
}

struct SimSession {
    inner: Arc<Inner>,
    criteria: Mutex<Option<Vec<MatchCriteria>>>,
    /// Properties captured per outstanding set, answered until the set is released.
    sets: Mutex<HashMap<SetId, Vec<(DeviceRef, Properties)>>>,
    next_set: AtomicU64,
}

impl SimSession {
    fn number(&self, entry: &SimEntry, key: &PropertyKey) -> Option<i64> {
        entry.properties.get(key)?.as_number()
    }

    fn accepted(&self, entry: &SimEntry) -> bool {
        let layout = self.inner.layout;
        let id = |key| self.number(entry, &key).and_then(|raw| layout.decode(raw));
        let plain = |key| {
            self.number(entry, &key)
                .and_then(|raw| u16::try_from(raw).ok())
        };
        criteria_accept(
            self.criteria.lock().as_deref(),
            id(PropertyKey::VendorId),
            id(PropertyKey::ProductId),
            plain(PropertyKey::PrimaryUsagePage),
            plain(PropertyKey::PrimaryUsage),
        )
    }
}

impl HostSession for SimSession {
    fn set_matching(&self, criteria: Option<&[MatchCriteria]>) -> Result<()> {
        *self.criteria.lock() = criteria.map(<[MatchCriteria]>::to_vec);
        Ok(())
    }

    fn device_count(&self) -> Result<usize> {
        let devices = self.inner.devices.lock();
        Ok(devices.iter().filter(|e| self.accepted(e)).count())
    }

    fn copy_devices(&self) -> Result<DeviceSet> {
        self.inner.counters.enumerations.fetch_add(1, Ordering::SeqCst);
        let captured: Vec<(DeviceRef, Properties)> = self
            .inner
            .devices
            .lock()
            .iter()
            .filter(|e| self.accepted(e))
            .map(|e| (e.raw, Arc::clone(&e.properties)))
            .collect();
        let devices: Vec<DeviceRef> = captured.iter().map(|(raw, _)| *raw).collect();

        let id = SetId(self.next_set.fetch_add(1, Ordering::Relaxed));
        self.sets.lock().insert(id, captured);
        self.inner
            .counters
            .outstanding_sets
            .fetch_add(1, Ordering::SeqCst);
        Ok(DeviceSet { id, devices })
    }

    fn release_devices(&self, set: SetId) {
        if self.sets.lock().remove(&set).is_some() {
            let c = &self.inner.counters;
            c.outstanding_sets.fetch_sub(1, Ordering::SeqCst);
            c.released_sets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn property(&self, device: DeviceRef, key: &PropertyKey) -> Option<PropertyValue> {
        let sets = self.sets.lock();
        sets.values()
            .flatten()
            .find(|(raw, _)| *raw == device)?
            .1
            .get(key)
            .cloned()
    }

    fn id_layout(&self) -> IdLayout {
        self.inner.layout
    }

    fn open_reports(&self, device: DeviceRef) -> Result<Box<dyn ReportSource>> {
        let devices = self.inner.devices.lock();
        let entry = devices
            .iter()
            .find(|e| e.raw == device)
            .ok_or_else(|| Error::DeviceOpen {
                device,
                reason: "device detached".into(),
            })?;
        self.inner
            .counters
            .report_streams
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimReportSource {
            rx: entry.reports_rx.clone(),
            attached: Arc::clone(&entry.attached),
        }))
    }

    fn close(&self) {
        let leaked = self.sets.lock().len();
        debug!(leaked, "simulated session closed");
        self.inner.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pushes input reports to one simulated device.
#[derive(Clone)]
pub struct ReportInjector {
    tx: Sender<Vec<u8>>,
}

impl ReportInjector {
    /// Queue a report. Returns `false` if the device is gone.
    pub fn send(&self, report: &[u8]) -> bool {
        self.tx.send(report.to_vec()).is_ok()
    }
}

struct SimReportSource {
    rx: Receiver<Vec<u8>>,
    attached: Arc<AtomicBool>,
}

impl ReportSource for SimReportSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.attached.load(Ordering::Acquire) {
            return Err(Error::Read("device detached".into()));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(report) => {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Read("device detached".into())),
        }
    }
}
