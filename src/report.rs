//! Input report delivery.
//!
//! [`register_input_report_callback`] arms delivery for one device: a dedicated
//! delivery thread (the host's event context) reads reports into the shared
//! [`ReportBuffer`] and invokes the callback with a read-only [`InputReport`].
//! [`subscribe`] builds on it and hands each report to a single consumer through a
//! bounded channel, so application code never runs on the delivery thread.
//!
//! ## Callback contract
//! - The report bytes are borrowed for the duration of the call only.
//! - Calls happen on the delivery thread, at whatever rate the device produces.
//! - Return promptly; blocking stalls delivery for that device.
//!
//! ## Lifecycle
//! Registration moves `Unregistered → Registered`. [`ReportRegistration::unregister`]
//! (or dropping the registration) stops the thread and joins it, after which the
//! callback is never invoked again. Closing the manager does the same for every
//! registration made through it. At most one registration per device is active.

use crate::backends::ReportSource;
use crate::device::{DeviceHandle, DeviceRef};
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Input report size for the Dualshock4 over USB.
pub const DEFAULT_REPORT_SIZE: usize = 64;

struct BufferState {
    bytes: Box<[u8]>,
    /// Length of the last report written, 0 before the first.
    filled: usize,
    sequence: u64,
}

/// Fixed-length buffer holding the latest input report of one registration.
///
/// The delivery thread is the only writer; readers copy out under the lock.
/// Clones share the same storage.
#[derive(Clone)]
pub struct ReportBuffer {
    state: Arc<Mutex<BufferState>>,
}

impl ReportBuffer {
    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the whole buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.state.lock().bytes.to_vec()
    }

    /// Copy of the most recent report, `None` before the first one.
    pub fn latest(&self) -> Option<Vec<u8>> {
        let state = self.state.lock();
        (state.sequence > 0).then(|| state.bytes[..state.filled].to_vec())
    }

    /// Number of reports written so far.
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    /// Store `report`, truncated to the buffer length. Returns its sequence number.
    fn publish(&self, report: &[u8]) -> u64 {
        let mut state = self.state.lock();
        let n = report.len().min(state.bytes.len());
        state.bytes[..n].copy_from_slice(&report[..n]);
        state.filled = n;
        state.sequence += 1;
        state.sequence
    }
}

impl std::fmt::Debug for ReportBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReportBuffer")
            .field("len", &state.bytes.len())
            .field("filled", &state.filled)
            .field("sequence", &state.sequence)
            .finish()
    }
}

/// Allocate a zeroed report buffer of `size` bytes.
pub fn allocate_report_buffer(size: usize) -> Result<ReportBuffer> {
    if size == 0 {
        return Err(Error::InvalidBufferSize(size));
    }
    Ok(ReportBuffer {
        state: Arc::new(Mutex::new(BufferState {
            bytes: vec![0u8; size].into_boxed_slice(),
            filled: 0,
            sequence: 0,
        })),
    })
}

/// One delivered report, borrowed for the duration of a callback.
#[derive(Clone, Copy, Debug)]
pub struct InputReport<'a> {
    pub device: DeviceRef,
    pub data: &'a [u8],
    /// Position of this report in the registration's stream, starting at 1.
    pub sequence: u64,
}

impl InputReport<'_> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_owned_report(&self) -> OwnedReport {
        OwnedReport {
            device: self.device,
            data: self.data.to_vec(),
            sequence: self.sequence,
            at: Instant::now(),
        }
    }
}

/// A report handed across the subscription channel.
#[derive(Clone, Debug)]
pub struct OwnedReport {
    pub device: DeviceRef,
    pub data: Vec<u8>,
    pub sequence: u64,
    /// Capture time (monotonic).
    pub at: Instant,
}

/// Delivery tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportSettings {
    /// Upper bound on one blocking read; also how quickly unregistering takes effect.
    pub read_timeout: Duration,
    /// Subscription channel capacity. Reports beyond it are dropped, not queued.
    pub channel_capacity: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            channel_capacity: 256,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
}

/// Control block of one delivery thread, shared by its registration and the
/// manager's registration table.
struct Delivery {
    device: DeviceRef,
    shutdown: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Delivery {
    fn new(device: DeviceRef) -> Self {
        Self {
            device,
            shutdown: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    fn is_armed(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    /// Signal the thread and join it. Later calls are no-ops.
    fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        // Stopped from inside the callback: the loop sees the flag when it returns.
        if worker.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!(device = %self.device, "report callback panicked");
        }
        debug!(device = %self.device, "report delivery stopped");
    }
}

/// Devices with an active registration in one manager session.
#[derive(Clone, Default)]
pub(crate) struct RegistrationTable(Arc<Mutex<HashMap<DeviceRef, Arc<Delivery>>>>);

impl RegistrationTable {
    fn claim(&self, device: DeviceRef) -> Option<Claim> {
        let mut active = self.0.lock();
        if active.contains_key(&device) {
            return None;
        }
        let delivery = Arc::new(Delivery::new(device));
        active.insert(device, Arc::clone(&delivery));
        Some(Claim {
            table: self.clone(),
            delivery,
        })
    }

    pub(crate) fn active(&self) -> usize {
        self.0.lock().len()
    }

    /// Stop and join every delivery thread of the session. Returns how many there were.
    pub(crate) fn stop_all(&self) -> usize {
        let deliveries: Vec<Arc<Delivery>> = self.0.lock().drain().map(|(_, d)| d).collect();
        for delivery in &deliveries {
            delivery.stop();
        }
        deliveries.len()
    }
}

struct Claim {
    table: RegistrationTable,
    delivery: Arc<Delivery>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut active = self.table.0.lock();
        let ours = active
            .get(&self.delivery.device)
            .is_some_and(|d| Arc::ptr_eq(d, &self.delivery));
        if ours {
            active.remove(&self.delivery.device);
        }
    }
}

/// An armed report registration. Dropping it unregisters.
///
/// Closing the [`Manager`](crate::manager::Manager) it was registered through also stops
/// delivery; the registration then reports [`RegistrationState::Unregistered`].
pub struct ReportRegistration {
    buffer: ReportBuffer,
    claim: Claim,
}

impl ReportRegistration {
    pub fn device(&self) -> DeviceRef {
        self.claim.delivery.device
    }

    /// The buffer reports are written into.
    pub fn buffer(&self) -> &ReportBuffer {
        &self.buffer
    }

    pub fn state(&self) -> RegistrationState {
        if self.claim.delivery.is_armed() {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        }
    }

    /// `false` once the delivery thread has stopped on its own (device gone, read error).
    pub fn is_delivering(&self) -> bool {
        self.claim.delivery.is_running()
    }

    /// Stop delivery and wait for the delivery thread to exit.
    pub fn unregister(self) {
        drop(self);
    }
}

impl Drop for ReportRegistration {
    fn drop(&mut self) {
        self.claim.delivery.stop();
    }
}

impl std::fmt::Debug for ReportRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRegistration")
            .field("device", &self.device())
            .field("state", &self.state())
            .finish()
    }
}

/// Arm `callback` for input reports from `device`.
///
/// Returns `Ok(None)` without touching the host when `device` is `None`, so the result
/// of a failed lookup can be passed straight through.
pub fn register_input_report_callback<F>(
    device: Option<DeviceHandle<'_>>,
    buffer: &ReportBuffer,
    settings: &ReportSettings,
    callback: F,
) -> Result<Option<ReportRegistration>>
where
    F: FnMut(&InputReport<'_>) + Send + 'static,
{
    let Some(device) = device else {
        debug!("no device to register reports for");
        return Ok(None);
    };
    let id = device.id();
    let claim = device
        .registrations()
        .claim(id)
        .ok_or(Error::AlreadyRegistered(id))?;

    let source = device.open_reports()?;
    let worker = {
        let buffer = buffer.clone();
        let delivery = Arc::clone(&claim.delivery);
        let timeout = settings.read_timeout;
        std::thread::Builder::new()
            .name(format!("hid-report-{}", id.get()))
            .spawn(move || run_delivery_loop(source, delivery, buffer, timeout, callback))
            .map_err(Error::Thread)?
    };
    *claim.delivery.worker.lock() = Some(worker);

    debug!(device = %id, len = buffer.len(), "report callback registered");
    Ok(Some(ReportRegistration {
        buffer: buffer.clone(),
        claim,
    }))
}

fn run_delivery_loop<F>(
    mut source: Box<dyn ReportSource>,
    delivery: Arc<Delivery>,
    buffer: ReportBuffer,
    timeout: Duration,
    mut callback: F,
) where
    F: FnMut(&InputReport<'_>),
{
    let device = delivery.device;
    debug!(%device, "report delivery started");
    let mut scratch = vec![0u8; buffer.len()];

    while !delivery.shutdown.load(Ordering::Acquire) {
        match source.read(&mut scratch, timeout) {
            Ok(0) => {}
            Ok(n) => {
                let data = &scratch[..n.min(scratch.len())];
                let sequence = buffer.publish(data);
                callback(&InputReport {
                    device,
                    data,
                    sequence,
                });
            }
            Err(e) => {
                warn!(%device, error = %e, "report delivery stopped");
                break;
            }
        }
    }

    debug!(%device, "report delivery exiting");
}

/// A registration whose reports arrive on a channel.
pub struct ReportSubscription {
    registration: ReportRegistration,
    reports: Receiver<OwnedReport>,
    dropped: Arc<AtomicU64>,
}

impl ReportSubscription {
    pub fn registration(&self) -> &ReportRegistration {
        &self.registration
    }

    /// Wait up to `timeout` for the next report. `None` on timeout or once delivery ended.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<OwnedReport> {
        match self.reports.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<OwnedReport> {
        match self.reports.try_recv() {
            Ok(report) => Some(report),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drain everything queued right now.
    pub fn drain(&self) -> Vec<OwnedReport> {
        self.reports.try_iter().collect()
    }

    /// Reports discarded because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn unregister(self) {
        self.registration.unregister();
    }
}

/// Arm delivery for `device` and receive its reports on a bounded channel.
///
/// Like [`register_input_report_callback`], an absent device yields `Ok(None)`.
pub fn subscribe(
    device: Option<DeviceHandle<'_>>,
    buffer: &ReportBuffer,
    settings: &ReportSettings,
) -> Result<Option<ReportSubscription>> {
    let (tx, rx) = channel::bounded(settings.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    let counter = Arc::clone(&dropped);
    let forward = move |report: &InputReport<'_>| match tx.try_send(report.to_owned_report()) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            let total = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if total == 1 || total % 1000 == 0 {
                warn!(device = %report.device, total, "report channel full, dropping reports");
            }
        }
        Err(TrySendError::Disconnected(_)) => {}
    };

    let registration = register_input_report_callback(device, buffer, settings, forward)?;
    Ok(registration.map(|registration| ReportSubscription {
        registration,
        reports: rx,
        dropped,
    }))
}
