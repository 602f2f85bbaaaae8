//! Session lifecycle, enumeration and report delivery against the simulated host.

use hidtap::backends::{DeviceSet, SetId};
use hidtap::{
    allocate_report_buffer, find_device, register_input_report_callback, subscribe, DeviceRef,
    Error, HidHost, HostSession, IdLayout, InputReport, Manager, ManagerOptions, MatchCriteria,
    PropertyKey, PropertyType, PropertyValue, RegistrationState, ReportSettings, ReportSource,
    SimDevice, SimulatedHost, UsagePage, DUALSHOCK4_PRODUCT_ID, SONY_VENDOR_ID,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn three_device_host() -> SimulatedHost {
    let host = SimulatedHost::new();
    host.attach(SimDevice::new(1356, 0x5C4).manufacturer("Sony"));
    host.attach(SimDevice::new(0x5AC, 1).manufacturer("Apple"));
    host.attach(SimDevice::new(1356, 2).manufacturer("Sony"));
    host
}

fn fast_settings() -> ReportSettings {
    ReportSettings {
        read_timeout: Duration::from_millis(5),
        ..ReportSettings::default()
    }
}

#[test]
fn find_returns_first_match_in_enumeration_order() {
    let host = three_device_host();
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();

    assert_eq!(devices.len(), 3);
    let pad = find_device(&devices, 1356, 0x5C4).unwrap();
    assert_eq!(pad.index(), 0);
    assert_eq!(pad.manufacturer().as_deref(), Some("Sony"));
    assert!(find_device(&devices, 9999, 1).is_none());
    assert!(matches!(
        devices.find_or_err(9999, 1),
        Err(Error::DeviceNotFound {
            vendor: 9999,
            product: 1
        })
    ));
}

#[test]
fn find_is_deterministic_with_duplicates() {
    let host = SimulatedHost::new();
    host.attach(SimDevice::new(0x5AC, 1));
    let first = host.attach(SimDevice::dualshock4().source_tag(1));
    host.attach(SimDevice::dualshock4().source_tag(2));

    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    for _ in 0..3 {
        let pad = devices.find(SONY_VENDOR_ID, DUALSHOCK4_PRODUCT_ID).unwrap();
        assert_eq!(pad.id(), first);
        assert_eq!(pad.index(), 1);
    }
}

#[test]
fn packed_ids_are_decoded() {
    let host = SimulatedHost::new();
    let raw = host.attach(SimDevice::dualshock4().source_tag(0x7F));
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let pad = devices.get(0).unwrap();

    assert_eq!(pad.id(), raw);
    assert_eq!(
        pad.get_property(&PropertyKey::VendorId, PropertyType::Number),
        Some(PropertyValue::Number(0x54C7F))
    );
    assert_eq!(pad.vendor_id(), Some(SONY_VENDOR_ID));
    assert_eq!(pad.product_id(), Some(DUALSHOCK4_PRODUCT_ID));
    assert_eq!(pad.usage_page(), Some(UsagePage::GenericDesktop));
    assert_eq!(pad.usage(), Some(0x05));
}

#[test]
fn plain_layout_hosts_match_unpacked_ids() {
    let host = SimulatedHost::with_layout(IdLayout::Plain);
    host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    assert!(devices.find(SONY_VENDOR_ID, DUALSHOCK4_PRODUCT_ID).is_some());
}

#[test]
fn wrong_typed_property_is_absent() {
    let host = SimulatedHost::new();
    host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let pad = devices.get(0).unwrap();

    assert_eq!(
        pad.get_property(&PropertyKey::Manufacturer, PropertyType::Number),
        None
    );
    assert_eq!(
        pad.get_property(&PropertyKey::Custom("BatteryLevel".into()), PropertyType::Number),
        None
    );
    assert!(matches!(
        pad.require_property(&PropertyKey::Manufacturer, PropertyType::Boolean),
        Err(Error::PropertyAbsentOrWrongType { .. })
    ));
}

#[test]
fn device_without_vendor_id_does_not_stop_the_scan() {
    let host = SimulatedHost::new();
    host.attach(SimDevice::new(1356, 0x5C4).without_vendor_id());
    host.attach(SimDevice::new(0x5AC, 1));
    host.attach(SimDevice::dualshock4());

    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    assert_eq!(devices.get(0).unwrap().vendor_id(), None);
    let pad = devices.find(1356, 0x5C4).unwrap();
    assert_eq!(pad.index(), 2);
    assert_eq!(devices.metadata()[0].vid, None);
}

#[test]
fn snapshot_size_equals_device_count() {
    let host = three_device_host();
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    assert_eq!(devices.len(), manager.device_count().unwrap());
}

#[test]
fn snapshot_is_immutable_after_attach() {
    let host = three_device_host();
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    host.attach(SimDevice::dualshock4());
    assert_eq!(devices.len(), 3);
    devices.release();
    assert_eq!(manager.enumerate().unwrap().len(), 4);
}

#[test]
fn snapshot_is_immutable_after_detach() {
    let host = SimulatedHost::new();
    let first = host.attach(SimDevice::new(1356, 0x5C4).manufacturer("Sony"));
    host.attach(SimDevice::new(0x5AC, 1).manufacturer("Apple"));
    host.attach(SimDevice::new(1356, 2).manufacturer("Sony"));

    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    assert_eq!(devices.find(1356, 0x5C4).map(|d| d.index()), Some(0));

    host.detach(first);
    assert_eq!(devices.len(), 3);
    assert_eq!(devices.find(1356, 0x5C4).map(|d| d.index()), Some(0));
    assert_eq!(devices.get(0).unwrap().manufacturer().as_deref(), Some("Sony"));
    devices.release();

    let fresh = manager.enumerate().unwrap();
    assert_eq!(fresh.len(), 2);
    assert!(fresh.find(1356, 0x5C4).is_none());
}

/// Host whose sessions copy device sets fine but cannot count them.
struct UncountableHost(SimulatedHost);

struct UncountableSession(Box<dyn HostSession>);

impl HidHost for UncountableHost {
    fn open(&self, options: &ManagerOptions) -> hidtap::Result<Box<dyn HostSession>> {
        Ok(Box::new(UncountableSession(self.0.open(options)?)))
    }
}

impl HostSession for UncountableSession {
    fn set_matching(&self, criteria: Option<&[MatchCriteria]>) -> hidtap::Result<()> {
        self.0.set_matching(criteria)
    }

    fn device_count(&self) -> hidtap::Result<usize> {
        Err(Error::Enumeration("count unavailable".into()))
    }

    fn copy_devices(&self) -> hidtap::Result<DeviceSet> {
        self.0.copy_devices()
    }

    fn release_devices(&self, set: SetId) {
        self.0.release_devices(set)
    }

    fn property(&self, device: DeviceRef, key: &PropertyKey) -> Option<PropertyValue> {
        self.0.property(device, key)
    }

    fn id_layout(&self) -> IdLayout {
        self.0.id_layout()
    }

    fn open_reports(&self, device: DeviceRef) -> hidtap::Result<Box<dyn ReportSource>> {
        self.0.open_reports(device)
    }

    fn close(&self) {
        self.0.close()
    }
}

#[test]
fn failed_enumeration_still_releases_the_copied_set() {
    let sim = three_device_host();
    let host = UncountableHost(sim.clone());
    {
        let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
        assert!(matches!(manager.enumerate(), Err(Error::Enumeration(_))));
        let stats = sim.stats();
        assert_eq!(stats.enumerations, 1);
        assert_eq!(stats.outstanding_sets, 0);
        assert_eq!(stats.released_sets, 1);
    }
    assert_eq!(sim.stats().closes, 1);
}

#[test]
fn matching_restricts_enumeration() {
    let host = SimulatedHost::new();
    host.attach(SimDevice::new(0x5AC, 1).usage(0x01, 0x06));
    host.attach(SimDevice::dualshock4());

    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    manager
        .set_matching(Some(&[MatchCriteria::usage(0x01, 0x05)]))
        .unwrap();
    let devices = manager.enumerate().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(manager.device_count().unwrap(), 1);
    assert!(devices.find(SONY_VENDOR_ID, DUALSHOCK4_PRODUCT_ID).is_some());
    devices.release();

    manager.set_matching(None).unwrap();
    assert_eq!(manager.enumerate().unwrap().len(), 2);
}

#[test]
fn empty_host_enumerates_nothing() {
    let host = SimulatedHost::new();
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    assert!(devices.is_empty());
    assert!(devices.find(SONY_VENDOR_ID, DUALSHOCK4_PRODUCT_ID).is_none());
}

#[test]
fn refused_open_never_enumerates() {
    let host = three_device_host();
    host.set_open_refused(true);
    let err = Manager::open(&host, &ManagerOptions::default()).unwrap_err();
    assert!(matches!(err, Error::OpenFailed(_)));
    assert_eq!(host.stats().enumerations, 0);
    assert_eq!(host.stats().opens, 0);
}

#[test]
fn missing_subsystem_is_reported() {
    let host = SimulatedHost::new();
    host.set_unavailable(true);
    let host: &dyn HidHost = &host;
    assert!(matches!(
        Manager::open(host, &ManagerOptions::default()),
        Err(Error::SubsystemUnavailable(_))
    ));
}

#[test]
fn every_set_is_released_and_session_closed_once() {
    let host = three_device_host();
    {
        let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
        let first = manager.enumerate().unwrap();
        first.release();
        let _second = manager.enumerate().unwrap();
        assert_eq!(host.stats().outstanding_sets, 1);
    }
    let stats = host.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.enumerations, 2);
    assert_eq!(stats.released_sets, 2);
    assert_eq!(stats.outstanding_sets, 0);

    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    manager.close();
    assert_eq!(host.stats().closes, 2);
}

#[test]
fn fresh_buffer_is_64_zero_bytes() {
    let buffer = allocate_report_buffer(64).unwrap();
    assert_eq!(buffer.len(), 64);
    assert_eq!(buffer.to_vec(), vec![0u8; 64]);
}

#[test]
fn registering_an_absent_device_is_a_no_op() {
    let host = three_device_host();
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let buffer = allocate_report_buffer(64).unwrap();

    let registration = register_input_report_callback(
        devices.find(9999, 1),
        &buffer,
        &ReportSettings::default(),
        |_report: &InputReport<'_>| {},
    )
    .unwrap();
    assert!(registration.is_none());
    assert_eq!(host.stats().report_streams, 0);
    assert_eq!(manager.active_registrations(), 0);
}

#[test]
fn callback_sees_reports_and_buffer_tracks_latest() {
    let host = SimulatedHost::new();
    let raw = host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let buffer = allocate_report_buffer(64).unwrap();

    let (tx, rx) = mpsc::channel();
    let registration = register_input_report_callback(
        devices.find(SONY_VENDOR_ID, DUALSHOCK4_PRODUCT_ID),
        &buffer,
        &fast_settings(),
        move |report: &InputReport<'_>| {
            let _ = tx.send((report.device, report.data.to_vec(), report.sequence));
        },
    )
    .unwrap()
    .unwrap();
    assert_eq!(registration.state(), RegistrationState::Registered);
    assert_eq!(registration.device(), raw);

    let injector = host.injector(raw).unwrap();
    assert!(injector.send(&[0x01, 0x80, 0x7F]));
    assert!(injector.send(&[0x01, 0x00]));

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), (raw, vec![0x01, 0x80, 0x7F], 1));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), (raw, vec![0x01, 0x00], 2));
    assert_eq!(buffer.latest(), Some(vec![0x01, 0x00]));
    assert_eq!(buffer.sequence(), 2);
    assert_eq!(registration.buffer().sequence(), 2);

    registration.unregister();
    assert!(injector.send(&[0xFF]));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn subscription_delivers_in_order() {
    let host = SimulatedHost::new();
    let raw = host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let buffer = allocate_report_buffer(64).unwrap();

    let subscription = subscribe(devices.get(0), &buffer, &fast_settings())
        .unwrap()
        .unwrap();
    let injector = host.injector(raw).unwrap();
    for i in 0..10u8 {
        assert!(injector.send(&[0x01, i]));
    }

    let received: Vec<u8> = (0..10)
        .map(|_| subscription.recv_timeout(WAIT).unwrap().data[1])
        .collect();
    assert_eq!(received, (0..10).collect::<Vec<_>>());
    assert_eq!(subscription.dropped(), 0);
    assert_eq!(host.stats().report_streams, 1);
    subscription.unregister();
    assert_eq!(manager.active_registrations(), 0);
}

#[test]
fn full_channel_drops_instead_of_blocking() {
    let host = SimulatedHost::new();
    let raw = host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let buffer = allocate_report_buffer(8).unwrap();
    let settings = ReportSettings {
        channel_capacity: 2,
        ..fast_settings()
    };

    let subscription = subscribe(devices.get(0), &buffer, &settings)
        .unwrap()
        .unwrap();
    let injector = host.injector(raw).unwrap();
    for i in 0..5u8 {
        assert!(injector.send(&[i]));
    }

    let deadline = std::time::Instant::now() + WAIT;
    while subscription.dropped() < 3 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(subscription.dropped(), 3);
    assert_eq!(buffer.sequence(), 5);
    let kept: Vec<u8> = subscription.drain().iter().map(|r| r.data[0]).collect();
    assert_eq!(kept, vec![0, 1]);
}

#[test]
fn second_registration_for_a_device_is_rejected() {
    let host = SimulatedHost::new();
    host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let buffer = allocate_report_buffer(64).unwrap();

    let first = subscribe(devices.get(0), &buffer, &fast_settings())
        .unwrap()
        .unwrap();
    assert!(matches!(
        subscribe(devices.get(0), &buffer, &fast_settings()),
        Err(Error::AlreadyRegistered(_))
    ));
    assert_eq!(manager.active_registrations(), 1);

    drop(first);
    assert!(subscribe(devices.get(0), &buffer, &fast_settings())
        .unwrap()
        .is_some());
}

#[test]
fn detaching_ends_delivery() {
    let host = SimulatedHost::new();
    let raw = host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let buffer = allocate_report_buffer(64).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registration = register_input_report_callback(
        devices.get(0),
        &buffer,
        &fast_settings(),
        move |_report: &InputReport<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    )
    .unwrap()
    .unwrap();

    host.detach(raw);
    let deadline = std::time::Instant::now() + WAIT;
    while registration.is_delivering() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!registration.is_delivering());
    assert_eq!(registration.state(), RegistrationState::Registered);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    registration.unregister();
}

#[test]
fn closing_the_manager_stops_delivery() {
    let host = SimulatedHost::new();
    let raw = host.attach(SimDevice::dualshock4());
    let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
    let devices = manager.enumerate().unwrap();
    let buffer = allocate_report_buffer(64).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registration = register_input_report_callback(
        devices.get(0),
        &buffer,
        &fast_settings(),
        move |_report: &InputReport<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    )
    .unwrap()
    .unwrap();

    let injector = host.injector(raw).unwrap();
    assert!(injector.send(&[0x01]));
    let deadline = std::time::Instant::now() + WAIT;
    while calls.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    devices.release();
    manager.close();
    assert_eq!(host.stats().closes, 1);
    assert_eq!(registration.state(), RegistrationState::Unregistered);
    assert!(!registration.is_delivering());

    assert!(injector.send(&[0x02]));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(buffer.sequence(), 1);
    registration.unregister();
}

#[test]
fn dropping_the_manager_stops_delivery() {
    let host = SimulatedHost::new();
    host.attach(SimDevice::dualshock4());
    let buffer = allocate_report_buffer(64).unwrap();

    let subscription = {
        let manager = Manager::open(&host, &ManagerOptions::default()).unwrap();
        let devices = manager.enumerate().unwrap();
        let subscription = subscribe(devices.get(0), &buffer, &fast_settings())
            .unwrap()
            .unwrap();
        subscription
    };
    assert_eq!(host.stats().closes, 1);
    assert_eq!(
        subscription.registration().state(),
        RegistrationState::Unregistered
    );
    assert!(subscription.recv_timeout(Duration::from_millis(20)).is_none());
}
