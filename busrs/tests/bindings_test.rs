//! Service bindings driven through a scripted bus.

mod common;

use std::sync::{Arc, Mutex};

use busrs::services::{bluez as bz, connman as cm, nm as netman};
use busrs::types::constants::{bluez, connman, device_state, device_type, freedesktop, nm};
use busrs::{Argument, BusError, Completion, SessionConfig, Value, ValueKind};
use common::{bring_up, dict, paths, properties, reply, session, signal};

const SERVICE: &str = "/net/connman/service/wifi_home_managed_psk";

type Outcomes = Arc<Mutex<Vec<busrs::Result<Vec<Value>>>>>;

fn capture() -> (Outcomes, Completion) {
    let outcomes = Outcomes::default();
    let sink = outcomes.clone();
    (
        outcomes,
        Box::new(move |result| sink.lock().unwrap().push(result)),
    )
}

#[test]
fn test_connman_service_reads_and_calls() {
    let (mut session, bus, _events) = session(SessionConfig::connman());
    bring_up(&mut session, &bus, ":1.3");

    let (sync, _) = bus.last_call("/", "GetProperties");
    session.dispatch(properties(
        sync,
        &[("Services", paths(&[SERVICE])), ("Technologies", paths(&[]))],
    ));
    let (sync, call) = bus.last_call(SERVICE, "GetProperties");
    assert_eq!(call.interface, connman::SERVICE_INTERFACE);
    session.dispatch(properties(
        sync,
        &[
            ("Name", Value::from("home")),
            ("State", Value::from("idle")),
            ("Strength", Value::Byte(72)),
            ("PassphraseRequired", Value::Bool(true)),
            ("IPv4.Method", Value::from("dhcp")),
        ],
    ));

    let service = cm::Service::get(&session, SERVICE).unwrap();
    assert_eq!(service.name(&session).unwrap(), "home");
    assert_eq!(service.state(&session).unwrap(), "idle");
    assert_eq!(service.strength(&session).unwrap(), 72);
    assert!(service.passphrase_required(&session).unwrap());
    assert_eq!(service.ipv4_method(&session).unwrap(), "dhcp");
    assert!(matches!(
        service.error(&session),
        Err(BusError::NotFound(_))
    ));

    service
        .set_passphrase(&mut session, "hunter22", None)
        .unwrap();
    let (_, call) = bus.last_call(SERVICE, "SetProperty");
    assert_eq!(
        call.args[1],
        Argument::variant(Value::from("hunter22"), ValueKind::Str)
    );

    service.connect(&mut session, None).unwrap();
    assert!(matches!(
        service.connect(&mut session, None),
        Err(BusError::AlreadyPending { .. })
    ));
    // Different call kinds do not block each other.
    service.disconnect(&mut session, None).unwrap();
    assert!(session.is_pending(SERVICE, cm::CONNECT));
    assert!(session.is_pending(SERVICE, cm::DISCONNECT));

    service
        .move_before(&mut session, "/net/connman/service/ethernet", None)
        .unwrap();
    let (_, call) = bus.last_call(SERVICE, "MoveBefore");
    assert_eq!(
        call.args,
        vec![Argument::object_path("/net/connman/service/ethernet")]
    );

    let (connect, _) = bus.last_call(SERVICE, "Connect");
    session.dispatch(reply(connect, Vec::new()));
    assert!(!session.is_pending(SERVICE, cm::CONNECT));
}

#[test]
fn test_binding_rejects_wrong_element() {
    let (mut session, bus, _events) = session(SessionConfig::connman());
    bring_up(&mut session, &bus, ":1.3");

    assert!(matches!(
        cm::Service::get(&session, "/"),
        Err(BusError::TypeMismatch { .. })
    ));
    assert!(matches!(
        cm::Service::get(&session, SERVICE),
        Err(BusError::StaleReference(_))
    ));
}

#[test]
fn test_bluez_discovery_reports_found_devices() {
    let (mut session, bus, events) = session(SessionConfig::bluez());
    bring_up(&mut session, &bus, ":1.42");
    let hci0 = "/org/bluez/hci0";

    let (sync, _) = bus.last_call("/", "GetProperties");
    session.dispatch(properties(sync, &[("Adapters", paths(&[hci0]))]));
    let (sync, _) = bus.last_call(hci0, "GetProperties");
    session.dispatch(properties(
        sync,
        &[
            ("Address", Value::from("00:AA:BB:CC:DD:EE")),
            ("Powered", Value::Bool(true)),
            ("Devices", paths(&[])),
        ],
    ));

    let manager = bz::Manager::get(&session).unwrap();
    assert_eq!(manager.adapters(&session).unwrap().len(), 1);

    let adapter = bz::Adapter::get(&session, hci0).unwrap();
    assert!(adapter.powered(&session).unwrap());
    adapter.start_discovery(&mut session, None).unwrap();
    let (_, call) = bus.last_call(hci0, "StartDiscovery");
    assert_eq!(call.interface, bluez::ADAPTER_INTERFACE);

    events.lock().unwrap().clear();
    let found = bus.subscription(hci0, bluez::DEVICE_FOUND);
    session.dispatch(signal(
        found,
        hci0,
        bluez::DEVICE_FOUND,
        vec![
            Value::from("00:11:22:33:44:55"),
            Value::Dict(dict(&[
                ("Alias", Value::from("headset")),
                ("RSSI", Value::Int16(-48)),
                ("Class", Value::UInt32(0x240404)),
            ])),
        ],
    ));

    let recorded = events.lock().unwrap();
    let device = bz::DeviceFound::from_event(&recorded[0]).unwrap();
    assert_eq!(device.adapter, hci0);
    assert_eq!(device.address, "00:11:22:33:44:55");
    assert_eq!(device.alias().as_deref(), Some("headset"));
    assert_eq!(device.rssi(), Some(-48));
    assert_eq!(device.class(), Some(0x240404));
    assert_eq!(device.paired(), None);
}

#[test]
fn test_bluez_agent_registration_defaults_capability() {
    let (mut session, bus, _events) = session(SessionConfig::bluez());
    bring_up(&mut session, &bus, ":1.42");
    let hci0 = "/org/bluez/hci0";
    let (sync, _) = bus.last_call("/", "GetProperties");
    session.dispatch(properties(sync, &[("Adapters", paths(&[hci0]))]));

    let adapter = bz::Adapter::get(&session, hci0).unwrap();
    adapter
        .register_agent(&mut session, "/test/agent", None, None)
        .unwrap();
    let (_, call) = bus.last_call(hci0, "RegisterAgent");
    assert_eq!(
        call.args,
        vec![
            Argument::object_path("/test/agent"),
            Argument::new(bluez::DEFAULT_AGENT_CAPABILITY),
        ]
    );
}

#[test]
fn test_nm_device_calls_use_their_interfaces() {
    let (mut session, bus, _events) = session(SessionConfig::network_manager());
    bring_up(&mut session, &bus, ":1.5");
    let wlan = "/org/freedesktop/NetworkManager/Devices/3";

    let (sync, _) = bus.last_call(nm::PATH, freedesktop::GET_ALL);
    session.dispatch(properties(
        sync,
        &[
            ("Devices", paths(&[wlan])),
            ("WirelessEnabled", Value::Bool(true)),
        ],
    ));
    let (sync, call) = bus.last_call(wlan, freedesktop::GET_ALL);
    assert_eq!(call.args, vec![Argument::new(nm::DEVICE_INTERFACE)]);
    session.dispatch(properties(
        sync,
        &[
            ("Interface", Value::from("wlan0")),
            ("State", Value::UInt32(100)),
            ("Capabilities", Value::UInt32(0x3)),
        ],
    ));

    let manager = netman::Manager::get(&session).unwrap();
    assert!(manager.wireless_enabled(&session).unwrap());

    let device = netman::Device::get(&session, wlan).unwrap();
    assert_eq!(device.interface(&session).unwrap(), "wlan0");
    assert!(device.is_activated(&session).unwrap());
    assert_eq!(
        device.capabilities(&session).unwrap(),
        netman::DeviceCapabilities::NM_SUPPORTED | netman::DeviceCapabilities::CARRIER_DETECT
    );

    let (outcomes, completion) = capture();
    device.get_access_points(&mut session, completion).unwrap();
    let (call_id, call) = bus.last_call(wlan, "GetAccessPoints");
    assert_eq!(call.interface, nm::WIRELESS_INTERFACE);
    session.dispatch(reply(
        call_id,
        vec![paths(&[
            "/org/freedesktop/NetworkManager/AccessPoint/1",
            "/org/freedesktop/NetworkManager/AccessPoint/2",
        ])],
    ));

    let outcomes = outcomes.lock().unwrap();
    let args = outcomes[0].as_ref().unwrap();
    let access_points = netman::access_points_from_reply(args).unwrap();
    assert_eq!(access_points.len(), 2);
    assert_eq!(
        access_points[1].as_str(),
        "/org/freedesktop/NetworkManager/AccessPoint/2"
    );
}

#[test]
fn test_nm_settings_connection_forwards_updates() {
    let (mut session, bus, events) = session(SessionConfig::network_manager());
    bring_up(&mut session, &bus, ":1.5");
    let profile = "/org/freedesktop/NetworkManager/Settings/7";

    let connection = netman::SettingsConnection::track(&mut session, profile).unwrap();
    assert_eq!(connection.path(), profile);

    events.lock().unwrap().clear();
    let updated = bus.subscription(profile, netman::UPDATED);
    session.dispatch(signal(updated, profile, netman::UPDATED, Vec::new()));
    assert_eq!(events.lock().unwrap().len(), 1);

    let (outcomes, completion) = capture();
    connection.get_settings(&mut session, completion).unwrap();
    let (call_id, _) = bus.last_call(profile, "GetSettings");
    session.dispatch(reply(
        call_id,
        vec![Value::Dict(dict(&[(
            "connection",
            Value::Dict(dict(&[("id", Value::from("home"))])),
        )]))],
    ));

    let outcomes = outcomes.lock().unwrap();
    let settings = netman::settings_from_reply(outcomes[0].as_ref().unwrap().clone()).unwrap();
    assert_eq!(
        settings["connection"].get("id"),
        Some(&Value::from("home"))
    );
}

#[test]
fn test_nm_device_and_manager_forward_state_signals() {
    let (mut session, bus, events) = session(SessionConfig::network_manager());
    bring_up(&mut session, &bus, ":1.5");
    let wlan = "/org/freedesktop/NetworkManager/Devices/3";
    let eth = "/org/freedesktop/NetworkManager/Devices/1";
    let ap = "/org/freedesktop/NetworkManager/AccessPoint/4";

    let (sync, _) = bus.last_call(nm::PATH, freedesktop::GET_ALL);
    session.dispatch(properties(sync, &[("Devices", paths(&[wlan, eth]))]));
    for (path, kind) in [(wlan, device_type::WIFI), (eth, device_type::ETHERNET)] {
        let (sync, _) = bus.last_call(path, freedesktop::GET_ALL);
        session.dispatch(properties(
            sync,
            &[
                ("DeviceType", Value::UInt32(kind)),
                ("State", Value::UInt32(device_state::DISCONNECTED)),
            ],
        ));
    }

    netman::Manager::get(&session).unwrap().track(&mut session).unwrap();
    netman::Device::get(&session, wlan).unwrap().track(&mut session).unwrap();
    netman::Device::get(&session, eth).unwrap().track(&mut session).unwrap();

    let wired_ap_signals = bus
        .active_subscriptions()
        .into_iter()
        .filter(|(_, rule)| rule.path == eth && rule.interface == nm::WIRELESS_INTERFACE)
        .count();
    assert_eq!(wired_ap_signals, 0);

    events.lock().unwrap().clear();
    let state = bus.subscription(wlan, nm::STATE_CHANGED);
    session.dispatch(signal(
        state,
        wlan,
        nm::STATE_CHANGED,
        vec![
            Value::UInt32(device_state::ACTIVATED),
            Value::UInt32(device_state::IP_CHECK),
            Value::UInt32(0),
        ],
    ));
    let added = bus.subscription(wlan, nm::ACCESS_POINT_ADDED);
    session.dispatch(signal(
        added,
        wlan,
        nm::ACCESS_POINT_ADDED,
        vec![Value::ObjectPath(ap.into())],
    ));
    let removed = bus.subscription(wlan, nm::ACCESS_POINT_REMOVED);
    session.dispatch(signal(
        removed,
        wlan,
        nm::ACCESS_POINT_REMOVED,
        vec![Value::ObjectPath(ap.into())],
    ));
    let overall = bus.subscription(nm::PATH, nm::STATE_CHANGED);
    session.dispatch(signal(overall, nm::PATH, nm::STATE_CHANGED, vec![Value::UInt32(70)]));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4);

    let change = netman::DeviceStateChange::from_event(&events[0]).unwrap();
    assert_eq!(
        change,
        netman::DeviceStateChange {
            device: wlan.to_string(),
            new_state: device_state::ACTIVATED,
            old_state: device_state::IP_CHECK,
            reason: 0,
        }
    );
    assert!(change.is_activated());

    let appeared = netman::AccessPointChange::from_event(&events[1]).unwrap();
    assert!(appeared.added);
    assert_eq!(appeared.access_point, ap);
    let vanished = netman::AccessPointChange::from_event(&events[2]).unwrap();
    assert!(!vanished.added);

    assert_eq!(
        netman::ManagerStateChange::from_event(&events[3]),
        Some(netman::ManagerStateChange { state: 70 })
    );
}

#[test]
fn test_nm_device_track_needs_synced_type() {
    let (mut session, bus, _events) = session(SessionConfig::network_manager());
    bring_up(&mut session, &bus, ":1.5");
    let wlan = "/org/freedesktop/NetworkManager/Devices/3";

    let (sync, _) = bus.last_call(nm::PATH, freedesktop::GET_ALL);
    session.dispatch(properties(sync, &[("Devices", paths(&[wlan]))]));

    let device = netman::Device::get(&session, wlan).unwrap();
    assert!(matches!(
        device.track(&mut session),
        Err(BusError::NotFound(key)) if key == "DeviceType"
    ));
    assert!(bus.active_subscriptions().iter().all(|(_, rule)| rule.member != nm::STATE_CHANGED));
}

#[test]
fn test_nm_access_point_reads_synced_properties() {
    let (mut session, bus, _events) = session(SessionConfig::network_manager());
    bring_up(&mut session, &bus, ":1.5");
    let ap = "/org/freedesktop/NetworkManager/AccessPoint/4";

    let access_point = netman::AccessPoint::track(&mut session, ap).unwrap();
    let (sync, call) = bus.last_call(ap, freedesktop::GET_ALL);
    assert_eq!(call.args, vec![Argument::new(nm::ACCESS_POINT_INTERFACE)]);

    let ssid = Value::Array(b"home".iter().copied().map(Value::Byte).collect());
    session.dispatch(properties(
        sync,
        &[
            ("Ssid", ssid),
            ("Strength", Value::Byte(72)),
            ("Frequency", Value::UInt32(2437)),
        ],
    ));

    assert_eq!(access_point.ssid(&session).unwrap(), b"home");
    assert_eq!(access_point.strength(&session).unwrap(), 72);
    assert_eq!(access_point.frequency(&session).unwrap(), 2437);
    assert!(matches!(
        access_point.hw_address(&session),
        Err(BusError::NotFound(_))
    ));
}
