//! NetworkManager manager, devices, and saved connections.

use std::collections::HashMap;

use bitflags::bitflags;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::Session;
use crate::api::models::{BusError, CallKind, Event, EventKind, EventPayload};
use crate::core::codec;
use crate::core::element::Completion;
use crate::dbus::Argument;
use crate::services::typed_path;
use crate::types::constants::{device_state, device_type, freedesktop, nm};
use crate::types::value::{FromValue, PropertyMap, PropertyName, Value, ValueKind};

pub const GET_ACCESS_POINTS: CallKind = CallKind::new("get-access-points");
pub const GET_DETAILS: CallKind = CallKind::new("get-details");
pub const GET_SETTINGS: CallKind = CallKind::new("get-settings");
pub const GET_SECRETS: CallKind = CallKind::new("get-secrets");

/// Signal emitted by a saved connection after its settings changed.
pub const UPDATED: &str = "Updated";

bitflags! {
    /// Generic device capabilities (`Capabilities` property).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceCapabilities: u32 {
        const NM_SUPPORTED = 0x1;
        const CARRIER_DETECT = 0x2;
        const IS_SOFTWARE = 0x4;
        const SRIOV = 0x8;
    }
}

bitflags! {
    /// Wi-Fi device capabilities (`WirelessCapabilities` property).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WirelessCapabilities: u32 {
        const CIPHER_WEP40 = 0x1;
        const CIPHER_WEP104 = 0x2;
        const CIPHER_TKIP = 0x4;
        const CIPHER_CCMP = 0x8;
        const WPA = 0x10;
        const RSN = 0x20;
        const AP = 0x40;
        const ADHOC = 0x80;
        const FREQ_VALID = 0x100;
        const FREQ_2GHZ = 0x200;
        const FREQ_5GHZ = 0x400;
    }
}

/// The NetworkManager root object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manager {
    path: PropertyName,
}

impl Manager {
    pub fn get(session: &Session) -> Result<Self> {
        let root = session.config().root_path.clone();
        Ok(Self {
            path: typed_path(session, &root, nm::INTERFACE)?,
        })
    }

    pub fn wireless_enabled(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "WirelessEnabled")
    }

    pub fn set_wireless_enabled(
        &self,
        session: &mut Session,
        enabled: bool,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.property_set_with_kind(
            &self.path,
            "WirelessEnabled",
            Value::Bool(enabled),
            ValueKind::Bool,
            completion,
        )
    }

    /// State of the hardware radio switch.
    pub fn wireless_hardware_enabled(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "WirelessHardwareEnabled")
    }

    pub fn state(&self, session: &Session) -> Result<u32> {
        session.property_get(&self.path, "State")
    }

    pub fn devices(&self, session: &Session) -> Result<Vec<OwnedObjectPath>> {
        session.property_get(&self.path, "Devices")
    }

    pub fn active_connections(&self, session: &Session) -> Result<Vec<OwnedObjectPath>> {
        session.property_get(&self.path, "ActiveConnections")
    }

    /// Forwards the manager's `StateChanged` signal; parse it with
    /// [`ManagerStateChange::from_event`].
    pub fn track(&self, session: &mut Session) -> Result<()> {
        session.subscribe_element_signal(&self.path, nm::INTERFACE, nm::STATE_CHANGED)
    }
}

/// A network device managed by NetworkManager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    path: PropertyName,
}

impl Device {
    pub fn get(session: &Session, path: &str) -> Result<Self> {
        Ok(Self {
            path: typed_path(session, path, nm::DEVICE_INTERFACE)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn udi(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Udi")
    }

    pub fn interface(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Interface")
    }

    pub fn driver(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Driver")
    }

    pub fn capabilities(&self, session: &Session) -> Result<DeviceCapabilities> {
        let bits: u32 = session.property_get(&self.path, "Capabilities")?;
        Ok(DeviceCapabilities::from_bits_truncate(bits))
    }

    /// Raw device state, see [`device_state`].
    pub fn state(&self, session: &Session) -> Result<u32> {
        session.property_get(&self.path, "State")
    }

    pub fn is_activated(&self, session: &Session) -> Result<bool> {
        Ok(self.state(session)? == device_state::ACTIVATED)
    }

    pub fn managed(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Managed")
    }

    /// Raw device type, see [`device_type`](crate::types::constants::device_type).
    pub fn device_type(&self, session: &Session) -> Result<u32> {
        session.property_get(&self.path, "DeviceType")
    }

    pub fn ip4_config(&self, session: &Session) -> Result<OwnedObjectPath> {
        session.property_get(&self.path, "Ip4Config")
    }

    /// Forwards `StateChanged` and, on Wi-Fi devices, `AccessPointAdded` and
    /// `AccessPointRemoved` as `ElementSignal` events on the device's path.
    ///
    /// Reads `DeviceType`, so the device must have been synced.
    pub fn track(&self, session: &mut Session) -> Result<()> {
        let wireless = self.device_type(session)? == device_type::WIFI;
        session.subscribe_element_signal(&self.path, nm::DEVICE_INTERFACE, nm::STATE_CHANGED)?;
        if wireless {
            for member in [nm::ACCESS_POINT_ADDED, nm::ACCESS_POINT_REMOVED] {
                session.subscribe_element_signal(&self.path, nm::WIRELESS_INTERFACE, member)?;
            }
        }
        Ok(())
    }

    /// Lists the access points a Wi-Fi device currently sees.
    ///
    /// Decode the reply with [`access_points_from_reply`].
    pub fn get_access_points(&self, session: &mut Session, completion: Completion) -> Result<()> {
        session.call_method_on(
            &self.path,
            nm::WIRELESS_INTERFACE,
            GET_ACCESS_POINTS,
            "GetAccessPoints",
            Vec::new(),
            Some(completion),
        )
    }

    /// Fetches the properties of the wired or wireless interface of this
    /// device. Decode the reply with [`WiredDetails::from_reply`] or
    /// [`WirelessDetails::from_reply`].
    pub fn get_details(
        &self,
        session: &mut Session,
        interface: &str,
        completion: Completion,
    ) -> Result<()> {
        session.call_method_on(
            &self.path,
            freedesktop::PROPERTIES_INTERFACE,
            GET_DETAILS,
            freedesktop::GET_ALL,
            vec![Argument::new(interface)],
            Some(completion),
        )
    }
}

fn signal_args<'a>(event: &'a Event, expected: &str) -> Option<&'a [Value]> {
    if event.kind != EventKind::ElementSignal {
        return None;
    }
    match &event.payload {
        EventPayload::Signal { member, args } if member == expected => Some(args),
        _ => None,
    }
}

/// A device's `StateChanged(new, old, reason)` signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStateChange {
    pub device: String,
    pub new_state: u32,
    pub old_state: u32,
    pub reason: u32,
}

impl DeviceStateChange {
    pub fn from_event(event: &Event) -> Option<Self> {
        match signal_args(event, nm::STATE_CHANGED)? {
            [Value::UInt32(new_state), Value::UInt32(old_state), Value::UInt32(reason)] => {
                Some(Self {
                    device: event.path.to_string(),
                    new_state: *new_state,
                    old_state: *old_state,
                    reason: *reason,
                })
            }
            _ => None,
        }
    }

    pub fn is_activated(&self) -> bool {
        self.new_state == device_state::ACTIVATED
    }
}

/// The manager's overall `StateChanged(state)` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStateChange {
    pub state: u32,
}

impl ManagerStateChange {
    pub fn from_event(event: &Event) -> Option<Self> {
        match signal_args(event, nm::STATE_CHANGED)? {
            [Value::UInt32(state)] => Some(Self { state: *state }),
            _ => None,
        }
    }
}

/// An access point that appeared on or vanished from a Wi-Fi device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointChange {
    pub device: String,
    pub access_point: String,
    pub added: bool,
}

impl AccessPointChange {
    pub fn from_event(event: &Event) -> Option<Self> {
        let (added, args) = match signal_args(event, nm::ACCESS_POINT_ADDED) {
            Some(args) => (true, args),
            None => (false, signal_args(event, nm::ACCESS_POINT_REMOVED)?),
        };
        let access_point = args.first()?.as_object_path()?;
        Some(Self {
            device: event.path.to_string(),
            access_point: access_point.to_string(),
            added,
        })
    }
}

/// An access point seen by a Wi-Fi device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    path: PropertyName,
}

impl AccessPoint {
    /// Registers the access point at `path` and fetches its properties.
    pub fn track(session: &mut Session, path: &str) -> Result<Self> {
        session.element_get_or_create(path, nm::ACCESS_POINT_INTERFACE);
        let path = typed_path(session, path, nm::ACCESS_POINT_INTERFACE)?;
        session.sync_properties(&path)?;
        Ok(Self { path })
    }

    pub fn get(session: &Session, path: &str) -> Result<Self> {
        Ok(Self {
            path: typed_path(session, path, nm::ACCESS_POINT_INTERFACE)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw SSID bytes; not necessarily UTF-8.
    pub fn ssid(&self, session: &Session) -> Result<Vec<u8>> {
        let bytes: Vec<Value> = session.property_get(&self.path, "Ssid")?;
        bytes.iter().map(u8::try_from_value).collect()
    }

    /// Signal quality in percent.
    pub fn strength(&self, session: &Session) -> Result<u8> {
        session.property_get(&self.path, "Strength")
    }

    /// Frequency in MHz.
    pub fn frequency(&self, session: &Session) -> Result<u32> {
        session.property_get(&self.path, "Frequency")
    }

    pub fn hw_address(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "HwAddress")
    }
}

/// Decodes the `ao` reply of `GetAccessPoints`.
pub fn access_points_from_reply(args: &[Value]) -> Result<Vec<OwnedObjectPath>> {
    let first = args.first().ok_or_else(|| BusError::TypeMismatch {
        expected: "ao".into(),
        found: "empty reply".into(),
    })?;
    Vec::<OwnedObjectPath>::try_from_value(first)
}

fn field<T: FromValue>(props: &PropertyMap, key: &str) -> Result<T> {
    let value = props
        .get(key)
        .ok_or_else(|| BusError::NotFound(key.to_string()))?;
    T::try_from_value(value)
}

/// Properties of `org.freedesktop.NetworkManager.Device.Wired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiredDetails {
    pub hw_address: String,
    /// Link speed in Mb/s.
    pub speed: u32,
    pub carrier: bool,
}

impl WiredDetails {
    pub fn from_reply(args: Vec<Value>) -> Result<Self> {
        let props = codec::properties_from_reply(args)?;
        Ok(Self {
            hw_address: field(&props, "HwAddress")?,
            speed: field(&props, "Speed")?,
            carrier: field(&props, "Carrier")?,
        })
    }
}

/// Properties of `org.freedesktop.NetworkManager.Device.Wireless`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirelessDetails {
    pub hw_address: String,
    pub mode: u32,
    /// Bit rate in Kb/s.
    pub bitrate: u32,
    /// `None` when not associated.
    pub active_access_point: Option<String>,
    pub capabilities: WirelessCapabilities,
}

impl WirelessDetails {
    pub fn from_reply(args: Vec<Value>) -> Result<Self> {
        let props = codec::properties_from_reply(args)?;
        let active: OwnedObjectPath = field(&props, "ActiveAccessPoint")?;
        let active = active.as_str();
        Ok(Self {
            hw_address: field(&props, "HwAddress")?,
            mode: field(&props, "Mode")?,
            bitrate: field(&props, "Bitrate")?,
            active_access_point: (active != "/").then(|| active.to_string()),
            capabilities: WirelessCapabilities::from_bits_truncate(field(
                &props,
                "WirelessCapabilities",
            )?),
        })
    }
}

/// Settings of a saved connection, keyed by setting name then property.
pub type Settings = HashMap<String, PropertyMap>;

/// Decodes the `a{sa{sv}}` reply of `GetSettings` and `GetSecrets`.
pub fn settings_from_reply(args: Vec<Value>) -> Result<Settings> {
    let sections = codec::properties_from_reply(args)?;
    let mut settings = Settings::with_capacity(sections.len());
    for (name, section) in sections {
        let section = PropertyMap::try_from_value(&section)?;
        settings.insert(name.to_string(), section);
    }
    Ok(settings)
}

/// A connection profile stored by NetworkManager's settings service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsConnection {
    path: PropertyName,
}

impl SettingsConnection {
    /// Registers the profile at `path` and forwards its `Updated` signal as
    /// `ElementSignal` events.
    pub fn track(session: &mut Session, path: &str) -> Result<Self> {
        session.element_get_or_create(path, nm::SETTINGS_CONNECTION_INTERFACE);
        let path = typed_path(session, path, nm::SETTINGS_CONNECTION_INTERFACE)?;
        session.subscribe_element_signal(&path, nm::SETTINGS_CONNECTION_INTERFACE, UPDATED)?;
        Ok(Self { path })
    }

    pub fn get(session: &Session, path: &str) -> Result<Self> {
        Ok(Self {
            path: typed_path(session, path, nm::SETTINGS_CONNECTION_INTERFACE)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decode the reply with [`settings_from_reply`].
    pub fn get_settings(&self, session: &mut Session, completion: Completion) -> Result<()> {
        session.call_method(
            &self.path,
            GET_SETTINGS,
            "GetSettings",
            Vec::new(),
            Some(completion),
        )
    }

    /// Fetches the secrets of one setting, e.g. `"802-11-wireless-security"`.
    pub fn get_secrets(
        &self,
        session: &mut Session,
        setting: &str,
        completion: Completion,
    ) -> Result<()> {
        session.call_method(
            &self.path,
            GET_SECRETS,
            "GetSecrets",
            vec![Argument::new(setting)],
            Some(completion),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, Value)]) -> Value {
        Value::Dict(
            entries
                .iter()
                .map(|(k, v)| (PropertyName::from(*k), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn wireless_details_decode() {
        let reply = vec![dict(&[
            ("HwAddress", Value::Str("AA:BB:CC:DD:EE:FF".into())),
            ("Mode", Value::UInt32(2)),
            ("Bitrate", Value::UInt32(54000)),
            ("ActiveAccessPoint", Value::ObjectPath("/".into())),
            ("WirelessCapabilities", Value::UInt32(0x10 | 0x20 | 0x200)),
        ])];

        let details = WirelessDetails::from_reply(reply).unwrap();
        assert_eq!(details.mode, 2);
        assert_eq!(details.active_access_point, None);
        assert!(details.capabilities.contains(WirelessCapabilities::WPA | WirelessCapabilities::RSN));
        assert!(!details.capabilities.contains(WirelessCapabilities::FREQ_5GHZ));
    }

    #[test]
    fn wired_details_require_every_field() {
        let reply = vec![dict(&[
            ("HwAddress", Value::Str("AA:BB:CC:DD:EE:FF".into())),
            ("Speed", Value::UInt32(1000)),
        ])];
        assert!(matches!(
            WiredDetails::from_reply(reply),
            Err(BusError::NotFound(key)) if key == "Carrier"
        ));
    }

    #[test]
    fn settings_decode_nested_dictionaries() {
        let reply = vec![dict(&[
            ("connection", dict(&[("id", Value::Str("home".into()))])),
            ("ipv4", dict(&[("method", Value::Str("auto".into()))])),
        ])];
        let settings = settings_from_reply(reply).unwrap();
        assert_eq!(
            settings["connection"].get("id"),
            Some(&Value::Str("home".into()))
        );
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn access_points_decode() {
        let reply = vec![Value::Array(vec![
            Value::ObjectPath("/org/freedesktop/NetworkManager/AccessPoint/1".into()),
            Value::ObjectPath("/org/freedesktop/NetworkManager/AccessPoint/2".into()),
        ])];
        let aps = access_points_from_reply(&reply).unwrap();
        assert_eq!(aps.len(), 2);
        assert!(access_points_from_reply(&[]).is_err());
    }

    fn signal_event(path: &str, member: &str, args: Vec<Value>) -> Event {
        Event::new(
            EventKind::ElementSignal,
            PropertyName::from(path),
            EventPayload::Signal {
                member: member.to_string(),
                args,
            },
        )
    }

    #[test]
    fn state_changes_are_told_apart_by_arity() {
        let device = signal_event(
            "/org/freedesktop/NetworkManager/Devices/2",
            nm::STATE_CHANGED,
            vec![Value::UInt32(120), Value::UInt32(50), Value::UInt32(7)],
        );
        let change = DeviceStateChange::from_event(&device).unwrap();
        assert_eq!(change.new_state, device_state::FAILED);
        assert_eq!(change.reason, 7);
        assert!(!change.is_activated());
        assert!(ManagerStateChange::from_event(&device).is_none());

        let manager = signal_event(nm::PATH, nm::STATE_CHANGED, vec![Value::UInt32(70)]);
        assert_eq!(
            ManagerStateChange::from_event(&manager),
            Some(ManagerStateChange { state: 70 })
        );
        assert!(DeviceStateChange::from_event(&manager).is_none());
    }

    #[test]
    fn access_point_change_needs_a_path() {
        let device = "/org/freedesktop/NetworkManager/Devices/3";
        let removed = signal_event(
            device,
            nm::ACCESS_POINT_REMOVED,
            vec![Value::ObjectPath("/org/freedesktop/NetworkManager/AccessPoint/9".into())],
        );
        let change = AccessPointChange::from_event(&removed).unwrap();
        assert!(!change.added);
        assert_eq!(change.device, device);

        let bogus = signal_event(device, nm::ACCESS_POINT_ADDED, vec![Value::UInt32(9)]);
        assert!(AccessPointChange::from_event(&bogus).is_none());
        let other = signal_event(device, nm::STATE_CHANGED, Vec::new());
        assert!(AccessPointChange::from_event(&other).is_none());
    }

    #[test]
    fn unknown_capability_bits_are_dropped() {
        let caps = DeviceCapabilities::from_bits_truncate(0x1 | 0x2 | 0x100);
        assert_eq!(caps, DeviceCapabilities::NM_SUPPORTED | DeviceCapabilities::CARRIER_DETECT);
    }
}
