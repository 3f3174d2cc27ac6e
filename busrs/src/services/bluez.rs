//! BlueZ 4 manager, adapters, devices, and discovery results.
//!
//! # Example
//!
//! ```no_run
//! use busrs::services::bluez::Adapter;
//! use busrs::{EventKind, Session, SessionConfig};
//!
//! # async fn example() -> busrs::Result<()> {
//! let (mut session, mut events) = Session::connect(SessionConfig::bluez()).await?;
//! session.init();
//!
//! // ... once `/org/bluez/hci0` has been added:
//! let adapter = Adapter::get(&session, "/org/bluez/hci0")?;
//! if !adapter.powered(&session)? {
//!     adapter.set_powered(&mut session, true, None)?;
//! }
//! adapter.start_discovery(&mut session, None)?;
//! session.run(&mut events).await;
//! # Ok(())
//! # }
//! ```

use zvariant::OwnedObjectPath;

use crate::Result;
use crate::Session;
use crate::api::models::{CallKind, Event, EventKind, EventPayload};
use crate::core::element::Completion;
use crate::dbus::Argument;
use crate::services::typed_path;
use crate::types::constants::bluez;
use crate::types::value::{FromValue, PropertyMap, PropertyName, Value, ValueKind};

pub const DEFAULT_ADAPTER: CallKind = CallKind::new("default-adapter");
pub const START_DISCOVERY: CallKind = CallKind::new("start-discovery");
pub const STOP_DISCOVERY: CallKind = CallKind::new("stop-discovery");
pub const REGISTER_AGENT: CallKind = CallKind::new("agent-register");
pub const UNREGISTER_AGENT: CallKind = CallKind::new("agent-unregister");

/// The BlueZ manager object, root of the element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manager {
    path: PropertyName,
}

impl Manager {
    pub fn get(session: &Session) -> Result<Self> {
        let root = session.config().root_path.clone();
        Ok(Self {
            path: typed_path(session, &root, bluez::MANAGER_INTERFACE)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn adapters(&self, session: &Session) -> Result<Vec<OwnedObjectPath>> {
        session.property_get(&self.path, "Adapters")
    }

    /// Asks for the default adapter; the reply carries its object path.
    pub fn default_adapter(&self, session: &mut Session, completion: Completion) -> Result<()> {
        session.call_method(
            &self.path,
            DEFAULT_ADAPTER,
            "DefaultAdapter",
            Vec::new(),
            Some(completion),
        )
    }
}

/// A local Bluetooth adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adapter {
    path: PropertyName,
}

impl Adapter {
    pub fn get(session: &Session, path: &str) -> Result<Self> {
        Ok(Self {
            path: typed_path(session, path, bluez::ADAPTER_INTERFACE)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Hardware address, e.g. `"00:11:22:33:44:55"`.
    pub fn address(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Address")
    }

    pub fn name(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Name")
    }

    pub fn powered(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Powered")
    }

    pub fn set_powered(
        &self,
        session: &mut Session,
        powered: bool,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.property_set_with_kind(
            &self.path,
            "Powered",
            Value::Bool(powered),
            ValueKind::Bool,
            completion,
        )
    }

    pub fn discoverable(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Discoverable")
    }

    pub fn set_discoverable(
        &self,
        session: &mut Session,
        discoverable: bool,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.property_set_with_kind(
            &self.path,
            "Discoverable",
            Value::Bool(discoverable),
            ValueKind::Bool,
            completion,
        )
    }

    pub fn discovering(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Discovering")
    }

    pub fn devices(&self, session: &Session) -> Result<Vec<OwnedObjectPath>> {
        session.property_get(&self.path, "Devices")
    }

    /// Starts device discovery.
    ///
    /// Found devices arrive as `ElementSignal` events on this adapter's path;
    /// parse them with [`DeviceFound::from_event`].
    pub fn start_discovery(&self, session: &mut Session, completion: Option<Completion>) -> Result<()> {
        session.subscribe_element_signal(
            &self.path,
            bluez::ADAPTER_INTERFACE,
            bluez::DEVICE_FOUND,
        )?;
        session.call_method(
            &self.path,
            START_DISCOVERY,
            "StartDiscovery",
            Vec::new(),
            completion,
        )
    }

    pub fn stop_discovery(&self, session: &mut Session, completion: Option<Completion>) -> Result<()> {
        session.call_method(
            &self.path,
            STOP_DISCOVERY,
            "StopDiscovery",
            Vec::new(),
            completion,
        )
    }

    /// Registers the agent at `agent_path` for pairing requests.
    ///
    /// `capability` defaults to `DisplayYesNo`.
    pub fn register_agent(
        &self,
        session: &mut Session,
        agent_path: &str,
        capability: Option<&str>,
        completion: Option<Completion>,
    ) -> Result<()> {
        let capability = capability.unwrap_or(bluez::DEFAULT_AGENT_CAPABILITY);
        session.call_method(
            &self.path,
            REGISTER_AGENT,
            "RegisterAgent",
            vec![Argument::object_path(agent_path), Argument::new(capability)],
            completion,
        )
    }

    pub fn unregister_agent(
        &self,
        session: &mut Session,
        agent_path: &str,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.call_method(
            &self.path,
            UNREGISTER_AGENT,
            "UnregisterAgent",
            vec![Argument::object_path(agent_path)],
            completion,
        )
    }
}

/// A remote device known to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    path: PropertyName,
}

impl Device {
    pub fn get(session: &Session, path: &str) -> Result<Self> {
        Ok(Self {
            path: typed_path(session, path, bluez::DEVICE_INTERFACE)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the adapter this device was discovered through.
    pub fn adapter<'a>(&self, session: &'a Session) -> Option<&'a str> {
        session.element_get(&self.path)?.parent()
    }

    pub fn address(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Address")
    }

    pub fn alias(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Alias")
    }

    pub fn paired(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Paired")
    }

    pub fn connected(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Connected")
    }

    pub fn trusted(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Trusted")
    }

    pub fn set_trusted(
        &self,
        session: &mut Session,
        trusted: bool,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.property_set_with_kind(
            &self.path,
            "Trusted",
            Value::Bool(trusted),
            ValueKind::Bool,
            completion,
        )
    }
}

/// A `DeviceFound(address, properties)` report from a discovering adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFound {
    /// Path of the adapter that found the device.
    pub adapter: String,
    pub address: String,
    pub properties: PropertyMap,
}

impl DeviceFound {
    /// Parses an `ElementSignal` event carrying a `DeviceFound` signal.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind != EventKind::ElementSignal {
            return None;
        }
        let EventPayload::Signal { member, args } = &event.payload else {
            return None;
        };
        if member != bluez::DEVICE_FOUND {
            return None;
        }
        match args.as_slice() {
            [Value::Str(address), Value::Dict(properties), ..] => Some(Self {
                adapter: event.path.to_string(),
                address: address.clone(),
                properties: properties.clone(),
            }),
            _ => None,
        }
    }

    fn get<T: FromValue>(&self, key: &str) -> Option<T> {
        self.properties.get(key).and_then(T::from_value)
    }

    pub fn alias(&self) -> Option<String> {
        self.get("Alias")
    }

    pub fn name(&self) -> Option<String> {
        self.get("Name")
    }

    /// Received signal strength.
    pub fn rssi(&self) -> Option<i16> {
        self.get("RSSI")
    }

    /// Class of device.
    pub fn class(&self) -> Option<u32> {
        self.get("Class")
    }

    pub fn paired(&self) -> Option<bool> {
        self.get("Paired")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(args: Vec<Value>) -> Event {
        Event::new(
            EventKind::ElementSignal,
            "/org/bluez/hci0".into(),
            EventPayload::Signal {
                member: bluez::DEVICE_FOUND.into(),
                args,
            },
        )
    }

    #[test]
    fn parses_device_found() {
        let mut props = PropertyMap::new();
        props.insert("Alias".into(), Value::Str("headset".into()));
        props.insert("RSSI".into(), Value::Int16(-60));
        props.insert("Class".into(), Value::UInt32(0x240404));

        let dev = DeviceFound::from_event(&found(vec![
            Value::Str("00:11:22:33:44:55".into()),
            Value::Dict(props),
        ]))
        .unwrap();

        assert_eq!(dev.adapter, "/org/bluez/hci0");
        assert_eq!(dev.address, "00:11:22:33:44:55");
        assert_eq!(dev.alias().as_deref(), Some("headset"));
        assert_eq!(dev.rssi(), Some(-60));
        assert_eq!(dev.class(), Some(0x240404));
        assert_eq!(dev.name(), None);
    }

    #[test]
    fn mistyped_alias_reads_as_missing() {
        let mut props = PropertyMap::new();
        props.insert("Alias".into(), Value::UInt32(1));
        let dev = DeviceFound::from_event(&found(vec![
            Value::Str("00:11:22:33:44:55".into()),
            Value::Dict(props),
        ]))
        .unwrap();
        assert_eq!(dev.alias(), None);
    }

    #[test]
    fn rejects_other_signals() {
        let mut ev = found(vec![Value::Str("x".into())]);
        assert!(DeviceFound::from_event(&ev).is_none());

        ev.payload = EventPayload::Signal {
            member: "PropertyChanged".into(),
            args: vec![Value::Str("x".into()), Value::Dict(PropertyMap::new())],
        };
        assert!(DeviceFound::from_event(&ev).is_none());
    }
}
