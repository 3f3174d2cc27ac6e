use std::fmt;

use crate::types::constants::{self, bluez, connman, nm};

/// Which message bus to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusKind {
    #[default]
    System,
    Session,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::System => f.write_str("system"),
            BusKind::Session => f.write_str("session"),
        }
    }
}

/// How properties are fetched, written, and announced by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyProtocol {
    /// `<iface>.GetProperties`, `<iface>.SetProperty` and the
    /// `<iface>.PropertyChanged(s, v)` signal, as spoken by BlueZ 4 and ConnMan.
    Legacy,
    /// `org.freedesktop.DBus.Properties` `GetAll`/`Set` and the
    /// `PropertiesChanged(s, a{sv}, as)` signal.
    Freedesktop,
}

/// An object-path property that names child elements.
///
/// When an element implementing `parent_interface` reports `property`, each
/// path it lists becomes an element implementing `child_interface`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLink {
    pub parent_interface: String,
    pub property: String,
    pub child_interface: String,
}

impl ChildLink {
    pub fn new(
        parent_interface: impl Into<String>,
        property: impl Into<String>,
        child_interface: impl Into<String>,
    ) -> Self {
        Self {
            parent_interface: parent_interface.into(),
            property: property.into(),
            child_interface: child_interface.into(),
        }
    }
}

/// What a lifecycle signal on the root element does with the path in its
/// first argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Create and sync an element implementing the given interface.
    Added(String),
    /// Remove the element.
    Removed,
}

/// A root-level signal announcing that an object appeared or went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSignal {
    pub interface: String,
    pub member: String,
    pub action: LifecycleAction,
}

impl LifecycleSignal {
    pub fn added(
        interface: impl Into<String>,
        member: impl Into<String>,
        child_interface: impl Into<String>,
    ) -> Self {
        Self {
            interface: interface.into(),
            member: member.into(),
            action: LifecycleAction::Added(child_interface.into()),
        }
    }

    pub fn removed(interface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            member: member.into(),
            action: LifecycleAction::Removed,
        }
    }
}

/// Describes the service a [`Session`](crate::Session) tracks.
///
/// Start from one of the presets and adjust with the `with_*` methods.
///
/// # Examples
///
/// ```rust
/// use busrs::SessionConfig;
///
/// // BlueZ, but only follow adapters, not their devices
/// let config = SessionConfig::bluez().with_max_depth(1);
/// assert_eq!(config.service, "org.bluez");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Well-known bus name of the service.
    pub service: String,
    /// Path of the root manager object.
    pub root_path: String,
    /// Interface of the root manager object.
    pub root_interface: String,
    pub protocol: PropertyProtocol,
    /// Object-path properties followed after every property update.
    pub children: Vec<ChildLink>,
    /// Root signals that add or remove elements.
    pub lifecycle: Vec<LifecycleSignal>,
    /// Deepest level of the element tree that is created, the root being 0.
    pub max_depth: u8,
}

impl SessionConfig {
    /// A bare configuration with no children or lifecycle signals.
    pub fn new(
        service: impl Into<String>,
        root_path: impl Into<String>,
        root_interface: impl Into<String>,
        protocol: PropertyProtocol,
    ) -> Self {
        Self {
            service: service.into(),
            root_path: root_path.into(),
            root_interface: root_interface.into(),
            protocol,
            children: Vec::new(),
            lifecycle: Vec::new(),
            max_depth: constants::DEFAULT_MAX_DEPTH,
        }
    }

    /// BlueZ 4: manager at `/`, adapters and their devices below it.
    pub fn bluez() -> Self {
        Self::new(
            bluez::SERVICE,
            bluez::MANAGER_PATH,
            bluez::MANAGER_INTERFACE,
            PropertyProtocol::Legacy,
        )
        .with_child(ChildLink::new(
            bluez::MANAGER_INTERFACE,
            "Adapters",
            bluez::ADAPTER_INTERFACE,
        ))
        .with_child(ChildLink::new(
            bluez::ADAPTER_INTERFACE,
            "Devices",
            bluez::DEVICE_INTERFACE,
        ))
        .with_lifecycle(LifecycleSignal::added(
            bluez::MANAGER_INTERFACE,
            bluez::ADAPTER_ADDED,
            bluez::ADAPTER_INTERFACE,
        ))
        .with_lifecycle(LifecycleSignal::removed(
            bluez::MANAGER_INTERFACE,
            bluez::ADAPTER_REMOVED,
        ))
    }

    /// ConnMan: manager at `/` listing services and technologies.
    pub fn connman() -> Self {
        Self::new(
            connman::SERVICE,
            connman::MANAGER_PATH,
            connman::MANAGER_INTERFACE,
            PropertyProtocol::Legacy,
        )
        .with_child(ChildLink::new(
            connman::MANAGER_INTERFACE,
            "Services",
            connman::SERVICE_INTERFACE,
        ))
        .with_child(ChildLink::new(
            connman::MANAGER_INTERFACE,
            "Technologies",
            connman::TECHNOLOGY_INTERFACE,
        ))
    }

    /// NetworkManager: devices and active connections below the manager.
    pub fn network_manager() -> Self {
        Self::new(nm::SERVICE, nm::PATH, nm::INTERFACE, PropertyProtocol::Freedesktop)
            .with_child(ChildLink::new(nm::INTERFACE, "Devices", nm::DEVICE_INTERFACE))
            .with_child(ChildLink::new(
                nm::INTERFACE,
                "ActiveConnections",
                nm::ACTIVE_CONNECTION_INTERFACE,
            ))
            .with_lifecycle(LifecycleSignal::added(
                nm::INTERFACE,
                nm::DEVICE_ADDED,
                nm::DEVICE_INTERFACE,
            ))
            .with_lifecycle(LifecycleSignal::removed(nm::INTERFACE, nm::DEVICE_REMOVED))
    }

    #[must_use]
    pub fn with_child(mut self, link: ChildLink) -> Self {
        self.children.push(link);
        self
    }

    #[must_use]
    pub fn with_lifecycle(mut self, signal: LifecycleSignal) -> Self {
        self.lifecycle.push(signal);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_depth = depth;
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: PropertyProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Child links that apply to elements implementing `interface`.
    pub(crate) fn children_of<'a>(
        &'a self,
        interface: &'a str,
    ) -> impl Iterator<Item = &'a ChildLink> + 'a {
        self.children
            .iter()
            .filter(move |link| link.parent_interface == interface)
    }
}
