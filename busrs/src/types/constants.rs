//! Well-known bus names, object paths, and interfaces.

/// Freedesktop bus-level names.
pub mod freedesktop {
    pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
    pub const GET_ALL: &str = "GetAll";
    pub const SET: &str = "Set";
    pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";
}

/// Members of the per-interface property protocol used by BlueZ 4 and ConnMan.
pub mod legacy {
    pub const GET_PROPERTIES: &str = "GetProperties";
    pub const SET_PROPERTY: &str = "SetProperty";
    pub const PROPERTY_CHANGED: &str = "PropertyChanged";
}

/// BlueZ 4 service.
pub mod bluez {
    pub const SERVICE: &str = "org.bluez";
    pub const MANAGER_PATH: &str = "/";
    pub const MANAGER_INTERFACE: &str = "org.bluez.Manager";
    pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter";
    pub const DEVICE_INTERFACE: &str = "org.bluez.Device";

    pub const ADAPTER_ADDED: &str = "AdapterAdded";
    pub const ADAPTER_REMOVED: &str = "AdapterRemoved";
    pub const DEVICE_FOUND: &str = "DeviceFound";

    /// Agent capability used when none is given.
    pub const DEFAULT_AGENT_CAPABILITY: &str = "DisplayYesNo";
}

/// ConnMan service.
pub mod connman {
    pub const SERVICE: &str = "net.connman";
    pub const MANAGER_PATH: &str = "/";
    pub const MANAGER_INTERFACE: &str = "net.connman.Manager";
    pub const SERVICE_INTERFACE: &str = "net.connman.Service";
    pub const TECHNOLOGY_INTERFACE: &str = "net.connman.Technology";
}

/// NetworkManager service.
pub mod nm {
    pub const SERVICE: &str = "org.freedesktop.NetworkManager";
    pub const PATH: &str = "/org/freedesktop/NetworkManager";
    pub const INTERFACE: &str = "org.freedesktop.NetworkManager";
    pub const DEVICE_INTERFACE: &str = "org.freedesktop.NetworkManager.Device";
    pub const WIRED_INTERFACE: &str = "org.freedesktop.NetworkManager.Device.Wired";
    pub const WIRELESS_INTERFACE: &str = "org.freedesktop.NetworkManager.Device.Wireless";
    pub const ACTIVE_CONNECTION_INTERFACE: &str = "org.freedesktop.NetworkManager.Connection.Active";
    pub const ACCESS_POINT_INTERFACE: &str = "org.freedesktop.NetworkManager.AccessPoint";
    pub const SETTINGS_CONNECTION_INTERFACE: &str =
        "org.freedesktop.NetworkManager.Settings.Connection";

    pub const DEVICE_ADDED: &str = "DeviceAdded";
    pub const DEVICE_REMOVED: &str = "DeviceRemoved";
    pub const STATE_CHANGED: &str = "StateChanged";
    pub const ACCESS_POINT_ADDED: &str = "AccessPointAdded";
    pub const ACCESS_POINT_REMOVED: &str = "AccessPointRemoved";
}

/// NetworkManager device state constants.
pub mod device_state {
    pub const UNKNOWN: u32 = 0;
    pub const UNMANAGED: u32 = 10;
    pub const UNAVAILABLE: u32 = 20;
    pub const DISCONNECTED: u32 = 30;
    pub const PREPARE: u32 = 40;
    pub const CONFIG: u32 = 50;
    pub const NEED_AUTH: u32 = 60;
    pub const IP_CONFIG: u32 = 70;
    pub const IP_CHECK: u32 = 80;
    pub const SECONDARIES: u32 = 90;
    pub const ACTIVATED: u32 = 100;
    pub const DEACTIVATING: u32 = 110;
    pub const FAILED: u32 = 120;
}

/// NetworkManager device type constants.
pub mod device_type {
    pub const ETHERNET: u32 = 1;
    pub const WIFI: u32 = 2;
    pub const BLUETOOTH: u32 = 5;
    pub const MODEM: u32 = 8;
}

/// Default bound on how far the element tree is followed from the root.
pub const DEFAULT_MAX_DEPTH: u8 = 3;
