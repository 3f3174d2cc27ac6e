//! ConnMan network services.

use crate::Result;
use crate::Session;
use crate::api::models::CallKind;
use crate::core::element::Completion;
use crate::dbus::Argument;
use crate::services::typed_path;
use crate::types::constants::connman;
use crate::types::value::{PropertyName, Value, ValueKind};

pub const CONNECT: CallKind = CallKind::new("service-connect");
pub const DISCONNECT: CallKind = CallKind::new("service-disconnect");
pub const REMOVE: CallKind = CallKind::new("service-remove");
pub const CLEAR_PROPERTY: CallKind = CallKind::new("service-clear-property");
pub const MOVE_BEFORE: CallKind = CallKind::new("service-move-before");
pub const MOVE_AFTER: CallKind = CallKind::new("service-move-after");

/// One ConnMan service (a network that can be connected to).
///
/// ```no_run
/// use busrs::services::connman::Service;
/// # fn example(session: &mut busrs::Session) -> busrs::Result<()> {
/// let service = Service::get(session, "/profile/default/wifi_home")?;
/// if service.passphrase_required(session)? {
///     service.set_passphrase(session, "hunter2", None)?;
/// }
/// service.connect(session, None)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    path: PropertyName,
}

impl Service {
    /// Fails with `TypeMismatch` if the element at `path` is not a service.
    pub fn get(session: &Session, path: &str) -> Result<Self> {
        Ok(Self {
            path: typed_path(session, path, connman::SERVICE_INTERFACE)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn call(
        &self,
        session: &mut Session,
        kind: CallKind,
        method: &str,
        args: Vec<Argument>,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.call_method(&self.path, kind, method, args, completion)
    }

    /// Connects the service. On wired links this fails without a cable.
    pub fn connect(&self, session: &mut Session, completion: Option<Completion>) -> Result<()> {
        self.call(session, CONNECT, "Connect", Vec::new(), completion)
    }

    /// Disconnects the service, or aborts a pending `connect`.
    pub fn disconnect(&self, session: &mut Session, completion: Option<Completion>) -> Result<()> {
        self.call(session, DISCONNECT, "Disconnect", Vec::new(), completion)
    }

    /// Forgets the service's stored configuration.
    pub fn remove(&self, session: &mut Session, completion: Option<Completion>) -> Result<()> {
        self.call(session, REMOVE, "Remove", Vec::new(), completion)
    }

    pub fn clear_property(
        &self,
        session: &mut Session,
        property: &str,
        completion: Option<Completion>,
    ) -> Result<()> {
        self.call(
            session,
            CLEAR_PROPERTY,
            "ClearProperty",
            vec![Argument::new(property)],
            completion,
        )
    }

    /// Moves this service before `other` in the favorites list.
    pub fn move_before(
        &self,
        session: &mut Session,
        other: &str,
        completion: Option<Completion>,
    ) -> Result<()> {
        self.call(
            session,
            MOVE_BEFORE,
            "MoveBefore",
            vec![Argument::object_path(other)],
            completion,
        )
    }

    /// Moves this service after `other` in the favorites list.
    pub fn move_after(
        &self,
        session: &mut Session,
        other: &str,
        completion: Option<Completion>,
    ) -> Result<()> {
        self.call(
            session,
            MOVE_AFTER,
            "MoveAfter",
            vec![Argument::object_path(other)],
            completion,
        )
    }

    /// `"idle"`, `"failure"`, `"association"`, `"configuration"`, `"ready"`, ...
    pub fn state(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "State")
    }

    /// Last error reported while in the `"failure"` state.
    pub fn error(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Error")
    }

    pub fn name(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Name")
    }

    /// Technology type, e.g. `"wifi"` or `"ethernet"`.
    pub fn kind(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Type")
    }

    pub fn mode(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Mode")
    }

    pub fn security(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Security")
    }

    pub fn passphrase(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "Passphrase")
    }

    pub fn set_passphrase(
        &self,
        session: &mut Session,
        passphrase: &str,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.property_set_with_kind(
            &self.path,
            "Passphrase",
            Value::from(passphrase),
            ValueKind::Str,
            completion,
        )
    }

    pub fn passphrase_required(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "PassphraseRequired")
    }

    /// Signal strength, 0 to 100.
    pub fn strength(&self, session: &Session) -> Result<u8> {
        session.property_get(&self.path, "Strength")
    }

    pub fn favorite(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Favorite")
    }

    pub fn immutable(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Immutable")
    }

    pub fn auto_connect(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "AutoConnect")
    }

    pub fn set_auto_connect(
        &self,
        session: &mut Session,
        auto_connect: bool,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.property_set_with_kind(
            &self.path,
            "AutoConnect",
            Value::Bool(auto_connect),
            ValueKind::Bool,
            completion,
        )
    }

    pub fn setup_required(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "SetupRequired")
    }

    /// Access point name of a cellular service.
    pub fn apn(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "APN")
    }

    pub fn set_apn(
        &self,
        session: &mut Session,
        apn: &str,
        completion: Option<Completion>,
    ) -> Result<()> {
        session.property_set_with_kind(
            &self.path,
            "APN",
            Value::from(apn),
            ValueKind::Str,
            completion,
        )
    }

    /// Mobile country code.
    pub fn mcc(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "MCC")
    }

    /// Mobile network code.
    pub fn mnc(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "MNC")
    }

    pub fn roaming(&self, session: &Session) -> Result<bool> {
        session.property_get(&self.path, "Roaming")
    }

    /// `"dhcp"`, `"manual"`, `"fixed"` or `"off"`.
    pub fn ipv4_method(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "IPv4.Method")
    }

    pub fn ipv4_address(&self, session: &Session) -> Result<String> {
        session.property_get(&self.path, "IPv4.Address")
    }
}
