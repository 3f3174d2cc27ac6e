use std::fmt;

use thiserror::Error;

use crate::types::value::{PropertyMap, PropertyName, Value};

/// Identifies one pending-call slot on an element.
///
/// An element holds at most one in-flight call per kind. The generic layer
/// uses [`CallKind::PROPERTIES_GET`] and [`CallKind::PROPERTY_SET`]; service
/// bindings declare their own constants for method calls.
///
/// ```
/// use busrs::CallKind;
///
/// const CONNECT: CallKind = CallKind::new("connect");
/// assert_eq!(CONNECT.to_string(), "connect");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallKind(&'static str);

impl CallKind {
    /// Bulk property fetch issued by `sync_properties`.
    pub const PROPERTIES_GET: CallKind = CallKind("properties-get");
    /// Single property write issued by `property_set`.
    pub const PROPERTY_SET: CallKind = CallKind("property-set");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Kinds of application events a [`Session`](crate::Session) emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The service acquired an owner on the bus and the root element synced.
    ServiceUp,
    /// The service lost its owner; every element has been removed.
    ServiceDown,
    /// An element completed its first successful property sync.
    ElementAdded,
    /// An element was removed from the registry.
    ElementRemoved,
    /// Cached properties of an element changed.
    ElementUpdated,
    /// An element-scoped signal subscribed via `subscribe_element_signal`.
    ElementSignal,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::ServiceUp => "service-up",
            EventKind::ServiceDown => "service-down",
            EventKind::ElementAdded => "element-added",
            EventKind::ElementRemoved => "element-removed",
            EventKind::ElementUpdated => "element-updated",
            EventKind::ElementSignal => "element-signal",
        };
        f.write_str(name)
    }
}

/// Data carried by an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    None,
    /// Unique bus name of the new service owner.
    Owner(String),
    /// Full property snapshot after a bulk sync, or the last known
    /// snapshot of a removed element.
    Snapshot(PropertyMap),
    /// One property changed; `None` means it was invalidated and dropped.
    Changed {
        key: PropertyName,
        value: Option<Value>,
    },
    /// Arguments of an element-scoped signal.
    Signal { member: String, args: Vec<Value> },
}

/// An immutable record handed to event handlers.
///
/// For service events `path` is the root element path.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub path: PropertyName,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(kind: EventKind, path: PropertyName, payload: EventPayload) -> Self {
        Self {
            kind,
            path,
            payload,
        }
    }

    /// Key of a single-property change, if this is one.
    pub fn changed_key(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Changed { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Whether the backing service currently has an owner on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    Absent,
    Present {
        owner: String,
    },
}

impl ServiceState {
    pub fn is_present(&self) -> bool {
        matches!(self, ServiceState::Present { .. })
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            ServiceState::Present { owner } => Some(owner),
            ServiceState::Absent => None,
        }
    }
}

/// Errors surfaced by the element layer.
///
/// Decode and merge failures never escape as panics; they are turned into
/// one of these variants and returned to the call site or handed to the
/// completion callback of the call that produced them.
///
/// # Examples
///
/// ```
/// use busrs::BusError;
///
/// let err = BusError::NotFound("Powered".into());
/// assert_eq!(err.to_string(), "property not found: Powered");
/// ```
#[derive(Debug, Error)]
pub enum BusError {
    /// The peer answered with an error, or zbus rejected the message.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A value could not be serialized or deserialized by zvariant.
    #[error("wire codec error: {0}")]
    Codec(#[from] zvariant::Error),

    /// The bus was unreachable or the message could not be sent.
    ///
    /// Cloning a [`BusError::Dbus`] or [`BusError::Codec`] also yields this
    /// variant, carrying the original message.
    #[error("transport error: {0}")]
    Transport(String),

    /// A stored or received value has a different type than requested.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A value's tag disagrees with the static signature of its target.
    #[error("signature mismatch: expected {expected}, found {found}")]
    SignatureMismatch { expected: String, found: String },

    /// The signature is malformed or cannot be encoded.
    #[error("unsupported signature: {0}")]
    UnsupportedSignature(String),

    /// The property is absent from the cache.
    #[error("property not found: {0}")]
    NotFound(String),

    /// A call of the same kind is already in flight for this element.
    #[error("{kind} already pending on {path}")]
    AlreadyPending { path: String, kind: CallKind },

    /// The element has been removed, or the service is absent.
    #[error("stale reference: {0}")]
    StaleReference(String),

    /// The call was canceled before it completed.
    #[error("call canceled")]
    Canceled,
}

impl Clone for BusError {
    fn clone(&self) -> Self {
        match self {
            BusError::Dbus(e) => BusError::Transport(e.to_string()),
            BusError::Codec(e) => BusError::Transport(e.to_string()),
            BusError::Transport(s) => BusError::Transport(s.clone()),
            BusError::TypeMismatch { expected, found } => BusError::TypeMismatch {
                expected: expected.clone(),
                found: found.clone(),
            },
            BusError::SignatureMismatch { expected, found } => BusError::SignatureMismatch {
                expected: expected.clone(),
                found: found.clone(),
            },
            BusError::UnsupportedSignature(s) => BusError::UnsupportedSignature(s.clone()),
            BusError::NotFound(s) => BusError::NotFound(s.clone()),
            BusError::AlreadyPending { path, kind } => BusError::AlreadyPending {
                path: path.clone(),
                kind: *kind,
            },
            BusError::StaleReference(s) => BusError::StaleReference(s.clone()),
            BusError::Canceled => BusError::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_kind_display() {
        assert_eq!(CallKind::PROPERTIES_GET.to_string(), "properties-get");
        assert_eq!(CallKind::new("start-discovery").name(), "start-discovery");
    }

    #[test]
    fn already_pending_message() {
        let err = BusError::AlreadyPending {
            path: "/org/bluez/hci0".into(),
            kind: CallKind::new("connect"),
        };
        assert_eq!(err.to_string(), "connect already pending on /org/bluez/hci0");
    }

    #[test]
    fn service_state_accessors() {
        assert!(!ServiceState::default().is_present());
        let up = ServiceState::Present {
            owner: ":1.42".into(),
        };
        assert_eq!(up.owner(), Some(":1.42"));
    }

    #[test]
    fn transport_errors_clone_as_text() {
        let err = BusError::Dbus(zbus::Error::Failure("boom".into()));
        assert!(matches!(err.clone(), BusError::Transport(msg) if msg.contains("boom")));
    }

    #[test]
    fn changed_key_only_for_single_changes() {
        let ev = Event::new(
            EventKind::ElementUpdated,
            "/".into(),
            EventPayload::Changed {
                key: "Powered".into(),
                value: Some(Value::Bool(true)),
            },
        );
        assert_eq!(ev.changed_key(), Some("Powered"));
        let up = Event::new(EventKind::ServiceUp, "/".into(), EventPayload::None);
        assert_eq!(up.changed_key(), None);
    }
}
