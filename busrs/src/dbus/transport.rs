//! The seam between the element layer and the message bus.
//!
//! Every operation here returns immediately. Results come back later as
//! [`BusEvent`]s on the channel the transport was built with, and the
//! [`Session`](crate::Session) consumes them one at a time.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::types::value::{Value, ValueKind};

/// An argument as it arrived on the bus, signature included.
///
/// Decoding into [`Value`] happens in the session so the signature of each
/// property survives into the cache.
pub type WireValue = zvariant::OwnedValue;

/// Identifies one in-flight method call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Identifies one signal or name-owner subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Handle to a method call whose reply has not arrived yet.
///
/// Cancelling the token revokes the call: the transport stops waiting and
/// reports [`BusError::Canceled`](crate::BusError::Canceled) instead of the reply.
#[derive(Debug, Clone)]
pub struct PendingCall {
    id: CallId,
    token: CancellationToken,
}

impl PendingCall {
    pub fn new(id: CallId, token: CancellationToken) -> Self {
        Self { id, token }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Handle to an active subscription, released with [`BusTransport::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub SubscriptionId);

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.0
    }
}

/// One method argument together with the signature it is sent with.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub value: Value,
    pub kind: ValueKind,
    /// Box the encoded value into a `v` on the wire.
    pub variant: bool,
}

impl Argument {
    /// Sends the value with its natural signature.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        let kind = value.kind();
        Self {
            value,
            kind,
            variant: false,
        }
    }

    /// Sends the value with an explicit signature.
    pub fn typed(value: impl Into<Value>, kind: ValueKind) -> Self {
        Self {
            value: value.into(),
            kind,
            variant: false,
        }
    }

    /// Sends the value as a variant holding `kind`.
    pub fn variant(value: impl Into<Value>, kind: ValueKind) -> Self {
        Self {
            value: value.into(),
            kind,
            variant: true,
        }
    }

    /// Sends an object path argument.
    pub fn object_path(path: impl Into<String>) -> Self {
        Self::new(Value::ObjectPath(path.into()))
    }
}

/// A method call addressed to one remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub method: String,
    pub args: Vec<Argument>,
}

impl MethodCall {
    pub fn new(
        destination: impl Into<String>,
        path: impl Into<String>,
        interface: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            path: path.into(),
            interface: interface.into(),
            method: method.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<Argument>) -> Self {
        self.args = args;
        self
    }
}

/// Which signals a subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalRule {
    /// Bus name the signal must come from.
    pub sender: String,
    pub path: String,
    pub interface: String,
    pub member: String,
}

impl SignalRule {
    pub fn new(
        sender: impl Into<String>,
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
        }
    }
}

/// A completion delivered by the transport.
#[derive(Debug)]
pub enum BusEvent {
    /// A method call finished, failed, or was canceled.
    Reply {
        call: CallId,
        result: Result<Vec<WireValue>>,
    },
    /// A signal matched a subscription.
    Signal {
        subscription: SubscriptionId,
        path: String,
        member: String,
        args: Vec<WireValue>,
    },
    /// The owner of a watched name changed; empty strings mean no owner.
    NameOwnerChanged {
        subscription: SubscriptionId,
        name: String,
        old_owner: String,
        new_owner: String,
    },
}

pub type BusEventSender = mpsc::UnboundedSender<BusEvent>;
pub type BusEvents = mpsc::UnboundedReceiver<BusEvent>;

/// Creates the channel a transport reports completions on.
pub fn event_channel() -> (BusEventSender, BusEvents) {
    mpsc::unbounded_channel()
}

/// Non-blocking access to a message bus.
///
/// Implementations must never block the caller; every outcome is reported
/// through the event channel.
pub trait BusTransport: Send + Sync {
    /// Sends a method call.
    fn call(&self, call: MethodCall) -> PendingCall;

    /// Revokes a pending call. Cancelling a finished call does nothing.
    fn cancel(&self, pending: &PendingCall);

    /// Starts delivering signals that match `rule`.
    fn subscribe_signal(&self, rule: SignalRule) -> SubscriptionHandle;

    /// Stops a signal or name-owner subscription.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Reports every ownership change of `bus_name`.
    fn watch_name_owner(&self, bus_name: &str) -> SubscriptionHandle;

    /// Asks for the current owner of `bus_name`. The reply carries the unique
    /// name as a single string, or an error when the name has no owner.
    fn get_name_owner(&self, bus_name: &str) -> PendingCall;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_call_cancel_is_visible_through_clones() {
        let call = PendingCall::new(CallId(3), CancellationToken::new());
        let copy = call.clone();
        assert!(!copy.is_canceled());
        call.cancel();
        assert!(copy.is_canceled());
        assert_eq!(copy.id(), CallId(3));
    }

    #[test]
    fn natural_argument_kind() {
        let arg = Argument::new("Powered");
        assert_eq!(arg.kind, ValueKind::Str);
        assert!(!arg.variant);
        assert_eq!(Argument::object_path("/a").kind, ValueKind::ObjectPath);
    }
}
