//! In-memory transport used by the integration tests.
//!
//! Records everything a session asks of the bus and lets the test play the
//! bus's part by feeding `BusEvent`s back through `Session::dispatch`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use busrs::core::codec;
use busrs::{
    BusError, BusEvent, BusTransport, CallId, Event, EventKind, MethodCall, PendingCall,
    PropertyMap, Session, SessionConfig, SignalRule, SubscriptionHandle, SubscriptionId, Value,
    ValueKind, WireValue,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<(CallId, MethodCall)>,
    canceled: Vec<CallId>,
    subscriptions: Vec<(SubscriptionId, SignalRule)>,
    unsubscribed: Vec<SubscriptionId>,
    watches: Vec<(SubscriptionId, String)>,
    owner_queries: Vec<(CallId, String)>,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    next_id: AtomicU64,
    state: Mutex<Recorded>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn calls(&self) -> Vec<(CallId, MethodCall)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls of `method` on `path`, oldest first.
    pub fn calls_to(&self, path: &str, method: &str) -> Vec<(CallId, MethodCall)> {
        self.calls()
            .into_iter()
            .filter(|(_, call)| call.path == path && call.method == method)
            .collect()
    }

    /// The most recent call of `method` on `path`.
    pub fn last_call(&self, path: &str, method: &str) -> (CallId, MethodCall) {
        self.calls_to(path, method)
            .pop()
            .unwrap_or_else(|| panic!("no {method} call on {path}"))
    }

    pub fn canceled(&self) -> Vec<CallId> {
        self.state.lock().unwrap().canceled.clone()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.state.lock().unwrap().unsubscribed.clone()
    }

    /// Signal subscriptions that have not been released.
    pub fn active_subscriptions(&self) -> Vec<(SubscriptionId, SignalRule)> {
        let state = self.state.lock().unwrap();
        state
            .subscriptions
            .iter()
            .filter(|(id, _)| !state.unsubscribed.contains(id))
            .cloned()
            .collect()
    }

    /// The live subscription for `member` signals on `path`.
    pub fn subscription(&self, path: &str, member: &str) -> SubscriptionId {
        self.active_subscriptions()
            .into_iter()
            .rev()
            .find(|(_, rule)| rule.path == path && rule.member == member)
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no subscription for {member} on {path}"))
    }

    pub fn watches(&self) -> Vec<(SubscriptionId, String)> {
        self.state.lock().unwrap().watches.clone()
    }

    pub fn watch(&self) -> SubscriptionId {
        self.watches().last().expect("no name-owner watch").0
    }

    pub fn owner_query(&self) -> CallId {
        self.state
            .lock()
            .unwrap()
            .owner_queries
            .last()
            .expect("no owner query")
            .0
    }
}

impl BusTransport for MockTransport {
    fn call(&self, call: MethodCall) -> PendingCall {
        let id = CallId(self.next());
        self.state.lock().unwrap().calls.push((id, call));
        PendingCall::new(id, CancellationToken::new())
    }

    fn cancel(&self, pending: &PendingCall) {
        pending.cancel();
        self.state.lock().unwrap().canceled.push(pending.id());
    }

    fn subscribe_signal(&self, rule: SignalRule) -> SubscriptionHandle {
        let id = SubscriptionId(self.next());
        self.state.lock().unwrap().subscriptions.push((id, rule));
        SubscriptionHandle(id)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.state.lock().unwrap().unsubscribed.push(handle.id());
    }

    fn watch_name_owner(&self, bus_name: &str) -> SubscriptionHandle {
        let id = SubscriptionId(self.next());
        self.state
            .lock()
            .unwrap()
            .watches
            .push((id, bus_name.to_string()));
        SubscriptionHandle(id)
    }

    fn get_name_owner(&self, bus_name: &str) -> PendingCall {
        let id = CallId(self.next());
        self.state
            .lock()
            .unwrap()
            .owner_queries
            .push((id, bus_name.to_string()));
        PendingCall::new(id, CancellationToken::new())
    }
}

/// Events seen by a session, in emission order.
pub type Recorder = Arc<Mutex<Vec<Event>>>;

const ALL_KINDS: [EventKind; 6] = [
    EventKind::ServiceUp,
    EventKind::ServiceDown,
    EventKind::ElementAdded,
    EventKind::ElementRemoved,
    EventKind::ElementUpdated,
    EventKind::ElementSignal,
];

/// Creates a session over a fresh mock, recording every event kind.
pub fn session(config: SessionConfig) -> (Session, Arc<MockTransport>, Recorder) {
    let transport = MockTransport::new();
    let mut session = Session::new(config, transport.clone());
    let recorder = Recorder::default();
    for kind in ALL_KINDS {
        let sink = recorder.clone();
        session.on(kind, move |event| sink.lock().unwrap().push(event.clone()));
    }
    (session, transport, recorder)
}

pub fn kinds(recorder: &Recorder) -> Vec<(EventKind, String)> {
    recorder
        .lock()
        .unwrap()
        .iter()
        .map(|event| (event.kind, event.path.to_string()))
        .collect()
}

pub fn clear(recorder: &Recorder) {
    recorder.lock().unwrap().clear();
}

pub fn dict(entries: &[(&str, Value)]) -> PropertyMap {
    entries
        .iter()
        .map(|(key, value)| (Arc::from(*key), value.clone()))
        .collect()
}

pub fn paths(paths: &[&str]) -> Value {
    Value::Array(
        paths
            .iter()
            .map(|path| Value::ObjectPath(path.to_string()))
            .collect(),
    )
}

/// Puts a value on the wire the way services do: dictionaries as `a{sv}`,
/// everything else under its natural signature.
pub fn wire(value: &Value) -> WireValue {
    let kind = match value {
        Value::Dict(_) => ValueKind::Dict(Box::new(ValueKind::Variant)),
        other => other.kind(),
    };
    let encoded = codec::encode(value, &kind).expect("encodable test value");
    WireValue::try_from(encoded).expect("owned wire value")
}

pub fn reply(call: CallId, args: Vec<Value>) -> BusEvent {
    reply_wire(call, args.iter().map(wire).collect())
}

/// A reply whose arguments were built by hand, signatures included.
pub fn reply_wire(call: CallId, args: Vec<WireValue>) -> BusEvent {
    BusEvent::Reply {
        call,
        result: Ok(args),
    }
}

/// A successful bulk property reply.
pub fn properties(call: CallId, entries: &[(&str, Value)]) -> BusEvent {
    reply(call, vec![Value::Dict(dict(entries))])
}

pub fn failure(call: CallId, error: BusError) -> BusEvent {
    BusEvent::Reply {
        call,
        result: Err(error),
    }
}

pub fn signal(subscription: SubscriptionId, path: &str, member: &str, args: Vec<Value>) -> BusEvent {
    BusEvent::Signal {
        subscription,
        path: path.to_string(),
        member: member.to_string(),
        args: args.iter().map(wire).collect(),
    }
}

pub fn owner_changed(
    subscription: SubscriptionId,
    name: &str,
    old_owner: &str,
    new_owner: &str,
) -> BusEvent {
    BusEvent::NameOwnerChanged {
        subscription,
        name: name.to_string(),
        old_owner: old_owner.to_string(),
        new_owner: new_owner.to_string(),
    }
}

/// Initializes the session and hands the service to `owner`.
pub fn bring_up(session: &mut Session, transport: &MockTransport, owner: &str) {
    session.init();
    let service = session.config().service.clone();
    session.dispatch(owner_changed(transport.watch(), &service, "", owner));
}
