//! Cached proxy for one remote object.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::Result;
use crate::api::models::{BusError, CallKind};
use crate::dbus::{BusTransport, CallId, PendingCall, SubscriptionHandle, SubscriptionId};
use crate::types::value::{FromValue, PropertyKinds, PropertyMap, PropertyName, Value, ValueKind};

/// Callback run once with the outcome of a method call.
pub type Completion = Box<dyn FnOnce(Result<Vec<Value>>) + Send>;

/// One occupied admission slot.
pub(crate) struct PendingSlot {
    pub(crate) call: PendingCall,
    pub(crate) completion: Option<Completion>,
}

impl fmt::Debug for PendingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSlot")
            .field("call", &self.call.id())
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

/// What is left of an element after it has been released.
pub(crate) struct Released {
    pub(crate) snapshot: PropertyMap,
    pub(crate) calls: Vec<CallId>,
    pub(crate) subscriptions: Vec<SubscriptionId>,
    pub(crate) completions: Vec<Completion>,
}

/// Property cache, admission table, and subscriptions of one remote object.
///
/// Identity (`path`, `interface`) never changes. An element is only ever
/// reachable through the registry; once released it is gone.
#[derive(Debug)]
pub struct Element {
    path: PropertyName,
    interface: String,
    properties: PropertyMap,
    kinds: PropertyKinds,
    pending: HashMap<CallKind, PendingSlot>,
    subscriptions: HashMap<String, SubscriptionHandle>,
    parent: Option<PropertyName>,
    depth: u8,
    synced: bool,
}

impl Element {
    pub(crate) fn new(path: PropertyName, interface: impl Into<String>) -> Self {
        Self {
            path,
            interface: interface.into(),
            properties: PropertyMap::new(),
            kinds: PropertyKinds::new(),
            pending: HashMap::new(),
            subscriptions: HashMap::new(),
            parent: None,
            depth: 0,
            synced: false,
        }
    }

    pub(crate) fn with_parent(mut self, parent: PropertyName, depth: u8) -> Self {
        self.parent = Some(parent);
        self.depth = depth;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn path_name(&self) -> &PropertyName {
        &self.path
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Path of the element this one was discovered through. Lookup only.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Distance from the root element.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Whether a bulk property fetch has completed at least once.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Result<&Value> {
        self.properties
            .get(name)
            .ok_or_else(|| BusError::NotFound(name.to_string()))
    }

    /// Signature the property was last received with.
    pub fn signature(&self, name: &str) -> Result<&ValueKind> {
        self.kinds
            .get(name)
            .ok_or_else(|| BusError::NotFound(name.to_string()))
    }

    /// Reads a property as `T`, failing with `TypeMismatch` on a different tag.
    pub fn property_as<T: FromValue>(&self, name: &str) -> Result<T> {
        T::try_from_value(self.property(name)?)
    }

    pub fn is_pending(&self, kind: CallKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub(crate) fn ensure_admissible(&self, kind: CallKind) -> Result<()> {
        if self.is_pending(kind) {
            return Err(BusError::AlreadyPending {
                path: self.path.to_string(),
                kind,
            });
        }
        Ok(())
    }

    pub(crate) fn track(&mut self, kind: CallKind, call: PendingCall, completion: Option<Completion>) {
        debug!("{}: {kind} admitted as {}", self.path, call.id());
        self.pending.insert(kind, PendingSlot { call, completion });
    }

    /// Frees the slot for `kind` if it still holds call `id`.
    pub(crate) fn take_pending(&mut self, kind: CallKind, id: CallId) -> Option<PendingSlot> {
        match self.pending.get(&kind) {
            Some(slot) if slot.call.id() == id => self.pending.remove(&kind),
            _ => None,
        }
    }

    /// Merges a bulk property dictionary.
    ///
    /// Keys in `props` overwrite cached ones, keys absent from `props` stay.
    /// Returns `true` if this was the first successful sync.
    pub(crate) fn merge(&mut self, props: PropertyMap, mut kinds: PropertyKinds) -> bool {
        for (key, value) in props {
            let kind = kinds.remove(&key);
            self.set_property(key, value, kind);
        }
        let first = !self.synced;
        self.synced = true;
        first
    }

    /// Writes one property, last write wins. Returns the key as stored.
    ///
    /// Without a wire signature the previous one is kept while it still
    /// accepts the value; otherwise the value's natural kind is recorded.
    pub(crate) fn set_property(
        &mut self,
        name: PropertyName,
        value: Value,
        kind: Option<ValueKind>,
    ) -> PropertyName {
        let key = match self.properties.get_key_value(&*name) {
            Some((existing, _)) => existing.clone(),
            None => name,
        };
        let kind = match (kind, self.kinds.remove(&key)) {
            (Some(kind), _) => kind,
            (None, Some(previous)) if previous.accepts(&value) => previous,
            (None, _) => value.kind(),
        };
        self.kinds.insert(key.clone(), kind);
        self.properties.insert(key.clone(), value);
        key
    }

    pub(crate) fn remove_property(&mut self, name: &str) -> Option<(PropertyName, Value)> {
        self.kinds.remove(name);
        self.properties.remove_entry(name)
    }

    pub fn has_subscription(&self, member: &str) -> bool {
        self.subscriptions.contains_key(member)
    }

    pub(crate) fn add_subscription(&mut self, member: impl Into<String>, handle: SubscriptionHandle) {
        self.subscriptions.insert(member.into(), handle);
    }

    /// Cancels every pending call and drops every subscription.
    ///
    /// Completions of the canceled calls are handed back so the caller can
    /// report them once the element is no longer reachable.
    pub(crate) fn release(self, transport: &dyn BusTransport) -> Released {
        let mut calls = Vec::with_capacity(self.pending.len());
        let mut completions = Vec::new();
        for (kind, slot) in self.pending {
            debug!("{}: canceling pending {kind}", self.path);
            transport.cancel(&slot.call);
            calls.push(slot.call.id());
            if let Some(completion) = slot.completion {
                completions.push(completion);
            }
        }
        let mut subscriptions = Vec::with_capacity(self.subscriptions.len());
        for (_, handle) in self.subscriptions {
            transport.unsubscribe(handle);
            subscriptions.push(handle.id());
        }
        Released {
            snapshot: self.properties,
            calls,
            subscriptions,
            completions,
        }
    }
}
