use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, error, warn};

use crate::Result;
use crate::api::config::{BusKind, LifecycleAction, PropertyProtocol, SessionConfig};
use crate::api::models::{BusError, CallKind, Event, EventKind, EventPayload, ServiceState};
use crate::core::codec;
use crate::core::dispatch::{Dispatcher, EventHandler};
use crate::core::element::{Completion, Element};
use crate::core::ownership::{Ownership, Transition};
use crate::core::registry::Registry;
use crate::dbus::{
    Argument, BusEvent, BusEvents, BusTransport, CallId, MethodCall, SignalRule, SubscriptionId,
    WireValue, ZbusTransport,
};
use crate::types::constants::{freedesktop, legacy};
use crate::types::value::{FromValue, PropertyName, Value, ValueKind};
use crate::util::utils::try_log;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPurpose {
    /// Bulk property fetch; the reply is merged into the cache.
    Sync,
    /// Plain method call; the reply only goes to the completion.
    Call,
}

#[derive(Debug, Clone)]
enum CallRoute {
    Element {
        path: PropertyName,
        kind: CallKind,
        purpose: CallPurpose,
    },
    NameOwner,
}

#[derive(Debug, Clone)]
enum SignalRoute {
    PropertyChanged(PropertyName),
    PropertiesChanged(PropertyName),
    Lifecycle(LifecycleAction),
    Forward(PropertyName),
    NameOwner,
}

/// Cached view of one service on the bus.
///
/// A `Session` owns the element registry for its service, follows the
/// service's ownership on the bus, and turns replies and signals into
/// [`Event`]s. It is driven from a single task: every [`BusEvent`] the
/// transport produces must be handed to [`Session::dispatch`], usually
/// through [`Session::run`].
///
/// Event handlers and completions run while the session is borrowed and
/// cannot call back into it. Collect what they need and act on it after
/// `dispatch` returns.
///
/// # Example
///
/// ```no_run
/// use busrs::{EventKind, Session, SessionConfig};
///
/// # async fn example() -> busrs::Result<()> {
/// let (mut session, mut events) = Session::connect(SessionConfig::bluez()).await?;
///
/// session.on(EventKind::ElementAdded, |ev| println!("new object at {}", ev.path));
/// session.init();
/// session.run(&mut events).await;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn BusTransport>,
    ownership: Ownership,
    registry: Registry,
    dispatcher: Dispatcher,
    call_routes: HashMap<CallId, CallRoute>,
    signal_routes: HashMap<SubscriptionId, SignalRoute>,
}

impl Session {
    /// Creates an idle session over an existing transport.
    ///
    /// Nothing is sent until [`Session::init`].
    pub fn new(config: SessionConfig, transport: Arc<dyn BusTransport>) -> Self {
        Self {
            config,
            transport,
            ownership: Ownership::default(),
            registry: Registry::new(),
            dispatcher: Dispatcher::new(),
            call_routes: HashMap::new(),
            signal_routes: HashMap::new(),
        }
    }

    /// Connects to the system bus and creates a session for `config`.
    pub async fn connect(config: SessionConfig) -> Result<(Self, BusEvents)> {
        Self::connect_to(config, BusKind::System).await
    }

    /// Connects to the given bus and creates a session for `config`.
    pub async fn connect_to(config: SessionConfig, bus: BusKind) -> Result<(Self, BusEvents)> {
        let (transport, events) = ZbusTransport::connect(bus).await?;
        Ok((Self::new(config, transport), events))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &ServiceState {
        self.ownership.state()
    }

    pub fn refcount(&self) -> usize {
        self.ownership.refcount()
    }

    /// Registers one more user of the session and returns the new count.
    ///
    /// The first call starts watching the service name and asks the bus for
    /// its current owner.
    pub fn init(&mut self) -> usize {
        if self.ownership.acquire() {
            debug!("{}: watching name owner", self.config.service);
            let watch = self.transport.watch_name_owner(&self.config.service);
            self.signal_routes.insert(watch.id(), SignalRoute::NameOwner);
            self.ownership.set_watch(watch);

            let query = self.transport.get_name_owner(&self.config.service);
            self.call_routes.insert(query.id(), CallRoute::NameOwner);
            self.ownership.set_query(query);
        }
        self.ownership.refcount()
    }

    /// Unregisters one user and returns the new count.
    ///
    /// The last call tears down every element and releases the name watch.
    /// Calling it more often than [`Session::init`] is logged and returns 0.
    pub fn shutdown(&mut self) -> usize {
        match self.ownership.release() {
            None => {
                error!(
                    "{}: shutdown called without a matching init",
                    self.config.service
                );
                0
            }
            Some(false) => self.ownership.refcount(),
            Some(true) => {
                if self.ownership.state().is_present() {
                    self.exit();
                } else {
                    self.remove_all();
                }
                if let Some(watch) = self.ownership.take_watch() {
                    self.signal_routes.remove(&watch.id());
                    self.transport.unsubscribe(watch);
                }
                if let Some(query) = self.ownership.take_query() {
                    self.call_routes.remove(&query.id());
                    self.transport.cancel(&query);
                }
                debug!("{}: session released", self.config.service);
                0
            }
        }
    }

    /// Installs the handler for one event kind, returning the one it replaces.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> Option<EventHandler>
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.dispatcher.on(kind, Box::new(handler))
    }

    pub fn off(&mut self, kind: EventKind) -> Option<EventHandler> {
        self.dispatcher.off(kind)
    }

    pub fn element_get(&self, path: &str) -> Option<&Element> {
        self.registry.get(path)
    }

    /// Returns the element at `path`, creating it without any bus I/O.
    ///
    /// Follow up with [`Session::sync_properties`] to populate it.
    pub fn element_get_or_create(&mut self, path: &str, interface: &str) -> &Element {
        let (element, _) = self
            .registry
            .get_or_create(path, |key| Element::new(key, interface));
        element
    }

    /// Removes an element and every element discovered through it.
    ///
    /// Pending calls are canceled and their completions receive
    /// [`BusError::Canceled`]. `ElementRemoved` is emitted once the path no
    /// longer resolves. Returns `false` if nothing was registered at `path`.
    pub fn element_remove(&mut self, path: &str) -> bool {
        if !self.registry.contains(path) {
            return false;
        }
        let children: Vec<PropertyName> = self
            .registry
            .iter()
            .filter(|el| el.parent() == Some(path))
            .map(|el| el.path_name().clone())
            .collect();
        for child in children {
            self.element_remove(&child);
        }

        let Some(element) = self.registry.remove(path) else {
            return false;
        };
        let key = element.path_name().clone();
        let released = element.release(self.transport.as_ref());
        for id in &released.calls {
            self.call_routes.remove(id);
        }
        for id in &released.subscriptions {
            self.signal_routes.remove(id);
        }
        debug!("{key}: removed");

        self.emit(
            EventKind::ElementRemoved,
            key,
            EventPayload::Snapshot(released.snapshot),
        );
        for completion in released.completions {
            completion(Err(BusError::Canceled));
        }
        true
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.registry.iter()
    }

    pub fn paths(&self) -> Vec<PropertyName> {
        self.registry.paths()
    }

    /// Reads a cached property.
    ///
    /// Fails with `StaleReference` for an unknown path and `NotFound` for a
    /// property the element does not carry.
    pub fn property_get_typed(&self, path: &str, name: &str) -> Result<&Value> {
        self.element(path)?.property(name)
    }

    /// Reads a cached property as `T`.
    pub fn property_get<T: FromValue>(&self, path: &str, name: &str) -> Result<T> {
        self.element(path)?.property_as(name)
    }

    /// Writes a property on the server under the signature the service last
    /// sent it with, so an empty `as` stays `as` and an `a{sv}` of strings
    /// stays `a{sv}`.
    ///
    /// The cache is not touched; the service's change signal updates it.
    pub fn property_set(
        &mut self,
        path: &str,
        name: &str,
        value: Value,
        completion: Option<Completion>,
    ) -> Result<()> {
        let kind = self.element(path)?.signature(name)?.clone();
        self.property_set_with_kind(path, name, value, kind, completion)
    }

    /// Writes a property with an explicit signature.
    pub fn property_set_with_kind(
        &mut self,
        path: &str,
        name: &str,
        value: Value,
        kind: ValueKind,
        completion: Option<Completion>,
    ) -> Result<()> {
        codec::encode(&value, &kind)?;
        let protocol = self.config.protocol;
        let name = name.to_string();
        self.start_call(
            path,
            CallKind::PROPERTY_SET,
            CallPurpose::Call,
            completion,
            move |element, destination| match protocol {
                PropertyProtocol::Legacy => MethodCall::new(
                    destination,
                    element.path(),
                    element.interface(),
                    legacy::SET_PROPERTY,
                )
                .with_args(vec![Argument::new(name), Argument::variant(value, kind)]),
                PropertyProtocol::Freedesktop => MethodCall::new(
                    destination,
                    element.path(),
                    freedesktop::PROPERTIES_INTERFACE,
                    freedesktop::SET,
                )
                .with_args(vec![
                    Argument::new(element.interface()),
                    Argument::new(name),
                    Argument::variant(value, kind),
                ]),
            },
        )
    }

    /// Calls a method on the element's own interface.
    ///
    /// Fails with `AlreadyPending` while a call of the same kind is in flight
    /// on this element.
    pub fn call_method(
        &mut self,
        path: &str,
        kind: CallKind,
        method: &str,
        args: Vec<Argument>,
        completion: Option<Completion>,
    ) -> Result<()> {
        let method = method.to_string();
        self.start_call(path, kind, CallPurpose::Call, completion, move |element, dest| {
            MethodCall::new(dest, element.path(), element.interface(), method).with_args(args)
        })
    }

    /// Calls a method on another interface implemented by the same object.
    pub fn call_method_on(
        &mut self,
        path: &str,
        interface: &str,
        kind: CallKind,
        method: &str,
        args: Vec<Argument>,
        completion: Option<Completion>,
    ) -> Result<()> {
        let interface = interface.to_string();
        let method = method.to_string();
        self.start_call(path, kind, CallPurpose::Call, completion, move |element, dest| {
            MethodCall::new(dest, element.path(), interface, method).with_args(args)
        })
    }

    pub fn is_pending(&self, path: &str, kind: CallKind) -> bool {
        self.registry
            .get(path)
            .is_some_and(|element| element.is_pending(kind))
    }

    /// Issues a bulk property fetch for one element.
    ///
    /// The reply is merged into the cache and announced as `ElementAdded` on
    /// the first successful sync, `ElementUpdated` afterwards.
    pub fn sync_properties(&mut self, path: &str) -> Result<()> {
        self.sync_properties_with(path, None)
    }

    /// Like [`Session::sync_properties`], also reporting the raw reply.
    pub fn sync_properties_with(
        &mut self,
        path: &str,
        completion: Option<Completion>,
    ) -> Result<()> {
        self.element(path)?
            .ensure_admissible(CallKind::PROPERTIES_GET)?;
        self.subscribe_property_changes(path)?;

        let protocol = self.config.protocol;
        self.start_call(
            path,
            CallKind::PROPERTIES_GET,
            CallPurpose::Sync,
            completion,
            move |element, destination| match protocol {
                PropertyProtocol::Legacy => MethodCall::new(
                    destination,
                    element.path(),
                    element.interface(),
                    legacy::GET_PROPERTIES,
                ),
                PropertyProtocol::Freedesktop => MethodCall::new(
                    destination,
                    element.path(),
                    freedesktop::PROPERTIES_INTERFACE,
                    freedesktop::GET_ALL,
                )
                .with_args(vec![Argument::new(element.interface())]),
            },
        )
    }

    /// Re-fetches the root element, cascading to its children.
    pub fn sync_elements(&mut self) -> Result<()> {
        self.ensure_present()?;
        let root = self.config.root_path.clone();
        self.sync_properties(&root)
    }

    /// Forwards `interface.member` signals from the element as
    /// `ElementSignal` events until the element is removed.
    pub fn subscribe_element_signal(
        &mut self,
        path: &str,
        interface: &str,
        member: &str,
    ) -> Result<()> {
        self.ensure_present()?;
        let destination = self.destination();
        let element = self
            .registry
            .get_mut(path)
            .ok_or_else(|| BusError::StaleReference(path.to_string()))?;
        if element.has_subscription(member) {
            return Ok(());
        }
        let handle = self
            .transport
            .subscribe_signal(SignalRule::new(destination, path, interface, member));
        self.signal_routes
            .insert(handle.id(), SignalRoute::Forward(element.path_name().clone()));
        element.add_subscription(member, handle);
        Ok(())
    }

    /// Applies a single property change and announces it.
    pub fn apply_property_changed(&mut self, path: &str, name: &str, value: Value) -> Result<()> {
        self.store_change(path, name, value, None)
    }

    fn store_change(
        &mut self,
        path: &str,
        name: &str,
        value: Value,
        kind: Option<ValueKind>,
    ) -> Result<()> {
        let element = self
            .registry
            .get_mut(path)
            .ok_or_else(|| BusError::StaleReference(path.to_string()))?;
        let key = element.set_property(name.into(), value.clone(), kind);
        let path = element.path_name().clone();

        self.emit(
            EventKind::ElementUpdated,
            path.clone(),
            EventPayload::Changed {
                key: key.clone(),
                value: Some(value),
            },
        );
        self.cascade(&path, Some(&*key));
        Ok(())
    }

    /// Handles one completion from the transport.
    pub fn dispatch(&mut self, event: BusEvent) {
        match event {
            BusEvent::Reply { call, result } => self.handle_reply(call, result),
            BusEvent::Signal {
                subscription,
                path,
                member,
                args,
            } => self.handle_signal(subscription, &path, member, args),
            BusEvent::NameOwnerChanged {
                subscription,
                name,
                old_owner,
                new_owner,
            } => self.handle_owner_changed(subscription, &name, &old_owner, &new_owner),
        }
    }

    /// Dispatches transport events until the channel closes.
    pub async fn run(&mut self, events: &mut BusEvents) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        debug!("{}: event channel closed", self.config.service);
    }

    fn element(&self, path: &str) -> Result<&Element> {
        self.registry
            .get(path)
            .ok_or_else(|| BusError::StaleReference(path.to_string()))
    }

    /// Element traffic is refused while nobody owns the service name.
    fn ensure_present(&self) -> Result<()> {
        if self.ownership.state().is_present() {
            Ok(())
        } else {
            Err(BusError::StaleReference(self.config.service.clone()))
        }
    }

    /// Calls go to the unique name of the current owner when one is known.
    fn destination(&self) -> String {
        self.ownership
            .state()
            .owner()
            .unwrap_or(&self.config.service)
            .to_string()
    }

    fn emit(&mut self, kind: EventKind, path: PropertyName, payload: EventPayload) {
        self.dispatcher.emit(Event::new(kind, path, payload));
    }

    fn start_call<F>(
        &mut self,
        path: &str,
        kind: CallKind,
        purpose: CallPurpose,
        completion: Option<Completion>,
        build: F,
    ) -> Result<()>
    where
        F: FnOnce(&Element, &str) -> MethodCall,
    {
        self.ensure_present()?;
        let destination = self.destination();
        let element = self
            .registry
            .get_mut(path)
            .ok_or_else(|| BusError::StaleReference(path.to_string()))?;
        element.ensure_admissible(kind)?;

        let pending = self.transport.call(build(element, &destination));
        self.call_routes.insert(
            pending.id(),
            CallRoute::Element {
                path: element.path_name().clone(),
                kind,
                purpose,
            },
        );
        element.track(kind, pending, completion);
        Ok(())
    }

    fn subscribe_property_changes(&mut self, path: &str) -> Result<()> {
        self.ensure_present()?;
        let destination = self.destination();
        let protocol = self.config.protocol;
        let element = self
            .registry
            .get_mut(path)
            .ok_or_else(|| BusError::StaleReference(path.to_string()))?;

        let (interface, member) = match protocol {
            PropertyProtocol::Legacy => (element.interface(), legacy::PROPERTY_CHANGED),
            PropertyProtocol::Freedesktop => (
                freedesktop::PROPERTIES_INTERFACE,
                freedesktop::PROPERTIES_CHANGED,
            ),
        };
        if element.has_subscription(member) {
            return Ok(());
        }

        let rule = SignalRule::new(destination, path, interface, member);
        let handle = self.transport.subscribe_signal(rule);
        let key = element.path_name().clone();
        let route = match protocol {
            PropertyProtocol::Legacy => SignalRoute::PropertyChanged(key),
            PropertyProtocol::Freedesktop => SignalRoute::PropertiesChanged(key),
        };
        self.signal_routes.insert(handle.id(), route);
        element.add_subscription(member, handle);
        Ok(())
    }

    fn handle_reply(&mut self, call: CallId, result: Result<Vec<WireValue>>) {
        let Some(route) = self.call_routes.remove(&call) else {
            debug!("ignoring reply to untracked {call}");
            return;
        };

        match route {
            CallRoute::NameOwner => {
                if !self.ownership.finish_query(call) {
                    return;
                }
                match result.and_then(|args| codec::decode_all(&args)) {
                    Ok(args) => match args.first().and_then(Value::as_str) {
                        Some(owner) if !owner.is_empty() => {
                            let owner = owner.to_string();
                            self.owner_changed("", &owner);
                        }
                        _ => warn!("{}: owner query returned no name", self.config.service),
                    },
                    Err(e) => debug!("{}: not running yet ({e})", self.config.service),
                }
            }
            CallRoute::Element {
                path,
                kind,
                purpose,
            } => {
                let Some(slot) = self
                    .registry
                    .get_mut(&path)
                    .and_then(|element| element.take_pending(kind, call))
                else {
                    debug!("{path}: dropping stale reply to {kind}");
                    return;
                };
                match purpose {
                    CallPurpose::Sync => self.finish_sync(&path, result, slot.completion),
                    CallPurpose::Call => {
                        let result = result.and_then(|args| codec::decode_all(&args));
                        if let Err(e) = &result {
                            debug!("{path}: {kind} failed: {e}");
                        }
                        if let Some(completion) = slot.completion {
                            completion(result);
                        }
                    }
                }
            }
        }
    }

    fn finish_sync(
        &mut self,
        path: &PropertyName,
        result: Result<Vec<WireValue>>,
        completion: Option<Completion>,
    ) {
        let synced = result.and_then(|wire| {
            let (props, kinds) = codec::properties_from_wire(&wire)?;
            Ok((props, kinds, codec::decode_all(&wire)?))
        });

        match synced {
            Ok((props, kinds, args)) => {
                if let Some(element) = self.registry.get_mut(path) {
                    let first = element.merge(props, kinds);
                    let snapshot = element.properties().clone();
                    let kind = if first {
                        EventKind::ElementAdded
                    } else {
                        EventKind::ElementUpdated
                    };
                    self.emit(kind, path.clone(), EventPayload::Snapshot(snapshot));
                    self.cascade(path, None);
                }
                if let Some(completion) = completion {
                    completion(Ok(args));
                }
            }
            Err(e) => {
                warn!("{path}: property sync failed: {e}");
                if let Some(completion) = completion {
                    completion(Err(e));
                }
            }
        }
    }

    /// Creates and syncs the elements named by the child-link properties of
    /// `path`, restricted to `changed` when only one key changed.
    fn cascade(&mut self, path: &PropertyName, changed: Option<&str>) {
        let Some(element) = self.registry.get(path) else {
            return;
        };
        let Some(depth) = element.depth().checked_add(1) else {
            return;
        };
        if depth > self.config.max_depth {
            return;
        }

        let mut found: Vec<(String, String)> = Vec::new();
        for link in self.config.children_of(element.interface()) {
            if changed.is_some_and(|key| key != link.property) {
                continue;
            }
            let Some(value) = element.properties().get(link.property.as_str()) else {
                continue;
            };
            for child in value.object_paths() {
                if !self.registry.contains(child) {
                    found.push((child.to_string(), link.child_interface.clone()));
                }
            }
        }

        for (child, interface) in found {
            self.adopt(&child, &interface, path, depth);
        }
    }

    fn adopt(&mut self, path: &str, interface: &str, parent: &PropertyName, depth: u8) {
        let (_, created) = self.registry.get_or_create(path, |key| {
            Element::new(key, interface).with_parent(parent.clone(), depth)
        });
        if !created {
            return;
        }
        debug!("{path}: discovered through {parent} at depth {depth}");
        try_log!(
            self.sync_properties(path),
            format!("{path}: could not start property sync")
        );
    }

    fn handle_signal(
        &mut self,
        subscription: SubscriptionId,
        path: &str,
        member: String,
        args: Vec<WireValue>,
    ) {
        let Some(route) = self.signal_routes.get(&subscription).cloned() else {
            debug!("ignoring {member} on {path} for released {subscription}");
            return;
        };

        match route {
            SignalRoute::PropertyChanged(target) => {
                let [name, value] = args.as_slice() else {
                    warn!("{target}: malformed {member} signal");
                    return;
                };
                let change = codec::decode(name)
                    .and_then(|name| Ok((name, codec::decode_typed(value)?)));
                match change {
                    Ok((Value::Str(name), (value, kind))) => {
                        if let Err(e) = self.store_change(&target, &name, value, Some(kind)) {
                            debug!("{target}: dropping {name} change: {e}");
                        }
                    }
                    Ok(_) => warn!("{target}: malformed {member} signal"),
                    Err(e) => warn!("{target}: dropping {member} signal: {e}"),
                }
            }
            SignalRoute::PropertiesChanged(target) => self.apply_properties_changed(&target, &args),
            SignalRoute::Lifecycle(action) => match codec::decode_all(&args) {
                Ok(args) => self.apply_lifecycle(action, &member, args),
                Err(e) => warn!("dropping {member} signal from {path}: {e}"),
            },
            SignalRoute::Forward(target) => {
                if !self.registry.contains(&target) {
                    return;
                }
                match codec::decode_all(&args) {
                    Ok(args) => self.emit(
                        EventKind::ElementSignal,
                        target,
                        EventPayload::Signal { member, args },
                    ),
                    Err(e) => warn!("{target}: dropping {member} signal: {e}"),
                }
            }
            SignalRoute::NameOwner => warn!("{subscription} delivered {member} as a plain signal"),
        }
    }

    fn apply_properties_changed(&mut self, path: &PropertyName, args: &[WireValue]) {
        let [interface, changed, rest @ ..] = args else {
            warn!("{path}: malformed PropertiesChanged signal");
            return;
        };
        let decoded = codec::decode(interface).and_then(|interface| {
            let (changed, kinds) = codec::decode_properties(changed)?;
            let invalidated = match rest.first() {
                Some(wire) => codec::decode(wire)?,
                None => Value::Array(Vec::new()),
            };
            Ok((interface, changed, kinds, invalidated))
        });
        let (interface, changed, mut kinds, invalidated) = match decoded {
            Ok((Value::Str(interface), changed, kinds, Value::Array(invalidated))) => {
                (interface, changed, kinds, invalidated)
            }
            Ok(_) => {
                warn!("{path}: malformed PropertiesChanged signal");
                return;
            }
            Err(e) => {
                warn!("{path}: dropping PropertiesChanged signal: {e}");
                return;
            }
        };

        match self.registry.get(path) {
            Some(element) if element.interface() == interface => {}
            Some(_) => return,
            None => {
                debug!("{path}: change for removed element");
                return;
            }
        }

        for (key, value) in changed {
            let kind = kinds.remove(&key);
            if let Err(e) = self.store_change(path, &key, value, kind) {
                debug!("{path}: dropping {key} change: {e}");
            }
        }

        for name in invalidated.iter().filter_map(Value::as_str) {
            let Some(element) = self.registry.get_mut(path) else {
                return;
            };
            if let Some((key, _)) = element.remove_property(name) {
                self.emit(
                    EventKind::ElementUpdated,
                    path.clone(),
                    EventPayload::Changed { key, value: None },
                );
            }
        }
    }

    fn apply_lifecycle(&mut self, action: LifecycleAction, member: &str, args: Vec<Value>) {
        let Some(target) = args.first().and_then(Value::as_object_path) else {
            warn!("{member} without an object path");
            return;
        };
        let target = target.to_string();

        match action {
            LifecycleAction::Added(interface) => {
                if self.config.max_depth == 0 {
                    return;
                }
                let root = PropertyName::from(self.config.root_path.as_str());
                if !self.registry.contains(&root) {
                    return;
                }
                self.adopt(&target, &interface, &root, 1);
            }
            LifecycleAction::Removed => {
                if !self.element_remove(&target) {
                    debug!("{member}: {target} was not registered");
                }
            }
        }
    }

    fn handle_owner_changed(
        &mut self,
        subscription: SubscriptionId,
        name: &str,
        old_owner: &str,
        new_owner: &str,
    ) {
        if !matches!(
            self.signal_routes.get(&subscription),
            Some(SignalRoute::NameOwner)
        ) || name != self.config.service
        {
            debug!("ignoring owner change of {name} on {subscription}");
            return;
        }
        self.owner_changed(old_owner, new_owner);
    }

    fn owner_changed(&mut self, old_owner: &str, new_owner: &str) {
        match self.ownership.classify(old_owner, new_owner) {
            Transition::Enter(owner) => self.enter(owner),
            Transition::Exit => self.exit(),
            Transition::Replace(owner) => {
                self.exit();
                self.enter(owner);
            }
            Transition::Ignore => debug!(
                "{}: owner change {old_owner:?} -> {new_owner:?} ignored",
                self.config.service
            ),
        }
    }

    fn enter(&mut self, owner: String) {
        debug!("{}: owned by {owner}", self.config.service);
        self.ownership.enter(owner.clone());

        let root = self.config.root_path.clone();
        let interface = self.config.root_interface.clone();
        self.registry
            .get_or_create(&root, |key| Element::new(key, interface));
        self.subscribe_lifecycle(&root);
        try_log!(
            self.sync_properties(&root),
            format!("{root}: could not start property sync")
        );

        self.emit(
            EventKind::ServiceUp,
            PropertyName::from(root.as_str()),
            EventPayload::Owner(owner),
        );
    }

    fn subscribe_lifecycle(&mut self, root: &str) {
        let destination = self.destination();
        let Some(element) = self.registry.get_mut(root) else {
            return;
        };
        for signal in &self.config.lifecycle {
            if element.has_subscription(&signal.member) {
                continue;
            }
            let rule = SignalRule::new(
                destination.as_str(),
                root,
                signal.interface.as_str(),
                signal.member.as_str(),
            );
            let handle = self.transport.subscribe_signal(rule);
            self.signal_routes
                .insert(handle.id(), SignalRoute::Lifecycle(signal.action.clone()));
            element.add_subscription(signal.member.as_str(), handle);
        }
    }

    /// Tears down every element, then reports the service gone.
    fn exit(&mut self) {
        debug!("{}: lost its owner", self.config.service);
        self.remove_all();
        self.ownership.exit();
        let root = PropertyName::from(self.config.root_path.as_str());
        self.emit(EventKind::ServiceDown, root, EventPayload::None);
    }

    fn remove_all(&mut self) {
        if self.registry.is_empty() {
            debug!("{}: no elements to tear down", self.config.service);
            return;
        }
        for path in self.registry.paths() {
            self.element_remove(&path);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("service", &self.config.service)
            .field("state", self.ownership.state())
            .field("refcount", &self.ownership.refcount())
            .field("elements", &self.registry.len())
            .finish()
    }
}
