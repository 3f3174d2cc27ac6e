//! [`BusTransport`] backed by a zbus connection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::{Connection, MatchRule, MessageStream, message};

use crate::Result;
use crate::api::config::BusKind;
use crate::api::models::BusError;
use crate::core::codec;
use crate::dbus::transport::{
    BusEvent, BusEventSender, BusEvents, BusTransport, CallId, MethodCall, PendingCall,
    SignalRule, SubscriptionHandle, SubscriptionId, WireValue, event_channel,
};

/// Runs every call and subscription as its own tokio task and reports the
/// outcome on the event channel.
///
/// Must be used from within a tokio runtime.
pub struct ZbusTransport {
    conn: Connection,
    events: BusEventSender,
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, CancellationToken>>,
}

impl ZbusTransport {
    pub fn new(conn: Connection, events: BusEventSender) -> Self {
        Self {
            conn,
            events,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a connection to the selected bus and returns the transport with
    /// the receiving end of its event channel.
    pub async fn connect(kind: BusKind) -> Result<(Arc<Self>, BusEvents)> {
        let conn = match kind {
            BusKind::System => Connection::system().await,
            BusKind::Session => Connection::session().await,
        }
        .map_err(|e| bus_unavailable(kind, e))?;
        debug!("connected to the {kind} bus");
        let (tx, rx) = event_channel();
        Ok((Arc::new(Self::new(conn, tx)), rx))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn spawn_call<F>(&self, work: F) -> PendingCall
    where
        F: Future<Output = Result<Vec<WireValue>>> + Send + 'static,
    {
        let id = CallId(self.next_id());
        let token = CancellationToken::new();
        let pending = PendingCall::new(id, token.clone());
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => Err(BusError::Canceled),
                result = work => result,
            };
            if events.send(BusEvent::Reply { call: id, result }).is_err() {
                debug!("event channel closed, dropping reply for {id}");
            }
        });

        pending
    }

    fn spawn_subscription<W, F>(&self, name: String, work: W) -> SubscriptionHandle
    where
        W: FnOnce(SubscriptionId) -> F,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = SubscriptionId(self.next_id());
        let work = work(id);
        let token = CancellationToken::new();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, token.clone());

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("{id} ({name}) released"),
                result = work => {
                    if let Err(e) = result {
                        warn!("{id} ({name}) ended: {e}");
                    }
                }
            }
        });

        SubscriptionHandle(id)
    }
}

impl BusTransport for ZbusTransport {
    fn call(&self, call: MethodCall) -> PendingCall {
        let conn = self.conn.clone();
        self.spawn_call(async move { send_call(&conn, &call).await })
    }

    fn cancel(&self, pending: &PendingCall) {
        pending.cancel();
    }

    fn subscribe_signal(&self, rule: SignalRule) -> SubscriptionHandle {
        let conn = self.conn.clone();
        let events = self.events.clone();
        let name = format!("{}.{}", rule.interface, rule.member);
        self.spawn_subscription(name, |id| forward_signals(conn, rule, id, events))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let token = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id());
        match token {
            Some(token) => token.cancel(),
            None => debug!("{} was not active", handle.id()),
        }
    }

    fn watch_name_owner(&self, bus_name: &str) -> SubscriptionHandle {
        let conn = self.conn.clone();
        let events = self.events.clone();
        let name = bus_name.to_string();
        self.spawn_subscription(format!("owner of {name}"), |id| {
            forward_owner_changes(conn, name, id, events)
        })
    }

    fn get_name_owner(&self, bus_name: &str) -> PendingCall {
        let conn = self.conn.clone();
        let name = bus_name.to_string();
        self.spawn_call(async move {
            let dbus = DBusProxy::new(&conn).await?;
            let bus_name = BusName::try_from(name.as_str()).map_err(zbus::Error::from)?;
            let owner = dbus
                .get_name_owner(bus_name)
                .await
                .map_err(zbus::Error::from)?;
            Ok(vec![WireValue::try_from(zvariant::Value::from(owner.to_string()))?])
        })
    }
}

impl Drop for ZbusTransport {
    fn drop(&mut self) {
        let subscriptions = self
            .subscriptions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, token) in subscriptions.drain() {
            token.cancel();
        }
    }
}

fn bus_unavailable(kind: BusKind, err: zbus::Error) -> BusError {
    BusError::Transport(format!("cannot reach the {kind} bus: {err}"))
}

/// Socket failures mean the message never made it out; anything else came
/// back from the peer or from zbus itself.
fn call_failed(err: zbus::Error) -> BusError {
    match err {
        zbus::Error::InputOutput(e) => BusError::Transport(format!("send failed: {e}")),
        other => BusError::Dbus(other),
    }
}

async fn send_call(conn: &Connection, call: &MethodCall) -> Result<Vec<WireValue>> {
    debug!(
        "calling {}.{} on {} ({})",
        call.interface, call.method, call.path, call.destination
    );
    let destination = Some(call.destination.as_str());
    let interface = Some(call.interface.as_str());

    let reply = match codec::encode_arguments(&call.args)? {
        Some(body) => {
            conn.call_method(destination, call.path.as_str(), interface, call.method.as_str(), &body)
                .await
                .map_err(call_failed)?
        }
        None => {
            conn.call_method(destination, call.path.as_str(), interface, call.method.as_str(), &())
                .await
                .map_err(call_failed)?
        }
    };

    codec::wire_body(&reply)
}

async fn forward_signals(
    conn: Connection,
    rule: SignalRule,
    id: SubscriptionId,
    events: BusEventSender,
) -> Result<()> {
    let match_rule = MatchRule::builder()
        .msg_type(message::Type::Signal)
        .sender(rule.sender.as_str())?
        .path(rule.path.as_str())?
        .interface(rule.interface.as_str())?
        .member(rule.member.as_str())?
        .build();

    let mut stream = MessageStream::for_match_rule(match_rule, &conn, None).await?;

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(msg) => msg,
            Err(e) => {
                warn!("error receiving {} signal: {e}", rule.member);
                continue;
            }
        };

        let args = match codec::wire_body(&message) {
            Ok(args) => args,
            Err(e) => {
                warn!("dropping unreadable {} signal: {e}", rule.member);
                continue;
            }
        };

        let path = message
            .header()
            .path()
            .map(|p| p.to_string())
            .unwrap_or_else(|| rule.path.clone());

        let event = BusEvent::Signal {
            subscription: id,
            path,
            member: rule.member.clone(),
            args,
        };
        if events.send(event).is_err() {
            break;
        }
    }

    Ok(())
}

async fn forward_owner_changes(
    conn: Connection,
    name: String,
    id: SubscriptionId,
    events: BusEventSender,
) -> Result<()> {
    let dbus = DBusProxy::new(&conn).await?;
    let mut changes = dbus.receive_name_owner_changed().await?;

    while let Some(signal) = changes.next().await {
        let args = match signal.args() {
            Ok(args) => args,
            Err(e) => {
                warn!("malformed NameOwnerChanged signal: {e}");
                continue;
            }
        };
        if args.name().as_str() != name {
            continue;
        }

        let old_owner = args
            .old_owner()
            .as_ref()
            .map(|o| o.to_string())
            .unwrap_or_default();
        let new_owner = args
            .new_owner()
            .as_ref()
            .map(|o| o.to_string())
            .unwrap_or_default();

        let event = BusEvent::NameOwnerChanged {
            subscription: id,
            name: name.clone(),
            old_owner,
            new_owner,
        };
        if events.send(event).is_err() {
            break;
        }
    }

    Ok(())
}
