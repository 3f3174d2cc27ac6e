//! Cached, strongly-typed proxies for remote D-Bus objects.
//!
//! This crate keeps a local, always-consistent copy of the objects a service
//! exposes on the bus (BlueZ adapters and devices, ConnMan services,
//! NetworkManager devices, ...) so applications read state from memory and
//! react to events instead of juggling raw messages:
//!
//! - Following whether the service is running and rebuilding the object tree
//!   whenever it (re)appears
//! - Merging bulk property fetches and single-property change signals into one
//!   cache without losing either
//! - Allowing at most one in-flight call per object and call kind
//! - Announcing every change as an ordered [`Event`]
//!
//! # Example
//!
//! ```no_run
//! use busrs::{EventKind, EventPayload, Session, SessionConfig};
//!
//! # async fn example() -> busrs::Result<()> {
//! let (mut session, mut events) = Session::connect(SessionConfig::bluez()).await?;
//!
//! session.on(EventKind::ElementUpdated, |ev| {
//!     if let EventPayload::Changed { key, value } = &ev.payload {
//!         println!("{}: {key} = {value:?}", ev.path);
//!     }
//! });
//! session.init();
//! session.run(&mut events).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Driving a session
//!
//! Nothing in this crate blocks. Method calls and subscriptions are handed to
//! a [`BusTransport`], which reports completions as [`BusEvent`]s on a
//! channel. A [`Session`] consumes that channel on one task, so the cache and
//! the event handlers never run concurrently.
//!
//! # Error Handling
//!
//! All operations return `Result<T, BusError>`. Reading a property that is not
//! cached gives [`BusError::NotFound`], reading it as the wrong type gives
//! [`BusError::TypeMismatch`], and using an element after it was removed gives
//! [`BusError::StaleReference`].
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`. For example:
//!
//! ```no_run,ignore
//! env_logger::init();
//! // ...
//! ```

// Internal implementation modules
mod util;

// Public API modules
pub mod api;
pub mod core;
pub mod dbus;
pub mod services;
pub mod types;

// Re-exported public API
pub use api::config::{
    BusKind, ChildLink, LifecycleAction, LifecycleSignal, PropertyProtocol, SessionConfig,
};
pub use api::models::{BusError, CallKind, Event, EventKind, EventPayload, ServiceState};
pub use api::session::Session;
pub use crate::core::dispatch::EventHandler;
pub use crate::core::element::{Completion, Element};
pub use dbus::{
    Argument, BusEvent, BusEvents, BusTransport, CallId, MethodCall, PendingCall, SignalRule,
    SubscriptionHandle, SubscriptionId, WireValue, ZbusTransport,
};
pub use types::value::{FromValue, PropertyKinds, PropertyMap, PropertyName, Value, ValueKind};

/// A specialized `Result` type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
