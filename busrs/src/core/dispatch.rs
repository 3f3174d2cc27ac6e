//! Delivery of application events, one handler per kind.

use std::collections::HashMap;
use std::fmt;

use log::trace;

use crate::api::models::{Event, EventKind};

/// Handler invoked synchronously for every event of its kind.
pub type EventHandler = Box<dyn FnMut(&Event) + Send>;

#[derive(Default)]
pub(crate) struct Dispatcher {
    handlers: HashMap<EventKind, EventHandler>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Installs the handler for `kind`, returning the one it replaces.
    pub(crate) fn on(&mut self, kind: EventKind, handler: EventHandler) -> Option<EventHandler> {
        self.handlers.insert(kind, handler)
    }

    pub(crate) fn off(&mut self, kind: EventKind) -> Option<EventHandler> {
        self.handlers.remove(&kind)
    }

    /// Hands the event to its handler, if any, before returning.
    pub(crate) fn emit(&mut self, event: Event) {
        match self.handlers.get_mut(&event.kind) {
            Some(handler) => handler(&event),
            None => trace!("no handler for {} on {}", event.kind, event.path),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
