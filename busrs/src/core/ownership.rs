//! Service ownership state machine.
//!
//! Tracks whether the watched name has an owner and turns raw owner-changed
//! notifications into the transitions the session acts on.

use crate::api::models::ServiceState;
use crate::dbus::{PendingCall, SubscriptionHandle};

/// What an owner-changed notification means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Absent to present.
    Enter(String),
    /// Present to absent.
    Exit,
    /// Another process took over the name.
    Replace(String),
    /// Nothing changes, e.g. a duplicate notification.
    Ignore,
}

#[derive(Debug, Default)]
pub(crate) struct Ownership {
    refcount: usize,
    state: ServiceState,
    watch: Option<SubscriptionHandle>,
    query: Option<PendingCall>,
}

impl Ownership {
    pub(crate) fn refcount(&self) -> usize {
        self.refcount
    }

    pub(crate) fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Counts one initializer; `true` on the 0 to 1 transition.
    pub(crate) fn acquire(&mut self) -> bool {
        self.refcount += 1;
        self.refcount == 1
    }

    /// Drops one initializer; `Some(true)` on the 1 to 0 transition and
    /// `None` if the count already was 0.
    pub(crate) fn release(&mut self) -> Option<bool> {
        self.refcount = self.refcount.checked_sub(1)?;
        Some(self.refcount == 0)
    }

    pub(crate) fn set_watch(&mut self, watch: SubscriptionHandle) {
        self.watch = Some(watch);
    }

    pub(crate) fn take_watch(&mut self) -> Option<SubscriptionHandle> {
        self.watch.take()
    }

    pub(crate) fn set_query(&mut self, query: PendingCall) {
        self.query = Some(query);
    }

    pub(crate) fn take_query(&mut self) -> Option<PendingCall> {
        self.query.take()
    }

    /// Clears the startup query if `id` is its reply.
    pub(crate) fn finish_query(&mut self, id: crate::dbus::CallId) -> bool {
        match &self.query {
            Some(query) if query.id() == id => {
                self.query = None;
                true
            }
            _ => false,
        }
    }

    /// Classifies a notification that the owner went from `old` to `new`.
    ///
    /// An empty `new` means the name lost its owner. Only the stored owner
    /// can leave; a stale exit naming someone else is ignored.
    pub(crate) fn classify(&self, old: &str, new: &str) -> Transition {
        match (&self.state, new.is_empty()) {
            (ServiceState::Absent, true) => Transition::Ignore,
            (ServiceState::Absent, false) => Transition::Enter(new.to_string()),
            (ServiceState::Present { owner }, true) => {
                if old.is_empty() || old == owner {
                    Transition::Exit
                } else {
                    Transition::Ignore
                }
            }
            (ServiceState::Present { owner }, false) if owner == new => Transition::Ignore,
            (ServiceState::Present { .. }, false) => Transition::Replace(new.to_string()),
        }
    }

    pub(crate) fn enter(&mut self, owner: String) {
        self.state = ServiceState::Present { owner };
    }

    pub(crate) fn exit(&mut self) {
        self.state = ServiceState::Absent;
    }
}
