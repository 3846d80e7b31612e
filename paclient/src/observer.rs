//! Observer callback table for server-pushed notifications.
//!
//! One optional callback per [`NotificationKind`]. Registering a callback
//! both stores it and, if connected, sends a register record to the
//! server; on reconnect the control worker re-registers every kind that
//! currently has a callback installed (best-effort: failures are logged,
//! never forced into a disconnect).

use hashbrown::HashMap;
use tracing::warn;

use paclient_proto::notify::NotificationEvent;
use paclient_proto::record::NotificationKind;

type NotificationCallback = Box<dyn FnMut(NotificationEvent) + Send>;

#[derive(Default)]
pub struct ObserverOps {
    callbacks: HashMap<NotificationKind, NotificationCallback>,
}

impl ObserverOps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: NotificationKind, callback: NotificationCallback) {
        self.callbacks.insert(kind, callback);
    }

    pub fn unregister(&mut self, kind: NotificationKind) {
        self.callbacks.remove(&kind);
    }

    #[must_use]
    pub fn is_registered(&self, kind: NotificationKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    /// Every kind with a live callback, in the fixed order re-registration
    /// should use after a reconnect.
    pub fn registered_kinds(&self) -> impl Iterator<Item = NotificationKind> + '_ {
        NotificationKind::ALL.into_iter().filter(|k| self.is_registered(*k))
    }

    /// Dispatch an event to its callback, if one is registered. Silently
    /// drops events for kinds with no callback -- the server should not be
    /// pushing them, but a race during deregistration can still land one.
    pub fn dispatch(&mut self, event: NotificationEvent) {
        match self.callbacks.get_mut(&event.kind) {
            Some(callback) => callback(event),
            None => warn!(?event.kind, "notification event with no registered callback"),
        }
    }
}
