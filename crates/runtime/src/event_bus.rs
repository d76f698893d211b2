//! Result Bus: synchronous publish/subscribe for operation outcomes.
//!
//! Delivery contract:
//! - Handlers run synchronously inside `publish`, in subscription order.
//! - Each subscriber sees a given publish at most once.
//! - No replay: a subscriber only sees messages published after it subscribed.
//!
//! The bus is an owned handle scoped to one application instance; cloning it
//! yields another handle onto the same subscriber table.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One outcome delivered to presentation surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    /// Operation that produced this notification, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statistics: BTreeMap<String, f64>,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            operation: None,
            statistics: BTreeMap::new(),
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_statistics(mut self, statistics: BTreeMap<String, f64>) -> Self {
        self.statistics = statistics;
        self
    }
}

type Handler = Arc<Mutex<dyn FnMut(&Notification) + Send>>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

#[derive(Clone, Default)]
pub struct ResultBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl std::fmt::Debug for ResultBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ResultBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        let mut subs = self.inner.lock();
        let id = subs.next_id;
        subs.next_id += 1;
        let handler: Handler = Arc::new(Mutex::new(handler));
        subs.handlers.push((id, handler));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn publish(&self, message: impl Into<String>, severity: Severity) {
        self.publish_notification(Notification::new(message, severity));
    }

    pub fn publish_notification(&self, notification: Notification) {
        // Snapshot so handlers may publish or (un)subscribe without deadlocking.
        let handlers: Vec<(u64, Handler)> = self.inner.lock().handlers.clone();
        tracing::trace!(
            severity = ?notification.severity,
            subscribers = handlers.len(),
            "publish: {}",
            notification.message
        );
        for (id, handler) in handlers {
            if !self.is_subscribed(id) {
                continue;
            }
            // A handler that re-enters its own delivery is skipped for that
            // nested publish rather than deadlocking.
            if let Some(mut h) = handler.try_lock() {
                (&mut *h)(&notification);
            }
        }
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.inner.lock().handlers.iter().any(|(i, _)| *i == id)
    }
}

/// Handle returned by [`ResultBus::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    /// Removes the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut subs = bus.lock();
        let before = subs.handlers.len();
        subs.handlers.retain(|(i, _)| *i != self.id);
        subs.handlers.len() != before
    }
}

/// Subscriber that records every notification it sees.
///
/// Handy for tests and for headless surfaces such as the CLI.
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    entries: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationLog {
    pub fn attach(bus: &ResultBus) -> (Self, Subscription) {
        let log = Self::default();
        let sink = log.entries.clone();
        let sub = bus.subscribe(move |n| sink.lock().push(n.clone()));
        (log, sub)
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|n| n.message.clone()).collect()
    }
}
