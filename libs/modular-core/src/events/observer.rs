//! Observer subject: filtered event fan-out without holding locks.
//!
//! Observers are identified by id; the subject owns the registration list
//! and resolves observers at notification time, so neither side keeps a
//! back-pointer to the other. Fan-out takes a snapshot of the list under a
//! read lock, releases it, then invokes the observers one by one in
//! registration order. Observer failures are logged and isolated.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use async_trait::async_trait;

use super::CloudEvent;

#[async_trait]
pub trait Observer: Send + Sync {
    /// Stable identifier, unique within one subject.
    fn id(&self) -> &str;

    async fn on_event(&self, event: &CloudEvent) -> anyhow::Result<()>;
}

struct Registration {
    observer: Arc<dyn Observer>,
    /// Event types this observer wants; empty means all.
    filter: Vec<String>,
    registered_at: DateTime<Utc>,
}

impl Registration {
    fn wants(&self, event_type: &str) -> bool {
        self.filter.is_empty() || self.filter.iter().any(|f| f == event_type)
    }
}

/// Shared subject all framework and user events flow through.
pub struct ObserverSubject {
    source: Arc<str>,
    observers: RwLock<Vec<Registration>>,
}

impl ObserverSubject {
    /// `source` becomes the CloudEvents source of events built via
    /// [`emit`](Self::emit).
    #[must_use]
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer with an optional event-type filter (empty means
    /// all events). Re-registering the same id replaces the previous
    /// registration in place, keeping its position.
    pub fn register_observer(
        &self,
        observer: Arc<dyn Observer>,
        filter: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let filter: Vec<String> = filter.into_iter().map(Into::into).collect();
        let mut w = self.observers.write();
        let registration = Registration {
            observer,
            filter,
            registered_at: Utc::now(),
        };
        if let Some(existing) = w
            .iter_mut()
            .find(|r| r.observer.id() == registration.observer.id())
        {
            *existing = registration;
        } else {
            w.push(registration);
        }
    }

    /// Remove an observer by id; returns whether anything was removed.
    pub fn unregister_observer(&self, id: &str) -> bool {
        let mut w = self.observers.write();
        let before = w.len();
        w.retain(|r| r.observer.id() != id);
        w.len() != before
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Registration timestamp for an observer id, if registered.
    #[must_use]
    pub fn registered_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.observers
            .read()
            .iter()
            .find(|r| r.observer.id() == id)
            .map(|r| r.registered_at)
    }

    /// Deliver `event` to every matching observer, in registration order.
    ///
    /// The observer list is snapshotted first; observers registered while
    /// the fan-out is in flight do not see this event.
    pub async fn notify(&self, event: &CloudEvent) {
        let snapshot: Vec<Arc<dyn Observer>> = {
            let r = self.observers.read();
            r.iter()
                .filter(|reg| reg.wants(&event.event_type))
                .map(|reg| reg.observer.clone())
                .collect()
        };

        for observer in snapshot {
            if let Err(err) = observer.on_event(event).await {
                tracing::warn!(
                    observer = observer.id(),
                    event_type = %event.event_type,
                    error = %err,
                    "observer failed; continuing fan-out"
                );
            }
        }
    }

    /// Build an event with this subject's source and deliver it.
    pub async fn emit(&self, event_type: &str, data: serde_json::Value) -> CloudEvent {
        let event = CloudEvent::new(event_type, &*self.source).with_data(data);
        self.notify(&event).await;
        event
    }
}

impl std::fmt::Debug for ObserverSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSubject")
            .field("source", &self.source)
            .field("observers", &self.observer_count())
            .finish()
    }
}
