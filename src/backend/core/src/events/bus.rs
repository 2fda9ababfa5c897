//! Synchronous in-process event bus.
//!
//! [`EventBus::dispatch`] awaits every matching handler, one after another,
//! before returning. Whoever raised the event (an HTTP request, a CLI call)
//! therefore observes the invalidations before it responds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use super::event::{DomainEvent, EventKind};

/// Reacts to domain events. Handlers cannot fail; they log and move on.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);

    fn name(&self) -> &'static str;
}

struct Registration {
    id: u64,
    kinds: Vec<EventKind>,
    handler: Arc<dyn EventHandler>,
}

impl Registration {
    fn accepts(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }
}

#[derive(Default)]
struct BusInner {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

/// Registry of handlers keyed by event kind. Clones share the registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the given kinds.
    ///
    /// The handler stays registered until [`Subscription::deregister`] is
    /// called; dropping the subscription does not remove it.
    pub fn subscribe(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(handler = handler.name(), ?kinds, "Handler subscribed");
        self.inner.registrations.write().push(Registration {
            id,
            kinds: kinds.to_vec(),
            handler,
        });
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Run every handler subscribed to the event's kind, in registration
    /// order. Returns how many handlers ran.
    pub async fn dispatch(&self, event: &DomainEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .inner
            .registrations
            .read()
            .iter()
            .filter(|r| r.accepts(kind))
            .map(|r| r.handler.clone())
            .collect();

        let span = info_span!("dispatch", dispatch_id = %Uuid::new_v4(), event = %kind);
        async {
            let started = Instant::now();
            for handler in &handlers {
                handler.handle(event).await;
            }
            debug!(
                handlers = handlers.len(),
                duration_us = started.elapsed().as_micros() as u64,
                "Event dispatched"
            );
        }
        .instrument(span)
        .await;

        handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.registrations.read().len()
    }
}

/// Handle for removing a handler from the bus.
#[must_use = "keep the subscription to be able to deregister the handler"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Remove the handler. Returns false when the bus is already gone.
    pub fn deregister(self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => {
                let mut registrations = inner.registrations.write();
                let before = registrations.len();
                registrations.retain(|r| r.id != self.id);
                registrations.len() < before
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::model::CourseId;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            self.seen.lock().push(event.kind());
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_dispatch_filters_by_kind() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        let _sub = bus.subscribe(&[EventKind::CourseUpdated], recorder.clone());

        let ran = bus
            .dispatch(&DomainEvent::CourseUpdated {
                course_id: CourseId(1),
            })
            .await;
        assert_eq!(ran, 1);
        assert_eq!(bus.dispatch(&DomainEvent::PluginActivated).await, 0);

        assert_eq!(*recorder.seen.lock(), vec![EventKind::CourseUpdated]);
    }

    #[tokio::test]
    async fn test_deregister() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        let sub = bus.subscribe(&EventKind::ALL, recorder.clone());
        assert_eq!(bus.handler_count(), 1);

        assert!(sub.deregister());
        assert_eq!(bus.handler_count(), 0);
        assert_eq!(bus.dispatch(&DomainEvent::PluginActivated).await, 0);
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_deregister_after_bus_dropped() {
        let bus = EventBus::new();
        let sub = bus.subscribe(&EventKind::ALL, Arc::new(Recorder::default()));
        drop(bus);
        assert!(!sub.deregister());
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        struct Tagged(&'static str, Arc<Mutex<Vec<&'static str>>>);

        #[async_trait]
        impl EventHandler for Tagged {
            async fn handle(&self, _event: &DomainEvent) {
                self.1.lock().push(self.0);
            }
            fn name(&self) -> &'static str {
                self.0
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();
        let _a = bus.subscribe(&EventKind::ALL, Arc::new(Tagged("first", log.clone())));
        let _b = bus.subscribe(&EventKind::ALL, Arc::new(Tagged("second", log.clone())));

        bus.dispatch(&DomainEvent::PluginDeactivated).await;
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }
}
