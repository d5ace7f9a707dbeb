//! Inbound event delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::warn;

use crate::member::Member;
use crate::query::QueryHandle;

/// An event delivered by the bus to its single consumer.
#[derive(Debug)]
pub enum InboundEvent {
    /// A new member appeared.
    MemberJoin(Member),

    /// A member departed gracefully.
    MemberLeave(Member),

    /// A member went silent past the suspicion window.
    MemberFailed(Member),

    /// A member's record changed (revival, address move).
    MemberUpdate(Member),

    /// A failed member was removed from the table.
    MemberReap(Member),

    /// An inbound query awaiting a response on its handle.
    Query {
        from: String,
        name: String,
        payload: Bytes,
        handle: QueryHandle,
    },

    /// A best-effort multicast user event.
    UserEvent {
        from: String,
        name: String,
        payload: Bytes,
    },
}

/// Bounded inbound queue that sheds the oldest event on overflow.
///
/// The consumer falling behind must not wedge the bus, and fresh events
/// are worth more than stale ones: a shed state broadcast is repaired by
/// the sender's next monitor tick.
#[derive(Debug, Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

#[derive(Debug)]
struct QueueInner {
    events: Mutex<VecDeque<InboundEvent>>,
    notify: Notify,
    capacity: usize,
}

impl EventQueue {
    /// Creates a queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: Arc::new(QueueInner {
                events: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// Enqueues an event, dropping the oldest when full.
    pub fn push(&self, event: InboundEvent) {
        {
            let mut events = self.inner.events.lock().expect("event queue poisoned");
            if events.len() == self.inner.capacity {
                let shed = events.pop_front();
                warn!(?shed, "inbound queue full, shedding oldest event");
            }
            events.push_back(event);
        }
        self.inner.notify.notify_one();
    }

    /// Waits for the next event.
    pub async fn recv(&self) -> InboundEvent {
        loop {
            if let Some(event) = self.try_recv() {
                return event;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Pops an event if one is ready.
    pub fn try_recv(&self) -> Option<InboundEvent> {
        self.inner
            .events
            .lock()
            .expect("event queue poisoned")
            .pop_front()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.inner.events.lock().expect("event queue poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
