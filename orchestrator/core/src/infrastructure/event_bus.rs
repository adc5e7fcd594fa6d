// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Swarm Events
//
// Every subscriber owns a bounded queue. A non-blocking publish never waits:
// a full queue loses its oldest event instead. `publish_timeout` waits for
// space up to a deadline and enqueues nothing for a subscriber it gave up on.
//
// In-memory only (events lost on restart).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::agent::AgentId;
use crate::domain::events::Event;

pub const DEFAULT_BUFFER_SIZE: usize = 256;

enum PushOutcome {
    Delivered,
    Full,
    Closed,
}

struct SubscriberQueue {
    id: u64,
    capacity: usize,
    buffer: Mutex<VecDeque<Event>>,
    closed: AtomicBool,
    readable: Notify,
    writable: Notify,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(id: u64, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            closed: AtomicBool::new(false),
            readable: Notify::new(),
            writable: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueue, evicting the oldest event when full.
    fn push_evicting(&self, event: Event) {
        if self.is_closed() {
            return;
        }

        let evicted = {
            let mut buffer = self.buffer.lock();
            let evicted = buffer.len() >= self.capacity && buffer.pop_front().is_some();
            buffer.push_back(event);
            evicted
        };

        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("mysis_events_dropped_total").increment(1);
            debug!(subscriber = self.id, "Subscriber queue full, dropped oldest event");
        }
        self.readable.notify_one();
    }

    fn try_push(&self, event: &Event) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }

        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.capacity {
                return PushOutcome::Full;
            }
            buffer.push_back(event.clone());
        }
        self.readable.notify_one();
        PushOutcome::Delivered
    }

    /// Wait for space until `deadline`. Returns false if nothing was enqueued.
    async fn push_until(&self, event: &Event, deadline: Instant) -> bool {
        loop {
            // Register interest before checking, so a pop between the check
            // and the wait is not missed.
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(event) {
                PushOutcome::Delivered => return true,
                PushOutcome::Closed => return false,
                PushOutcome::Full => {}
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }

    fn pop(&self) -> Option<Event> {
        let event = self.buffer.lock().pop_front();
        if event.is_some() {
            self.writable.notify_waiters();
        }
        event
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.readable.notify_one();
        self.writable.notify_waiters();
    }
}

struct BusInner {
    subscribers: Mutex<Vec<Arc<SubscriberQueue>>>,
    closed: AtomicBool,
    next_id: AtomicU64,
    buffer_size: usize,
}

/// Event bus for publishing and subscribing to swarm events
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new event bus where each subscriber buffers up to
    /// `buffer_size` undelivered events
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Create event bus with default capacity (256)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }

    fn snapshot(&self) -> Vec<Arc<SubscriberQueue>> {
        self.inner.subscribers.lock().clone()
    }

    /// Publish to every subscriber without waiting.
    pub fn publish(&self, event: Event) {
        debug!(event_type = ?event.event_type, "Publishing event");

        let subscribers = self.snapshot();
        if subscribers.is_empty() {
            debug!("No subscribers listening to event");
            return;
        }

        for queue in subscribers {
            queue.push_evicting(event.clone());
        }
    }

    /// Publish, waiting up to `timeout` for room in each subscriber queue.
    ///
    /// Subscribers still full at the deadline receive nothing and are counted
    /// in the returned error.
    pub async fn publish_timeout(&self, event: Event, timeout: Duration) -> Result<(), EventBusError> {
        if self.is_closed() {
            return Err(EventBusError::Closed);
        }

        let deadline = Instant::now() + timeout;
        let mut undelivered = 0;
        for queue in self.snapshot() {
            if !queue.push_until(&event, deadline).await {
                undelivered += 1;
            }
        }

        if undelivered > 0 {
            warn!(
                event_type = ?event.event_type,
                undelivered, "Event not delivered to every subscriber"
            );
            return Err(EventBusError::Undelivered(undelivered));
        }
        Ok(())
    }

    /// Subscribe to all swarm events.
    ///
    /// After `close()` the returned receiver is already closed.
    pub fn subscribe(&self) -> EventReceiver {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(id, self.inner.buffer_size));

        {
            let mut subscribers = self.inner.subscribers.lock();
            // Checked under the lock so close() cannot miss this queue.
            if self.inner.closed.load(Ordering::Acquire) {
                queue.close();
            } else {
                subscribers.push(Arc::clone(&queue));
            }
        }

        EventReceiver {
            queue,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe and filter for a single agent
    pub fn subscribe_agent(&self, agent_id: AgentId) -> AgentEventReceiver {
        AgentEventReceiver {
            receiver: self.subscribe(),
            agent_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Close every subscriber queue. Buffered events can still be drained.
    pub fn close(&self) {
        let subscribers = {
            let mut subscribers = self.inner.subscribers.lock();
            self.inner.closed.store(true, Ordering::Release);
            std::mem::take(&mut *subscribers)
        };
        debug!(subscribers = subscribers.len(), "Closing event bus");
        for queue in subscribers {
            queue.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all swarm events. Dropping it unsubscribes.
pub struct EventReceiver {
    queue: Arc<SubscriberQueue>,
    bus: Weak<BusInner>,
}

impl EventReceiver {
    /// Receive the next event, waiting until one is available
    pub async fn recv(&mut self) -> Result<Event, EventBusError> {
        loop {
            if let Some(event) = self.queue.pop() {
                return Ok(event);
            }
            if self.queue.is_closed() {
                return Err(EventBusError::Closed);
            }
            self.queue.readable.notified().await;
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Event, EventBusError> {
        match self.queue.pop() {
            Some(event) => Ok(event),
            None if self.queue.is_closed() => Err(EventBusError::Closed),
            None => Err(EventBusError::Empty),
        }
    }

    /// Events this subscriber lost to overflow
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let id = self.queue.id;
            bus.subscribers.lock().retain(|queue| queue.id != id);
        }
    }
}

/// Receiver for one agent's events (filtered)
pub struct AgentEventReceiver {
    receiver: EventReceiver,
    agent_id: AgentId,
}

impl AgentEventReceiver {
    /// Receive the next event for the agent, skipping everything else
    pub async fn recv(&mut self) -> Result<Event, EventBusError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.is_for(self.agent_id) {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Event not delivered to {0} subscriber(s) before the deadline")]
    Undelivered(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentState;
    use crate::domain::events::EventType;

    fn numbered(n: usize) -> Event {
        Event::broadcast(&format!("event-{}", n))
    }

    fn content(event: &Event) -> String {
        match &event.data {
            crate::domain::events::EventData::Message(m) => m.content.clone(),
            other => panic!("unexpected event data {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut first = event_bus.subscribe();
        let mut second = event_bus.subscribe();

        event_bus.publish(numbered(1));

        assert_eq!(content(&first.recv().await.unwrap()), "event-1");
        assert_eq!(content(&second.recv().await.unwrap()), "event-1");
        assert!(matches!(first.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();

        for n in 1..=3 {
            event_bus.publish(numbered(n));
        }

        assert_eq!(content(&receiver.recv().await.unwrap()), "event-2");
        assert_eq!(content(&receiver.recv().await.unwrap()), "event-3");
        assert_eq!(receiver.dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_publisher() {
        let event_bus = EventBus::new(1);
        let _stalled = event_bus.subscribe();
        let mut active = event_bus.subscribe();

        let publish_all = async {
            for n in 0..1000 {
                event_bus.publish(numbered(n));
            }
        };
        tokio::time::timeout(Duration::from_secs(1), publish_all)
            .await
            .expect("non-blocking publish stalled");

        assert_eq!(content(&active.recv().await.unwrap()), "event-999");
    }

    #[tokio::test]
    async fn test_publish_timeout_delivers_when_space_frees() {
        let event_bus = EventBus::new(1);
        let mut receiver = event_bus.subscribe();
        event_bus.publish(numbered(1));

        let bus = event_bus.clone();
        let publisher =
            tokio::spawn(async move { bus.publish_timeout(numbered(2), Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(content(&receiver.recv().await.unwrap()), "event-1");

        publisher.await.unwrap().unwrap();
        assert_eq!(content(&receiver.recv().await.unwrap()), "event-2");
        assert_eq!(receiver.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_timeout_reports_non_delivery() {
        let event_bus = EventBus::new(1);
        let mut receiver = event_bus.subscribe();
        event_bus.publish(numbered(1));

        let result = event_bus
            .publish_timeout(numbered(2), Duration::from_millis(30))
            .await;
        assert!(matches!(result, Err(EventBusError::Undelivered(1))));

        // Nothing was enqueued by the failed publish
        assert_eq!(content(&receiver.recv().await.unwrap()), "event-1");
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_close_drains_then_reports_closed() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        event_bus.publish(numbered(1));
        event_bus.close();

        assert_eq!(content(&receiver.recv().await.unwrap()), "event-1");
        assert!(matches!(receiver.recv().await, Err(EventBusError::Closed)));
        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();

        let waiter = tokio::spawn(async move { receiver.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        event_bus.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("receiver not woken by close")
            .unwrap();
        assert!(matches!(result, Err(EventBusError::Closed)));
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_closed() {
        let event_bus = EventBus::new(4);
        event_bus.close();

        let mut receiver = event_bus.subscribe();
        assert!(receiver.is_closed());
        assert!(matches!(receiver.recv().await, Err(EventBusError::Closed)));

        event_bus.publish(numbered(1));
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Closed)));
    }

    #[tokio::test]
    async fn test_dropping_receiver_unsubscribes() {
        let event_bus = EventBus::new(4);
        let receiver = event_bus.subscribe();
        let _kept = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        drop(receiver);
        assert_eq!(event_bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_agent_event_filtering() {
        let event_bus = EventBus::new(10);
        let agent_id = AgentId::new();
        let other_id = AgentId::new();
        let mut receiver = event_bus.subscribe_agent(agent_id);

        event_bus.publish(Event::state_changed(
            other_id,
            "other",
            AgentState::Idle,
            AgentState::Running,
        ));
        event_bus.publish(Event::broadcast("everyone"));
        event_bus.publish(Event::deleted(agent_id, "mine"));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::Deleted);
        assert_eq!(event.agent_id, Some(agent_id));
    }
}
