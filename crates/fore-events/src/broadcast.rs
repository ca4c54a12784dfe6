use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use fore_core::config::EventsConfig;
use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::event::Event;

/// Used in place of a zero heartbeat interval.
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Subscriber registry. Only `subscribe` and `unsubscribe` add or remove entries.
struct Registry {
    subscribers: DashMap<u64, mpsc::Sender<Event>>,
    next_id: AtomicU64,
    buffer: usize,
    heartbeat: Duration,
}

/// Fan-out of engine events to every live client subscription.
///
/// Each subscriber owns a bounded queue. [`publish`](Self::publish) only ever
/// `try_send`s, so a slow or vanished client can never stall the publishing
/// pipeline; such a client is unsubscribed instead and its stream ends once
/// the queued events are drained.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<Registry>,
}

impl EventBroadcaster {
    pub fn new(buffer: usize, heartbeat: Duration) -> Self {
        Self {
            inner: Arc::new(Registry {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                // room for at least `connected` plus one event
                buffer: buffer.max(2),
                heartbeat: if heartbeat.is_zero() { MIN_HEARTBEAT } else { heartbeat },
            }),
        }
    }

    pub fn from_config(cfg: &EventsConfig) -> Self {
        Self::new(cfg.subscriber_buffer, Duration::from_secs(cfg.heartbeat_secs))
    }

    /// Register a new client. The returned subscription yields `connected` first.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        // Fresh channel with capacity >= 2, cannot be full.
        let _ = tx.try_send(Event::Connected);
        self.inner.subscribers.insert(id, tx);
        info!(subscriber = id, total = self.subscriber_count(), "event subscriber connected");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
            heartbeat: self.inner.heartbeat,
        }
    }

    /// Push `event` to every subscriber without blocking.
    ///
    /// Returns how many subscribers accepted it. Subscribers whose queue is
    /// full or closed are dropped.
    pub fn publish(&self, event: Event) -> usize {
        let mut delivered = 0usize;
        let mut dropped: Vec<u64> = Vec::new();

        for entry in self.inner.subscribers.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = *entry.key(), "event subscriber too slow, dropping");
                    dropped.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => dropped.push(*entry.key()),
            }
        }
        // Removal happens after iteration; DashMap shards are still read-locked inside the loop.
        for id in dropped {
            self.unsubscribe(id);
        }

        debug!(kind = event.kind(), delivered, "event published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.unsubscribe(id);
    }
}

impl Registry {
    fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            info!(subscriber = id, total = self.subscribers.len(), "event subscriber disconnected");
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::from_config(&EventsConfig::default())
    }
}

/// One client's view of the event stream. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    registry: Weak<Registry>,
    heartbeat: Duration,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued event, without heartbeats. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Turn the subscription into an endless stream that interleaves queued
    /// events with a `heartbeat` every heartbeat interval.
    ///
    /// The stream ends when the broadcaster drops this subscriber.
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + 'static {
        let mut sub = self;
        async_stream::stream! {
            let period = sub.heartbeat;
            let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    event = sub.rx.recv() => match event {
                        Some(event) => yield event,
                        None => break,
                    },
                    _ = tick.tick() => yield Event::Heartbeat,
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}
