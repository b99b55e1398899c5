//! In-process typed distribution of execution-lifecycle events.
//!
//! Producers (execution ingestion, the watchdog) publish without knowing who
//! listens; consumers (aggregator, notification dispatcher, dashboard push)
//! subscribe per event kind. Publishing never blocks: each subscriber has a
//! bounded buffer, and a full buffer drops the event for that subscriber —
//! the reconciliation roller restores any counter drift that causes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use vigil_core::{EventKind, ExecutionEvent};

/// Typed publish/subscribe bus. Per-subscriber delivery order matches
/// publish order for that event kind; no ordering is implied across kinds
/// or across subscribers.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<mpsc::Sender<ExecutionEvent>>>>,
    buffer: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribe to one event kind. The receiver sees events of that kind in
    /// publish order. Subscribing on a closed bus yields an already-closed
    /// channel so the consumer loop terminates immediately.
    pub fn subscribe(&self, kind: EventKind) -> mpsc::Receiver<ExecutionEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        if self.closed.load(Ordering::SeqCst) {
            warn!(kind = %kind, "subscribe on closed bus");
            return rx;
        }
        self.subscribers
            .write()
            .expect("bus registry lock")
            .entry(kind)
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver an event to every current subscriber of its kind.
    ///
    /// Never blocks the publisher: a subscriber whose buffer is full loses
    /// this event (logged and counted); a disconnected subscriber is pruned.
    pub fn publish(&self, event: ExecutionEvent) {
        if self.closed.load(Ordering::SeqCst) {
            debug!(kind = %event.kind(), "publish on closed bus — dropping");
            return;
        }

        let kind = event.kind();
        let mut registry = self.subscribers.write().expect("bus registry lock");
        let Some(senders) = registry.get_mut(&kind) else {
            debug!(kind = %kind, "no subscribers for event kind");
            return;
        };

        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = %kind, "subscriber buffer full — dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(kind = %kind, "pruning disconnected subscriber");
                false
            }
        });
    }

    /// Stop accepting subscriptions and close every subscriber channel.
    /// Receivers drain whatever is already buffered, then observe closure.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers
            .write()
            .expect("bus registry lock")
            .clear();
    }

    /// Total deliveries dropped because a subscriber's buffer was full.
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current subscriber count for one event kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .expect("bus registry lock")
            .get(&kind)
            .map_or(0, Vec::len)
    }
}
