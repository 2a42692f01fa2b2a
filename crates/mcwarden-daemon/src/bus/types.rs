//! Event bus types.

use mcwarden_core::Event;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::event_bus::EventBus;
use super::presence::Presence;

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Durable events kept for replay.
    pub history_capacity: usize,
    /// Undelivered events a subscriber may fall behind by before it is dropped.
    pub subscriber_queue: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            subscriber_queue: 256,
        }
    }
}

/// State handed to a subscriber at registration time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub presence: Presence,
    pub events: Vec<Event>,
}

/// A live registration on the bus.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    pub(super) id: Uuid,
    pub(super) snapshot: Option<Snapshot>,
    pub(super) event_rx: mpsc::Receiver<Event>,
    pub(super) bus: EventBus,
}

impl Subscription {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Take the registration snapshot. Returns `None` on later calls.
    pub fn take_snapshot(&mut self) -> Option<Snapshot> {
        self.snapshot.take()
    }

    /// Next live event. `None` once the bus dropped this subscriber, either
    /// because it fell too far behind or because the bus closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.event_rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// Bus statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    pub subscribers: usize,
    pub history_len: usize,
    pub published: u64,
}

/// Bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Event bus is closed to new subscribers")]
    Closed,
}
