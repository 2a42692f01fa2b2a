//! Publish/subscribe hub shared by line handlers, the supervisor and the
//! subscription server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mcwarden_core::{Event, EventKind};

use super::history::History;
use super::presence::Presence;
use super::types::{BusConfig, BusError, BusStats, Snapshot, Subscription};

struct BusState {
    history: History,
    presence: Presence,
    subscribers: HashMap<Uuid, mpsc::Sender<Event>>,
    closed: bool,
    published: u64,
}

impl BusState {
    /// Record and fan out one event. Must run under the bus lock so that
    /// snapshot-taking in `subscribe` cannot interleave with it.
    fn publish(&mut self, kind: EventKind, payload: Value) -> Event {
        let event = Event::new(kind, payload);
        if !event.is_ephemeral() {
            self.history.push(event.clone());
        }
        self.published += 1;

        self.subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = %id, "Subscriber fell behind, dropping it");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "Subscriber receiver gone");
                false
            }
        });
        event
    }
}

/// Process-wide event bus. Cloning is cheap and shares the same state.
#[derive(Clone)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
    config: BusConfig,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new(config: BusConfig) -> Self {
        let state = BusState {
            history: History::new(config.history_capacity),
            presence: Presence::default(),
            subscribers: HashMap::new(),
            closed: false,
            published: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            config,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(BusConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish an event. Never waits on subscribers.
    pub fn publish(&self, kind: EventKind, payload: Value) -> Event {
        self.lock().publish(kind, payload)
    }

    /// Register a live subscriber and return it with a consistent snapshot.
    #[allow(clippy::significant_drop_tightening)]
    pub fn subscribe(&self) -> Result<Subscription, BusError> {
        let mut state = self.lock();
        if state.closed {
            return Err(BusError::Closed);
        }

        let (event_tx, event_rx) = mpsc::channel(self.config.subscriber_queue.max(1));
        let id = Uuid::new_v4();
        let snapshot = Snapshot {
            presence: state.presence.clone(),
            events: state.history.to_vec(),
        };
        state.subscribers.insert(id, event_tx);
        let subscribers = state.subscribers.len();
        drop(state);

        info!(subscriber = %id, subscribers, "Subscriber connected");
        Ok(Subscription {
            id,
            snapshot: Some(snapshot),
            event_rx,
            bus: self.clone(),
        })
    }

    /// Remove a subscriber. Safe to call more than once.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            info!(subscriber = %id, "Subscriber disconnected");
        }
        removed
    }

    /// Stop accepting subscribers and end every live stream.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.subscribers.len();
        state.subscribers.clear();
        drop(state);
        info!(dropped, "Event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Clear session state and announce the restart in one step.
    pub fn restart_session(&self) -> Event {
        let mut state = self.lock();
        state.presence.reset();
        state.publish(EventKind::ServerRestart, Value::Null)
    }

    pub fn user_joined(&self, name: &str) -> Event {
        let mut state = self.lock();
        state.presence.join(name, Utc::now());
        state.publish(EventKind::UserJoin, json!({ "name": name }))
    }

    pub fn user_left(&self, name: &str) -> Event {
        let mut state = self.lock();
        state.presence.leave(name, Utc::now());
        state.publish(EventKind::UserLeave, json!({ "name": name }))
    }

    /// Liveness ping for a user. Updates last-seen, never enters history.
    pub fn user_active(&self, name: &str) -> Event {
        let mut state = self.lock();
        state.presence.touch(name, Utc::now());
        state.publish(EventKind::UserActivity, json!({ "name": name }))
    }

    pub fn presence(&self) -> Presence {
        self.lock().presence.clone()
    }

    pub fn history(&self) -> Vec<Event> {
        self.lock().history.to_vec()
    }

    pub fn stats(&self) -> BusStats {
        let state = self.lock();
        BusStats {
            subscribers: state.subscribers.len(),
            history_len: state.history.len(),
            published: state.published,
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
