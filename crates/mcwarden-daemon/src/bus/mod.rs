//! Event bus with bounded replay history.
//!
//! Every publish is appended to the history buffer (unless its kind is
//! ephemeral) and fanned out to all live subscribers. New subscribers receive
//! a snapshot of the history and presence state taken atomically with their
//! registration, so the snapshot and live stream neither overlap nor leave a
//! gap.

mod event_bus;
mod history;
mod presence;
mod types;

pub use event_bus::EventBus;
pub use history::History;
pub use presence::{OnlineEntry, Presence};
pub use types::{BusConfig, BusError, BusStats, Snapshot, Subscription};
