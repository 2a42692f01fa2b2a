//! Who is online, and when absent users were last seen.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineEntry {
    pub since: DateTime<Utc>,
}

/// Session-scoped user state replayed to new subscribers.
///
/// `onliner` belongs to a single server run and is cleared on restart;
/// `last_seen` outlives restarts.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub onliner: BTreeMap<String, OnlineEntry>,
    pub last_seen: BTreeMap<String, DateTime<Utc>>,
}

impl Presence {
    pub fn join(&mut self, name: &str, at: DateTime<Utc>) {
        self.onliner
            .insert(name.to_string(), OnlineEntry { since: at });
    }

    /// Returns `false` if the user was not online.
    pub fn leave(&mut self, name: &str, at: DateTime<Utc>) -> bool {
        self.last_seen.insert(name.to_string(), at);
        self.onliner.remove(name).is_some()
    }

    pub fn touch(&mut self, name: &str, at: DateTime<Utc>) {
        self.last_seen.insert(name.to_string(), at);
    }

    /// Forget everyone online. Called when the server process is replaced.
    pub fn reset(&mut self) {
        self.onliner.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.onliner.is_empty()
    }
}
