// History record entity
// Append-only, bounded event log of a single subject

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entities::Event;
use crate::utils::window_start;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default, alias = "Events")]
    pub events: Vec<Event>,
}

impl HistoryRecord {
    /// Appends `event`, dropping the oldest entries until at most
    /// `retention` remain.
    pub fn push_capped(&mut self, event: Event, retention: usize) {
        self.events.push(event);
        if self.events.len() > retention {
            let excess = self.events.len() - retention;
            self.events.drain(..excess);
        }
    }

    /// Events of `event_type` recorded no earlier than `within` ago, in
    /// insertion order.
    pub fn find_within(&self, event_type: &str, within: Duration) -> Vec<Event> {
        let start = window_start(within);
        self.events
            .iter()
            .filter(|event| event.event_type == event_type)
            .filter(|event| start.map_or(true, |start| event.timestamp >= start))
            .cloned()
            .collect()
    }
}
