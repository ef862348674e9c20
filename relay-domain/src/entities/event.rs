// Event entity
// A single occurrence reported by the game server monitoring provider

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{
    FieldValue, EVENT_PLAYER_DAMAGE, EVENT_PLAYER_DEATH_ENVIRONMENT, EVENT_PLAYER_DEATH_STARVATION,
    EVENT_PLAYER_KILL, EVENT_PLAYER_PLACE, EVENT_USER_JOIN, EVENT_USER_LEAVE, EVENT_VERIFICATION,
    METADATA_FIELDS, SUBJECT_ID_FIELDS,
};

pub type FieldMap = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type", alias = "Type")]
    pub event_type: String,
    #[serde(alias = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "Values")]
    pub values: FieldMap,
}

impl Event {
    /// Creates an event recorded now.
    pub fn new(event_type: impl Into<String>, values: FieldMap) -> Self {
        Self::at(event_type, Utc::now(), values)
    }

    pub fn at(event_type: impl Into<String>, timestamp: DateTime<Utc>, values: FieldMap) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            values,
        }
    }

    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn is_verification(&self) -> bool {
        self.event_type == EVENT_VERIFICATION
    }

    /// Identifier the event is filed under in history.
    ///
    /// The first subject field holding a non-empty string wins; fields holding
    /// other value kinds are skipped.
    pub fn subject_id(&self) -> Option<&str> {
        SUBJECT_ID_FIELDS.iter().find_map(|field| {
            self.values
                .get(*field)
                .and_then(FieldValue::as_str)
                .filter(|id| !id.is_empty())
        })
    }

    pub fn message(&self) -> String {
        match self.event_type.as_str() {
            EVENT_USER_JOIN => "Player connected.".to_string(),
            EVENT_USER_LEAVE => "Player disconnected.".to_string(),
            EVENT_PLAYER_KILL => "Player was killed.".to_string(),
            EVENT_PLAYER_DEATH_ENVIRONMENT => "Player was killed by the environment.".to_string(),
            EVENT_PLAYER_DEATH_STARVATION => "Player died from starvation.".to_string(),
            EVENT_PLAYER_DAMAGE => "Player injured another player.".to_string(),
            EVENT_PLAYER_PLACE => "Player placed an item.".to_string(),
            other => format!("Event: {}", other),
        }
    }

    /// Labelled text of the well-known fields present on this event.
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        METADATA_FIELDS
            .iter()
            .filter_map(|(field, label)| {
                self.values
                    .get(*field)
                    .map(|value| (*label, value.to_string()))
            })
            .collect()
    }
}
