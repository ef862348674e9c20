use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::entities::{Event, HistoryRecord};
use crate::ports::{EventHistory, HistoryError, HISTORY_RETENTION};

/// Process-local event history with the same retention and query semantics
/// as the file-backed store. State is lost on restart.
#[derive(Debug)]
pub struct InMemoryEventHistory {
    records: RwLock<HashMap<String, HistoryRecord>>,
    retention: usize,
}

impl InMemoryEventHistory {
    pub fn new() -> Self {
        Self::with_retention(HISTORY_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }
}

impl Default for InMemoryEventHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHistory for InMemoryEventHistory {
    async fn save(&self, event: &Event) -> Result<(), HistoryError> {
        let subject_id = event.subject_id().ok_or(HistoryError::MissingSubjectId)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(subject_id.to_string())
            .or_default()
            .push_capped(event.clone(), self.retention);
        Ok(())
    }

    async fn find_within(
        &self,
        event_type: &str,
        subject_id: &str,
        within: Duration,
    ) -> Result<Vec<Event>, HistoryError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(subject_id)
            .map(|record| record.find_within(event_type, within))
            .unwrap_or_default())
    }
}
