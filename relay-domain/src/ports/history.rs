use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::Event;

/// Maximum number of events kept per subject.
pub const HISTORY_RETENTION: usize = 100;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("event has no subject id and cannot be filed")]
    MissingSubjectId,
    #[error("history storage failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history record for '{subject_id}' is malformed: {source}")]
    Corrupt {
        subject_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode history record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Append-only, per-subject event log.
///
/// Implementations serialize writes so a concurrent `find_within` never
/// observes a partially written record.
#[async_trait]
pub trait EventHistory: Send + Sync {
    /// Appends `event` to the record of its subject id, evicting the oldest
    /// entries beyond the retention cap.
    async fn save(&self, event: &Event) -> Result<(), HistoryError>;

    /// Events of `event_type` for `subject_id` recorded within the last
    /// `within`, in insertion order. Unknown subjects yield an empty list.
    async fn find_within(
        &self,
        event_type: &str,
        subject_id: &str,
        within: Duration,
    ) -> Result<Vec<Event>, HistoryError>;
}
