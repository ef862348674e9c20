use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use relay_domain::ports::{EventHistory, HistoryError, HISTORY_RETENTION};
use relay_domain::{Event, HistoryRecord};

/// Event history kept as one JSON document per subject id under a storage
/// directory.
///
/// A single store-wide lock orders all access: saves take it exclusively,
/// lookups share it. Records are replaced by renaming a fully written and
/// synced temp file, so a crash leaves either the old or the new record.
pub struct FileEventHistory {
    root: PathBuf,
    retention: usize,
    lock: RwLock<()>,
}

impl FileEventHistory {
    /// Opens the store, creating `root` if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            retention: HISTORY_RETENTION,
            lock: RwLock::new(()),
        })
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, subject_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", escape_file_stem(subject_id)))
    }

    async fn read_record(&self, subject_id: &str) -> Result<HistoryRecord, HistoryError> {
        let bytes = match fs::read(self.record_path(subject_id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HistoryRecord::default()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes).map_err(|source| HistoryError::Corrupt {
            subject_id: subject_id.to_string(),
            source,
        })
    }

    async fn write_record(
        &self,
        subject_id: &str,
        record: &HistoryRecord,
    ) -> Result<(), HistoryError> {
        let bytes = serde_json::to_vec(record).map_err(HistoryError::Encode)?;
        let path = self.record_path(subject_id);
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHistory for FileEventHistory {
    async fn save(&self, event: &Event) -> Result<(), HistoryError> {
        let subject_id = event.subject_id().ok_or(HistoryError::MissingSubjectId)?;
        let _guard = self.lock.write().await;

        let mut record = self.read_record(subject_id).await?;
        record.push_capped(event.clone(), self.retention);
        self.write_record(subject_id, &record).await?;
        debug!(
            subject_id,
            event_type = %event.event_type,
            stored = record.events.len(),
            "saved event to history"
        );
        Ok(())
    }

    async fn find_within(
        &self,
        event_type: &str,
        subject_id: &str,
        within: Duration,
    ) -> Result<Vec<Event>, HistoryError> {
        let _guard = self.lock.read().await;
        let record = self.read_record(subject_id).await?;
        Ok(record.find_within(event_type, within))
    }
}

/// Maps a subject id to a file stem. ASCII letters, digits, `-` and `_` are
/// kept; every other byte becomes `%XX`. Distinct ids give distinct stems and
/// no stem can name a path outside the storage directory.
fn escape_file_stem(subject_id: &str) -> String {
    let mut out = String::with_capacity(subject_id.len());
    for byte in subject_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tokio::task::JoinSet;
    use relay_domain::{
        FieldMap, FieldValue, EVENT_PLAYER_DAMAGE, EVENT_USER_JOIN, FIELD_CFTOOLS_ID,
    };

    fn event(event_type: &str, subject_id: &str, minutes_ago: i64) -> Event {
        let mut values = FieldMap::new();
        values.insert(FIELD_CFTOOLS_ID.to_string(), FieldValue::from(subject_id));
        Event::at(
            event_type,
            Utc::now() - chrono::Duration::minutes(minutes_ago),
            values,
        )
    }

    async fn store() -> (tempfile::TempDir, FileEventHistory) {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = FileEventHistory::open(dir.path().join("storage"))
            .await
            .expect("open");
        (dir, history)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn save_rejects_events_without_subject() {
        let (_dir, history) = store().await;
        let err = history
            .save(&Event::new(EVENT_USER_JOIN, FieldMap::new()))
            .await
            .expect_err("missing id");

        assert!(matches!(err, HistoryError::MissingSubjectId));
        let mut entries = fs::read_dir(history.root()).await.expect("read dir");
        assert!(entries.next_entry().await.expect("entry").is_none());
    }

    #[tokio::test]
    async fn finds_events_of_type_within_window_in_order() {
        let (_dir, history) = store().await;
        let first = event(EVENT_USER_JOIN, "AN_ID", 58);
        let stale = event(EVENT_USER_JOIN, "AN_ID", 61);
        let other_type = event(EVENT_PLAYER_DAMAGE, "AN_ID", 10);
        let last = event(EVENT_USER_JOIN, "AN_ID", 59);
        for saved in [&first, &stale, &other_type, &last] {
            history.save(saved).await.expect("save");
        }

        let found = history
            .find_within(EVENT_USER_JOIN, "AN_ID", HOUR)
            .await
            .expect("find");
        assert_eq!(found, vec![first, last]);
    }

    #[tokio::test]
    async fn unknown_subject_is_empty() {
        let (_dir, history) = store().await;
        let found = history
            .find_within(EVENT_USER_JOIN, "NOBODY", HOUR)
            .await
            .expect("find");
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn caps_each_record_at_retention() {
        let (_dir, history) = store().await;
        let mut saved = Vec::new();
        for minutes_ago in (0..101).rev() {
            let next = event(EVENT_USER_JOIN, "AN_ID", minutes_ago / 10);
            history.save(&next).await.expect("save");
            saved.push(next);
        }

        let found = history
            .find_within(EVENT_USER_JOIN, "AN_ID", HOUR)
            .await
            .expect("find");
        assert_eq!(found.len(), HISTORY_RETENTION);
        assert_eq!(found, saved[1..].to_vec());
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let (dir, history) = store().await;
        let joined = event(EVENT_USER_JOIN, "AN_ID", 1);
        history.save(&joined).await.expect("save");
        drop(history);

        let reopened = FileEventHistory::open(dir.path().join("storage"))
            .await
            .expect("reopen");
        let found = reopened
            .find_within(EVENT_USER_JOIN, "AN_ID", HOUR)
            .await
            .expect("find");
        assert_eq!(found, vec![joined]);
    }

    #[tokio::test]
    async fn malformed_record_is_an_error() {
        let (_dir, history) = store().await;
        fs::write(history.record_path("AN_ID"), b"{not json")
            .await
            .expect("write");

        let err = history
            .find_within(EVENT_USER_JOIN, "AN_ID", HOUR)
            .await
            .expect_err("corrupt");
        assert!(matches!(err, HistoryError::Corrupt { subject_id, .. } if subject_id == "AN_ID"));
    }

    #[tokio::test]
    async fn hostile_ids_stay_inside_storage() {
        let (dir, history) = store().await;
        history
            .save(&event(EVENT_USER_JOIN, "../escape", 1))
            .await
            .expect("save");

        assert!(!dir.path().join("escape.json").exists());
        assert!(history.record_path("../escape").starts_with(history.root()));
        let found = history
            .find_within(EVENT_USER_JOIN, "../escape", HOUR)
            .await
            .expect("find");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn escaping_is_injective_for_lookalikes() {
        assert_eq!(escape_file_stem("76561198000000000"), "76561198000000000");
        assert_eq!(escape_file_stem("a.b"), "a%2Eb");
        assert_ne!(escape_file_stem("a%2Eb"), escape_file_stem("a.b"));
        assert_eq!(escape_file_stem("../x"), "%2E%2E%2Fx");
    }

    async fn save_concurrently(history: &Arc<FileEventHistory>, count: usize) {
        let mut saves = JoinSet::new();
        for seq in 0..count {
            let history = Arc::clone(history);
            saves.spawn(async move {
                let mut joined = event(EVENT_USER_JOIN, "AN_ID", 0);
                joined
                    .values
                    .insert("seq".to_string(), FieldValue::from(seq.to_string().as_str()));
                history.save(&joined).await
            });
        }
        while let Some(saved) = saves.join_next().await {
            saved.expect("join").expect("save");
        }
    }

    fn sequence_numbers(events: &[Event]) -> BTreeSet<String> {
        events
            .iter()
            .map(|event| event.values["seq"].to_string())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_for_one_subject_keep_every_event() {
        let (_dir, history) = store().await;
        let history = Arc::new(history);
        save_concurrently(&history, 40).await;

        let found = history
            .find_within(EVENT_USER_JOIN, "AN_ID", HOUR)
            .await
            .expect("find");
        assert_eq!(found.len(), 40);
        let expected: BTreeSet<String> = (0..40).map(|seq| seq.to_string()).collect();
        assert_eq!(sequence_numbers(&found), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_past_retention_stay_capped() {
        let (_dir, history) = store().await;
        let history = Arc::new(history);
        save_concurrently(&history, 130).await;

        let found = history
            .find_within(EVENT_USER_JOIN, "AN_ID", HOUR)
            .await
            .expect("find");
        assert_eq!(found.len(), HISTORY_RETENTION);
        assert_eq!(sequence_numbers(&found).len(), HISTORY_RETENTION);
    }
}
