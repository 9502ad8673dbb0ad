//! Per-subject record of what has been written to a remote catalog

use crate::database::Database;
use crate::errors::StoreResult;
use crate::models::SyncState;
use chrono::Utc;
use tokio::sync::Mutex;

const KEY_PREFIX: &str = "subject:";

pub struct SyncStateStore {
    db: Database,
    plugin_id: String,
    // serializes read-modify-write cycles of `update`
    lock: Mutex<()>,
}

impl SyncStateStore {
    pub fn new(db: Database, plugin_id: &str) -> Self {
        Self {
            db,
            plugin_id: plugin_id.to_string(),
            lock: Mutex::new(()),
        }
    }

    fn key(subject_id: u64) -> String {
        format!("{KEY_PREFIX}{subject_id}")
    }

    pub async fn get(&self, subject_id: u64) -> StoreResult<Option<SyncState>> {
        self.db
            .get_plugin_data(&self.plugin_id, &Self::key(subject_id))
            .await
    }

    /// Load (or create with `subject_name`), apply `change`, stamp and persist
    pub async fn update<F>(&self, subject_id: u64, subject_name: &str, change: F) -> StoreResult<SyncState>
    where
        F: FnOnce(&mut SyncState),
    {
        let _guard = self.lock.lock().await;
        let mut state = self
            .get(subject_id)
            .await?
            .unwrap_or_else(|| SyncState::new(subject_name));
        change(&mut state);
        state.updated_at = Utc::now();
        self.db
            .save_plugin_data(&self.plugin_id, &Self::key(subject_id), &state)
            .await?;
        Ok(state)
    }
}
