//! Persisted pending-work lists shared by a transfer handler and its jobs
//!
//! Both lists live in the plugin-data store and are only touched while the
//! queue's mutex is held, so an append from the transfer handler can never
//! interleave with a drain by the upload job.

use crate::database::Database;
use crate::errors::StoreResult;
use crate::models::TransferRecord;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

pub const WAITING_KEY: &str = "waiting_upload";
pub const UPLOADED_KEY: &str = "uploaded";

pub struct PendingQueue {
    db: Database,
    plugin_id: String,
    lock: Mutex<()>,
}

/// Both lists, loaded under the queue lock. Changes are written by `commit`.
pub struct PendingLists<'a> {
    _guard: MutexGuard<'a, ()>,
    queue: &'a PendingQueue,
    pub waiting: Vec<TransferRecord>,
    pub uploaded: Vec<TransferRecord>,
}

fn dedup_by_dest(records: &mut Vec<TransferRecord>) {
    let mut seen = std::collections::HashSet::new();
    records.retain(|r| seen.insert(r.dest.clone()));
}

impl PendingQueue {
    pub fn new(db: Database, plugin_id: &str) -> Self {
        Self {
            db,
            plugin_id: plugin_id.to_string(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self, key: &str) -> StoreResult<Vec<TransferRecord>> {
        Ok(self
            .db
            .get_plugin_data(&self.plugin_id, key)
            .await?
            .unwrap_or_default())
    }

    pub async fn lock(&self) -> StoreResult<PendingLists<'_>> {
        let guard = self.lock.lock().await;
        let waiting = self.load(WAITING_KEY).await?;
        let uploaded = self.load(UPLOADED_KEY).await?;
        Ok(PendingLists {
            _guard: guard,
            queue: self,
            waiting,
            uploaded,
        })
    }

    /// Append to the waiting list; a record whose `dest` is already waiting is
    /// dropped. Returns how many were added.
    pub async fn enqueue(&self, records: Vec<TransferRecord>) -> StoreResult<usize> {
        let mut lists = self.lock().await?;
        let before = lists.waiting.len();
        lists.waiting.extend(records);
        dedup_by_dest(&mut lists.waiting);
        let added = lists.waiting.len() - before;
        lists.commit().await?;
        Ok(added)
    }

    /// Copies of both lists
    pub async fn snapshot(&self) -> StoreResult<(Vec<TransferRecord>, Vec<TransferRecord>)> {
        let lists = self.lock().await?;
        Ok((lists.waiting.clone(), lists.uploaded.clone()))
    }
}

impl PendingLists<'_> {
    /// Move the waiting record `id` to the uploaded list
    pub fn mark_uploaded(&mut self, id: uuid::Uuid) -> bool {
        match self.waiting.iter().position(|r| r.id == id) {
            Some(index) => {
                let record = self.waiting.remove(index);
                self.uploaded.push(record);
                true
            }
            None => false,
        }
    }

    /// Persist both lists and release the lock
    pub async fn commit(mut self) -> StoreResult<()> {
        dedup_by_dest(&mut self.waiting);
        dedup_by_dest(&mut self.uploaded);
        let db = &self.queue.db;
        let plugin_id = self.queue.plugin_id.as_str();
        db.save_plugin_data(plugin_id, WAITING_KEY, &self.waiting).await?;
        db.save_plugin_data(plugin_id, UPLOADED_KEY, &self.uploaded).await?;
        debug!(
            "{} pending lists saved: {} waiting, {} uploaded",
            plugin_id,
            self.waiting.len(),
            self.uploaded.len()
        );
        Ok(())
    }
}
