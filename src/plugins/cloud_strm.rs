//! Move organised media to the cloud drive and leave `.strm` files behind
//!
//! Transfers whose source already sits on the cloud mount become strm files
//! right away. Everything else waits in the pending queue until the upload
//! job copies it onto the mount; once a copy is older than `save_days` the
//! local file is swapped for a strm pointing at the cloud copy. Queued
//! records whose destination is a symlink to a file that no longer exists
//! are dropped along with the link.

use super::Plugin;
use crate::config::CloudStrmConfig;
use crate::database::Database;
use crate::models::{TransferEvent, TransferRecord};
use crate::scheduler::{ScheduledJob, SchedulerHandle, Trigger};
use crate::services::PendingQueue;
use crate::utils::strm::{cloud_path, strm_path, write_strm};
use crate::utils::RetryConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub const PLUGIN_ID: &str = "cloud_strm";
pub const UPLOAD_JOB: &str = "cloud_strm upload";
pub const STRM_JOB: &str = "cloud_strm strm";

pub struct CloudStrmPlugin {
    worker: Arc<CloudStrmWorker>,
    scheduler: SchedulerHandle,
}

/// State shared with the scheduled jobs
pub struct CloudStrmWorker {
    config: CloudStrmConfig,
    queue: PendingQueue,
    retry: RetryConfig,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
}

async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl CloudStrmWorker {
    pub fn new(config: CloudStrmConfig, db: Database, retry: RetryConfig) -> Self {
        Self {
            config,
            queue: PendingQueue::new(db, PLUGIN_ID),
            retry,
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    fn max_age(&self) -> Option<chrono::Duration> {
        i64::try_from(self.config.save_days)
            .ok()
            .and_then(chrono::Duration::try_days)
    }

    fn is_cloud_source(&self, src: &str) -> bool {
        !self.config.cloud_mount_prefix.is_empty() && src.contains(&self.config.cloud_mount_prefix)
    }

    fn cloud_target(&self, dest: &str) -> String {
        cloud_path(
            dest,
            &self.config.local_media_prefix,
            &self.config.cloud_mount_prefix,
        )
    }

    /// Delete the local `dest` and write `{dest without extension}.strm`
    /// holding `target`
    async fn replace_with_strm(&self, dest: &str, target: &str) -> io::Result<()> {
        let dest = Path::new(dest);
        if !remove_if_exists(dest).await? {
            warn!("{} already gone, writing strm anyway", dest.display());
        }
        let strm = strm_path(dest);
        write_strm(&strm, target).await?;
        info!("{} -> {}", strm.display(), target);
        Ok(())
    }

    /// Copy one record onto the cloud mount unless it is already there
    async fn upload(&self, record: &TransferRecord) -> io::Result<()> {
        if self.is_cloud_source(&record.src) {
            debug!("{} already lives on the cloud mount", record.src);
            return Ok(());
        }

        let target = self.cloud_target(&record.dest);
        let target = Path::new(&target);
        if tokio::fs::try_exists(target).await? {
            info!("{} already uploaded", target.display());
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&record.src, target).await?;
        info!("Uploaded {} -> {} ({} bytes)", record.src, target.display(), bytes);
        Ok(())
    }

    async fn upload_with_retry(&self, record: &TransferRecord) -> io::Result<()> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.upload(record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Upload of {} failed on attempt {}/{}, retrying in {:?}: {}",
                        record.src, attempt, max_attempts, delay, e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Upload every waiting record. Failures stay waiting for the next run.
    pub async fn upload_pending(&self) -> Result<UploadSummary> {
        let mut lists = self.queue.lock().await?;
        if lists.waiting.is_empty() {
            info!("Nothing waiting for upload");
            return Ok(UploadSummary::default());
        }

        info!("Uploading {} files", lists.waiting.len());
        let mut summary = UploadSummary::default();
        for record in lists.waiting.clone() {
            match self.upload_with_retry(&record).await {
                Ok(()) => {
                    lists.mark_uploaded(record.id);
                    summary.uploaded += 1;
                }
                Err(e) => {
                    error!("Upload of {} failed: {}", record.src, e);
                    summary.failed += 1;
                }
            }
        }
        lists.commit().await?;
        info!(
            "Upload finished: {} uploaded, {} failed",
            summary.uploaded, summary.failed
        );
        Ok(summary)
    }

    /// Swap uploaded files older than `save_days` (all of them when `force`)
    /// for strm files. Returns how many were replaced.
    pub async fn replace_expired(&self, now: DateTime<Utc>, force: bool) -> Result<usize> {
        let max_age = self.max_age();
        let mut lists = self.queue.lock().await?;
        let mut replaced = 0;
        let mut kept = Vec::with_capacity(lists.uploaded.len());

        for record in std::mem::take(&mut lists.uploaded) {
            let fresh = match max_age {
                Some(max_age) => now - record.transferred_at <= max_age,
                None => true,
            };
            if !force && fresh {
                kept.push(record);
                continue;
            }
            let target = self.cloud_target(&record.dest);
            match self.replace_with_strm(&record.dest, &target).await {
                Ok(()) => replaced += 1,
                Err(e) => {
                    error!("Replacing {} with strm failed: {}", record.dest, e);
                    kept.push(record);
                }
            }
        }

        lists.uploaded = kept;
        lists.commit().await?;
        if replaced > 0 {
            info!("Replaced {} local files with strm", replaced);
        }
        Ok(replaced)
    }

    /// Remove queued destinations that are symlinks to missing files and
    /// forget their records. Returns how many were removed.
    pub async fn clean_dangling(&self) -> Result<usize> {
        let mut lists = self.queue.lock().await?;
        let mut removed = 0;
        for list in [&mut lists.waiting, &mut lists.uploaded] {
            let mut kept = Vec::with_capacity(list.len());
            for record in std::mem::take(list) {
                match remove_dangling_link(Path::new(&record.dest)).await {
                    Ok(true) => {
                        info!("Removed dangling link {}", record.dest);
                        removed += 1;
                    }
                    Ok(false) => kept.push(record),
                    Err(e) => {
                        warn!("Checking {} failed: {}", record.dest, e);
                        kept.push(record);
                    }
                }
            }
            *list = kept;
        }
        lists.commit().await?;
        Ok(removed)
    }

    /// Retry waiting uploads, drop dangling links and swap expired (or, with
    /// `force`, all) uploaded files for strm files
    pub async fn maintain(&self, now: DateTime<Utc>, force: bool) -> Result<()> {
        self.clean_dangling().await?;
        self.upload_pending().await?;
        self.replace_expired(now, force).await?;
        Ok(())
    }
}

/// True when `path` was a symlink whose target is gone and has been removed
async fn remove_dangling_link(path: &Path) -> io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if !metadata.file_type().is_symlink() || tokio::fs::try_exists(path).await? {
        return Ok(false);
    }
    tokio::fs::remove_file(path).await?;
    Ok(true)
}

impl CloudStrmPlugin {
    pub fn new(
        config: CloudStrmConfig,
        db: Database,
        retry: RetryConfig,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            worker: Arc::new(CloudStrmWorker::new(config, db, retry)),
            scheduler,
        }
    }

    pub fn worker(&self) -> &Arc<CloudStrmWorker> {
        &self.worker
    }

    /// Delay before the upload job for a transfer
    pub fn upload_delay(&self, ongoing: bool) -> Duration {
        let config = &self.worker.config;
        if ongoing {
            Duration::from_secs(config.upload_delay_minutes.saturating_mul(60))
        } else {
            Duration::from_secs(config.batch_delay_secs)
        }
    }

    fn schedule_upload(&self, delay: Duration) {
        let worker = self.worker.clone();
        let scheduled = self.scheduler.schedule_once(UPLOAD_JOB, delay, move || {
            let worker = worker.clone();
            async move { worker.upload_pending().await.map(|_| ()) }
        });
        if scheduled {
            info!("Upload job scheduled in {:?}", delay);
        } else {
            warn!("Scheduler is not running, upload job not scheduled");
        }
    }
}

#[async_trait]
impl Plugin for CloudStrmPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn name(&self) -> &'static str {
        "Cloud strm"
    }

    fn enabled(&self) -> bool {
        self.worker.config.enabled
    }

    async fn on_transfer(&self, event: &TransferEvent) -> Result<()> {
        if event.file_list_new.is_empty() {
            return Ok(());
        }
        if event.file_list.len() != event.file_list_new.len() {
            warn!(
                "Transfer of '{}' has {} sources for {} destinations",
                event.media.title,
                event.file_list.len(),
                event.file_list_new.len()
            );
        }

        let worker = &self.worker;
        let mut records = Vec::new();
        for (src, dest) in event.file_list.iter().zip(&event.file_list_new) {
            if worker.is_cloud_source(src) {
                info!("{} was organised from the cloud mount, writing strm now", src);
                worker.replace_with_strm(dest, src).await?;
            } else {
                records.push(TransferRecord::new(src.as_str(), dest.as_str()));
            }
        }

        if records.is_empty() {
            return Ok(());
        }
        let added = worker.queue.enqueue(records).await?;
        info!("'{}': {} files waiting for upload", event.media.title, added);
        self.schedule_upload(self.upload_delay(event.media.ongoing));
        Ok(())
    }

    fn scheduled_jobs(self: Arc<Self>) -> Vec<ScheduledJob> {
        let worker = self.worker.clone();
        let minutes = self.worker.config.strm_interval_minutes.max(1);
        let every = Duration::from_secs(minutes.saturating_mul(60));
        vec![ScheduledJob::new(STRM_JOB, Trigger::Interval(every), move || {
            let worker = worker.clone();
            async move { worker.maintain(Utc::now(), false).await }
        })]
    }

    /// Clean now: retry uploads, then every uploaded file becomes a strm
    /// regardless of age
    async fn run_once(&self) -> Result<()> {
        self.worker.maintain(Utc::now(), true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerService;

    fn config() -> CloudStrmConfig {
        CloudStrmConfig {
            enabled: true,
            local_media_prefix: "/strm/".to_string(),
            cloud_mount_prefix: "/CloudNAS/115/".to_string(),
            upload_delay_minutes: 20,
            batch_delay_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upload_delay_depends_on_airing() {
        let (_scheduler, handle) = SchedulerService::new(chrono_tz::UTC);
        let db = Database::in_memory().await.unwrap();
        let plugin = CloudStrmPlugin::new(config(), db, RetryConfig::none(), handle);
        assert_eq!(plugin.upload_delay(true), Duration::from_secs(1200));
        assert_eq!(plugin.upload_delay(false), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_huge_values_do_not_overflow() {
        let (_scheduler, handle) = SchedulerService::new(chrono_tz::UTC);
        let db = Database::in_memory().await.unwrap();
        let config = CloudStrmConfig {
            upload_delay_minutes: u64::MAX,
            save_days: u64::MAX,
            ..config()
        };
        let plugin = CloudStrmPlugin::new(config, db, RetryConfig::none(), handle);
        assert_eq!(plugin.upload_delay(true), Duration::from_secs(u64::MAX));
        assert_eq!(plugin.worker().max_age(), None);
        assert_eq!(plugin.worker().replace_expired(Utc::now(), false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cloud_source_detection() {
        let db = Database::in_memory().await.unwrap();
        let worker = CloudStrmWorker::new(config(), db, RetryConfig::none());
        assert!(worker.is_cloud_source("/CloudNAS/115/anime/a.mkv"));
        assert!(!worker.is_cloud_source("/downloads/a.mkv"));
        assert_eq!(
            worker.cloud_target("/strm/anime/Show/S01E01.mkv"),
            "/CloudNAS/115/anime/Show/S01E01.mkv"
        );
    }
}
