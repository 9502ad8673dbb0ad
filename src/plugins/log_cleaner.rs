//! Trim plugin log files to their last `rows` lines

use super::{run_once_job, Plugin, RUN_ON_START_DELAY};
use crate::config::LogCleanerConfig;
use crate::scheduler::{ScheduledJob, Trigger};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub const PLUGIN_ID: &str = "log_cleaner";

/// Keep the last `rows` lines of `content`; returns the kept text and how
/// many lines were dropped
pub fn keep_last_lines(content: &str, rows: usize) -> (String, usize) {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let dropped = lines.len().saturating_sub(rows);
    (lines[dropped..].concat(), dropped)
}

pub struct LogCleanerPlugin {
    config: LogCleanerConfig,
}

impl LogCleanerPlugin {
    pub fn new(config: LogCleanerConfig) -> Self {
        Self { config }
    }

    /// Selected plugin logs, or every `*.log` in the directory
    async fn log_files(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.log_dir;
        if !self.config.plugin_ids.is_empty() {
            return Ok(self
                .config
                .plugin_ids
                .iter()
                .map(|id| dir.join(format!("{}.log", id.trim().to_lowercase())))
                .collect());
        }

        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Log directory {} does not exist", dir.display());
                return Ok(files);
            }
            Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "log") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Returns the total number of lines removed
    pub async fn clean(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.log_files().await? {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} does not exist", path.display());
                    continue;
                }
                Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
            };

            let (kept, dropped) = keep_last_lines(&content, self.config.rows);
            if dropped == 0 {
                continue;
            }
            tokio::fs::write(&path, kept)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Removed {} lines from {}", dropped, path.display());
            removed += dropped;
        }
        Ok(removed)
    }
}

#[async_trait]
impl Plugin for LogCleanerPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn name(&self) -> &'static str {
        "Log cleaner"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn scheduled_jobs(self: Arc<Self>) -> Vec<ScheduledJob> {
        let mut jobs = vec![run_once_job(
            &self,
            "log_cleaner clean",
            Trigger::Cron(self.config.cron.clone()),
        )];
        if self.config.run_on_start {
            jobs.push(run_once_job(
                &self,
                "log_cleaner on start",
                Trigger::Once(RUN_ON_START_DELAY),
            ));
        }
        jobs
    }

    async fn run_once(&self) -> Result<()> {
        let removed = self.clean().await?;
        info!("Log cleaning removed {} lines", removed);
        Ok(())
    }
}
