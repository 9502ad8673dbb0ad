//! Bulk tracker URL rewrite in the downloader

use super::{run_once_job, Plugin, RUN_ON_START_DELAY};
use crate::clients::{TorrentClient, TrackerEdit};
use crate::config::TrackerEditorConfig;
use crate::scheduler::{ScheduledJob, Trigger};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub const PLUGIN_ID: &str = "tracker_editor";

/// Edits replacing `target` with `replacement` in every tracker containing it
pub fn plan_tracker_edits(trackers: &[String], target: &str, replacement: &str) -> Vec<TrackerEdit> {
    if target.is_empty() {
        return Vec::new();
    }
    trackers
        .iter()
        .filter(|url| url.contains(target))
        .map(|url| TrackerEdit {
            original: url.clone(),
            replacement: url.replace(target, replacement),
        })
        .filter(|edit| edit.original != edit.replacement)
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EditSummary {
    pub torrents: usize,
    pub trackers: usize,
}

pub struct TrackerEditorPlugin {
    config: TrackerEditorConfig,
    client: Arc<dyn TorrentClient>,
}

impl TrackerEditorPlugin {
    pub fn new(config: TrackerEditorConfig, client: Arc<dyn TorrentClient>) -> Self {
        if config.enabled && config.target_domain.is_empty() {
            warn!("Tracker editor enabled without a target domain, staying disabled");
        }
        Self { config, client }
    }

    pub async fn edit_all(&self) -> Result<EditSummary> {
        let torrents = self.client.torrents().await?;
        info!(
            "Checking {} torrents in {} for '{}'",
            torrents.len(),
            self.client.kind(),
            self.config.target_domain
        );

        let mut summary = EditSummary::default();
        for torrent in &torrents {
            let edits = plan_tracker_edits(
                &torrent.trackers,
                &self.config.target_domain,
                &self.config.replace_domain,
            );
            if edits.is_empty() {
                continue;
            }
            for edit in &edits {
                info!("{}: {} -> {}", torrent.name, edit.original, edit.replacement);
            }
            self.client.apply_tracker_edits(torrent, &edits).await?;
            summary.torrents += 1;
            summary.trackers += edits.len();
        }
        Ok(summary)
    }
}

#[async_trait]
impl Plugin for TrackerEditorPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn name(&self) -> &'static str {
        "Tracker editor"
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.target_domain.is_empty()
    }

    fn scheduled_jobs(self: Arc<Self>) -> Vec<ScheduledJob> {
        if !self.config.run_on_start {
            return Vec::new();
        }
        vec![run_once_job(
            &self,
            "tracker_editor on start",
            Trigger::Once(RUN_ON_START_DELAY),
        )]
    }

    async fn run_once(&self) -> Result<()> {
        let summary = self.edit_all().await?;
        info!(
            "Tracker replacement done: {} trackers in {} torrents",
            summary.trackers, summary.torrents
        );
        Ok(())
    }
}
