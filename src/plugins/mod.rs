//! Plugins and the registry that dispatches host events to them
//!
//! A plugin is a leaf: it filters the events it cares about, talks to its
//! remote services and keeps its own blobs in the plugin-data store. The
//! registry only fans events out and collects scheduled jobs.

use crate::database::{Database, PluginDataEntry};
use crate::errors::{AppError, AppResult};
use crate::models::{PluginInfo, TransferEvent, WebhookEvent};
use crate::scheduler::{ScheduledJob, SchedulerService, Trigger};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod ani_strm;
pub mod bangumi_sync;
pub mod cloud_strm;
pub mod douban_sync;
pub mod log_cleaner;
pub mod tracker_editor;

pub use ani_strm::AniStrmPlugin;
pub use bangumi_sync::BangumiSyncPlugin;
pub use cloud_strm::CloudStrmPlugin;
pub use douban_sync::DoubanSyncPlugin;
pub use log_cleaner::LogCleanerPlugin;
pub use tracker_editor::TrackerEditorPlugin;

/// Delay of the one-shot job registered for "run on start"
pub const RUN_ON_START_DELAY: Duration = Duration::from_secs(3);

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool;

    async fn on_webhook(&self, _event: &WebhookEvent) -> Result<()> {
        Ok(())
    }

    async fn on_transfer(&self, _event: &TransferEvent) -> Result<()> {
        Ok(())
    }

    /// Jobs to register while the plugin is enabled
    fn scheduled_jobs(self: Arc<Self>) -> Vec<ScheduledJob> {
        Vec::new()
    }

    /// Manual "run now" trigger
    async fn run_once(&self) -> Result<()> {
        Err(anyhow!("plugin '{}' has no manual run", self.id()))
    }
}

/// Job that runs `plugin.run_once()`
pub fn run_once_job<P: Plugin + 'static>(plugin: &Arc<P>, name: &str, trigger: Trigger) -> ScheduledJob {
    let plugin = plugin.clone();
    ScheduledJob::new(name, trigger, move || {
        let plugin = plugin.clone();
        async move { plugin.run_once().await }
    })
}

pub struct PluginRegistry {
    db: Database,
    plugins: Vec<Arc<dyn Plugin>>,
    jobs: HashMap<&'static str, Vec<String>>,
}

impl PluginRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            plugins: Vec::new(),
            jobs: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        info!(
            "Registered plugin '{}' ({}){}",
            plugin.id(),
            plugin.name(),
            if plugin.enabled() { "" } else { " [disabled]" }
        );
        self.plugins.push(plugin);
    }

    /// Hand the jobs of every enabled plugin to `scheduler`; returns how many
    /// were accepted
    pub fn register_jobs(&mut self, scheduler: &mut SchedulerService) -> usize {
        let mut accepted = 0;
        for plugin in self.plugins.iter().filter(|p| p.enabled()) {
            for job in plugin.clone().scheduled_jobs() {
                let name = job.name.clone();
                if scheduler.add_job(job) {
                    self.jobs.entry(plugin.id()).or_default().push(name);
                    accepted += 1;
                }
            }
        }
        accepted
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.id() == id).cloned()
    }

    pub fn list(&self) -> Vec<PluginInfo> {
        self.plugins
            .iter()
            .map(|p| PluginInfo {
                id: p.id().to_string(),
                name: p.name().to_string(),
                enabled: p.enabled(),
                jobs: self.jobs.get(p.id()).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// Offer the event to every enabled plugin in registration order.
    /// Returns how many handled it without error.
    pub async fn dispatch_webhook(&self, event: &WebhookEvent) -> usize {
        let mut handled = 0;
        for plugin in self.plugins.iter().filter(|p| p.enabled()) {
            match plugin.on_webhook(event).await {
                Ok(()) => handled += 1,
                Err(e) => warn!("Plugin '{}' failed on '{}' event: {:#}", plugin.id(), event.event, e),
            }
        }
        debug!("Webhook '{}' dispatched to {} plugins", event.event, handled);
        handled
    }

    pub async fn dispatch_transfer(&self, event: &TransferEvent) -> usize {
        let mut handled = 0;
        for plugin in self.plugins.iter().filter(|p| p.enabled()) {
            match plugin.on_transfer(event).await {
                Ok(()) => handled += 1,
                Err(e) => warn!(
                    "Plugin '{}' failed on transfer of '{}': {:#}",
                    plugin.id(),
                    event.media.title,
                    e
                ),
            }
        }
        handled
    }

    pub async fn plugin_data(&self, id: &str) -> AppResult<Vec<PluginDataEntry>> {
        if self.get(id).is_none() {
            return Err(AppError::not_found("plugin", id));
        }
        Ok(self.db.list_plugin_data(id).await?)
    }

    /// Drop one stored entry of a plugin, e.g. to force a full resync
    pub async fn delete_plugin_data(&self, id: &str, key: &str) -> AppResult<()> {
        if self.get(id).is_none() {
            return Err(AppError::not_found("plugin", id));
        }
        if !self.db.delete_plugin_data(id, key).await? {
            return Err(AppError::not_found("plugin data", format!("{id}/{key}")));
        }
        info!("Deleted plugin data {}/{}", id, key);
        Ok(())
    }

    /// Look up an enabled plugin for a manual run
    pub fn runnable(&self, id: &str) -> AppResult<Arc<dyn Plugin>> {
        let plugin = self.get(id).ok_or_else(|| AppError::not_found("plugin", id))?;
        if !plugin.enabled() {
            return Err(AppError::validation(format!("plugin '{id}' is disabled")));
        }
        Ok(plugin)
    }
}
