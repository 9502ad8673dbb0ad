//! Sync playback to the Douban watch record
//!
//! Series go to "watching" when played and "watched" when the last episode
//! of the season is played; movies go straight to "watched". Synced titles
//! are remembered under the `data` key so repeated plays stay quiet.

use super::Plugin;
use crate::clients::{DoubanApi, DoubanInterest, TmdbApi};
use crate::config::DoubanSyncConfig;
use crate::database::Database;
use crate::errors::ClientError;
use crate::gating::{should_write, EventGate, SyncRecord};
use crate::models::{EventKind, MediaKind, WebhookEvent};
use crate::utils::retry::is_auth_failure;
use crate::utils::title::{season_title, series_title};
use crate::utils::{with_retry, KeywordFilter, RetryConfig};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const PLUGIN_ID: &str = "douban_sync";
pub const DATA_KEY: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoubanMediaKind {
    Tv,
    Movie,
}

/// One title already written to Douban
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubanRecord {
    pub subject_id: String,
    pub subject_name: String,
    pub interest: DoubanInterest,
    pub kind: DoubanMediaKind,
    pub synced_at: DateTime<Utc>,
}

impl SyncRecord for DoubanRecord {
    fn in_progress(&self) -> bool {
        self.interest == DoubanInterest::Do
    }

    fn completed(&self) -> bool {
        self.interest == DoubanInterest::Collect
    }
}

/// What a played item means for Douban
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    /// Search keyword and record key
    title: String,
    kind: DoubanMediaKind,
    interest: DoubanInterest,
}

pub struct DoubanSyncPlugin {
    enabled: bool,
    private: bool,
    skip_first_episode: bool,
    gate: EventGate,
    douban: Arc<dyn DoubanApi>,
    tmdb: Option<Arc<dyn TmdbApi>>,
    language: String,
    db: Database,
    retry: RetryConfig,
    lock: Mutex<()>,
}

impl DoubanSyncPlugin {
    pub fn new(
        config: &DoubanSyncConfig,
        douban: Arc<dyn DoubanApi>,
        tmdb: Option<Arc<dyn TmdbApi>>,
        language: &str,
        db: Database,
        retry: RetryConfig,
    ) -> Self {
        let has_cookie = config.cookie.as_deref().is_some_and(|c| !c.trim().is_empty());
        if config.enabled && !has_cookie {
            warn!("Douban sync enabled without a cookie, staying disabled");
        }

        Self {
            enabled: config.enabled && has_cookie,
            private: config.private,
            skip_first_episode: config.skip_first_episode,
            gate: EventGate::new(
                config.users.clone(),
                vec![
                    EventKind::PlaybackStart,
                    EventKind::PlaybackStop,
                    EventKind::MarkPlayed,
                ],
                KeywordFilter::new(Vec::<String>::new(), &config.exclude_keywords),
                config.complete_threshold,
            ),
            douban,
            tmdb,
            language: language.to_string(),
            db,
            retry,
            lock: Mutex::new(()),
        }
    }

    pub async fn records(&self) -> Result<BTreeMap<String, DoubanRecord>> {
        Ok(self
            .db
            .get_plugin_data(PLUGIN_ID, DATA_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Episode count of `season` according to TMDB, best effort
    async fn season_episode_count(&self, title: &str, tmdb_id: Option<u64>, season: u32) -> Option<u32> {
        let tmdb = self.tmdb.as_ref()?;
        let tv_id = match tmdb_id {
            Some(id) => id,
            None => {
                let hits = with_retry(
                    &self.retry,
                    || tmdb.search_tv(title, &self.language),
                    "tmdb search",
                )
                .await
                .map_err(|e| warn!("TMDB search for '{}' failed: {}", title, e))
                .ok()?;
                hits.first()?.id
            }
        };

        let details = with_retry(
            &self.retry,
            || tmdb.tv_details(tv_id, &self.language),
            "tmdb details",
        )
        .await
        .map_err(|e| warn!("TMDB details for {} failed: {}", tv_id, e))
        .ok()?;
        details.season(season).map(|s| s.episode_count)
    }

    async fn target(&self, event: &WebhookEvent) -> Option<Target> {
        let item_name = event.item_name.as_deref().unwrap_or_default();
        match event.media_kind() {
            MediaKind::Movie => {
                let title = item_name.trim().to_string();
                (!title.is_empty()).then_some(Target {
                    title,
                    kind: DoubanMediaKind::Movie,
                    interest: DoubanInterest::Collect,
                })
            }
            MediaKind::Episode => {
                let title = series_title(item_name);
                let season = event.season_id.unwrap_or(1).max(1);
                let Some(episode) = event.episode_id else {
                    warn!("'{}' carries no episode number, skipping", item_name);
                    return None;
                };
                if title.is_empty() {
                    return None;
                }
                if self.skip_first_episode && episode < 2 {
                    info!("Episode 1 of '{}' is not synced to Douban", title);
                    return None;
                }

                let tmdb_id = event.tmdb_id.as_deref().and_then(|id| id.trim().parse().ok());
                let count = self.season_episode_count(&title, tmdb_id, season).await;
                let interest = if count == Some(episode) {
                    info!("Episode {} is the last of '{}' season {}", episode, title, season);
                    DoubanInterest::Collect
                } else {
                    DoubanInterest::Do
                };
                Some(Target {
                    title: season_title(&title, season),
                    kind: DoubanMediaKind::Tv,
                    interest,
                })
            }
            MediaKind::Other => None,
        }
    }

    async fn sync(&self, target: Target) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.records().await?;

        let completes = target.interest == DoubanInterest::Collect;
        let decision = should_write(records.get(&target.title), completes);
        if !decision.write {
            debug!("'{}' already synced to Douban", target.title);
            return Ok(());
        }

        let Some(subject) = self.douban.search_subject(&target.title).await? else {
            warn!("No Douban subject for '{}', check the cookie", target.title);
            return Ok(());
        };
        info!("'{}' => Douban '{}' (subject {})", target.title, subject.title, subject.id);

        self.douban
            .set_interest(&subject.id, target.interest, self.private)
            .await?;

        records.insert(
            target.title.clone(),
            DoubanRecord {
                subject_id: subject.id,
                subject_name: subject.title,
                interest: target.interest,
                kind: target.kind,
                synced_at: Utc::now(),
            },
        );
        self.db.save_plugin_data(PLUGIN_ID, DATA_KEY, &records).await?;
        info!("'{}' marked {} on Douban", target.title, target.interest.as_str());
        Ok(())
    }
}

#[async_trait]
impl Plugin for DoubanSyncPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn name(&self) -> &'static str {
        "Douban sync"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn on_webhook(&self, event: &WebhookEvent) -> Result<()> {
        if !self.gate.evaluate(event).proceed {
            return Ok(());
        }
        let Some(target) = self.target(event).await else {
            return Ok(());
        };

        let result = self.sync(target).await;
        if let Err(e) = &result {
            if e.downcast_ref::<ClientError>().is_some_and(is_auth_failure) {
                warn!("Douban rejected the cookie, renew it in the configuration");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(interest: DoubanInterest) -> DoubanRecord {
        DoubanRecord {
            subject_id: "35914462".to_string(),
            subject_name: "秘密森林 第二季".to_string(),
            interest,
            kind: DoubanMediaKind::Tv,
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_dedup_rules() {
        let watching = record(DoubanInterest::Do);
        assert!(!should_write(Some(&watching), false).write);
        assert!(should_write(Some(&watching), true).forced);

        let watched = record(DoubanInterest::Collect);
        assert!(!should_write(Some(&watched), true).write);
    }

    #[test]
    fn test_record_serialization() {
        let value = serde_json::to_value(record(DoubanInterest::Do)).unwrap();
        assert_eq!(value["interest"], "do");
        assert_eq!(value["kind"], "tv");
    }
}
