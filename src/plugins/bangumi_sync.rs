//! Sync anime playback to Bangumi
//!
//! A played episode is resolved to its Bangumi subject and episode, the
//! subject is put into "watching" (or "watched" after the season finale) and
//! the episode is ticked once the viewer finishes it. Nothing is recorded
//! locally until every remote write for the event has succeeded.

use super::Plugin;
use crate::clients::bangumi::EPISODE_WATCHED;
use crate::clients::{BangumiApi, TmdbApi};
use crate::config::BangumiSyncConfig;
use crate::database::Database;
use crate::errors::{ClientError, ClientResult};
use crate::gating::{should_write, EventGate};
use crate::models::{CollectionStatus, EventKind, MediaKind, WebhookEvent};
use crate::services::{EpisodeQuery, ResolvedEpisode, SubjectResolver, SyncStateStore};
use crate::utils::retry::is_auth_failure;
use crate::utils::title::first_word;
use crate::utils::{with_retry, KeywordFilter, RetryConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

pub const PLUGIN_ID: &str = "bangumi_sync";
const UID_KEY: &str = "uid";

pub struct BangumiSyncPlugin {
    enabled: bool,
    mark_on_start: bool,
    gate: EventGate,
    bangumi: Arc<dyn BangumiApi>,
    resolver: SubjectResolver,
    states: SyncStateStore,
    db: Database,
    retry: RetryConfig,
    uid: OnceCell<u64>,
    /// Held for a whole sync so two events never both act on the same state
    lock: Mutex<()>,
}

/// Collection write needed to move the remote from `remote` to `target`
fn collection_write(remote: Option<CollectionStatus>, target: CollectionStatus) -> bool {
    match remote {
        Some(CollectionStatus::Watched) => false,
        Some(CollectionStatus::Watching) => target == CollectionStatus::Watched,
        _ => true,
    }
}

/// Build the catalog query from a webhook event; `None` when the event does
/// not say which episode was played
pub fn episode_query(event: &WebhookEvent) -> Option<EpisodeQuery> {
    let title = first_word(event.item_name.as_deref().unwrap_or_default());
    let episode = event.episode_id.filter(|e| *e > 0)?;
    if title.is_empty() {
        return None;
    }
    Some(EpisodeQuery {
        title,
        tmdb_id: event.tmdb_id.as_deref().and_then(|id| id.trim().parse().ok()),
        season: event.season_id.unwrap_or(1).max(1),
        episode,
        provider_episode_id: event
            .provider_id("bangumi")
            .and_then(|id| id.parse().ok()),
        air_date: event.air_date,
    })
}

impl BangumiSyncPlugin {
    pub fn new(
        config: &BangumiSyncConfig,
        bangumi: Arc<dyn BangumiApi>,
        tmdb: Option<Arc<dyn TmdbApi>>,
        language: &str,
        db: Database,
        retry: RetryConfig,
    ) -> Self {
        let has_token = config.token.as_deref().is_some_and(|t| !t.trim().is_empty());
        if config.enabled && !has_token {
            warn!("Bangumi sync enabled without a token, staying disabled");
        }

        Self {
            enabled: config.enabled && has_token,
            mark_on_start: config.mark_on_start,
            gate: EventGate::new(
                config.users.clone(),
                vec![
                    EventKind::PlaybackStart,
                    EventKind::PlaybackStop,
                    EventKind::MarkPlayed,
                ],
                KeywordFilter::new(&config.anime_keywords, Vec::<String>::new()),
                config.complete_threshold,
            ),
            resolver: SubjectResolver::new(bangumi.clone(), tmdb, language, retry.clone()),
            bangumi,
            states: SyncStateStore::new(db.clone(), PLUGIN_ID),
            db,
            retry,
            uid: OnceCell::new(),
            lock: Mutex::new(()),
        }
    }

    /// Token owner's id, asked once and remembered in the plugin data
    async fn uid(&self) -> Result<u64> {
        let uid = self
            .uid
            .get_or_try_init(|| async {
                if let Some(uid) = self.db.get_plugin_data::<u64>(PLUGIN_ID, UID_KEY).await? {
                    return Ok::<u64, anyhow::Error>(uid);
                }
                let uid = with_retry(&self.retry, || self.bangumi.me(), "bangumi me").await?;
                self.db.save_plugin_data(PLUGIN_ID, UID_KEY, &uid).await?;
                info!("Bangumi user id {}", uid);
                Ok(uid)
            })
            .await?;
        Ok(*uid)
    }

    async fn sync(&self, event: &WebhookEvent, completed: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let Some(query) = episode_query(event) else {
            warn!(
                "Cannot tell which episode '{}' is, skipping",
                event.item_name.as_deref().unwrap_or_default()
            );
            return Ok(());
        };

        let Some(resolved) = self.resolver.resolve(&query).await? else {
            return Ok(());
        };
        let ResolvedEpisode {
            subject, episode, ..
        } = &resolved;

        let completes_subject = completed && resolved.is_season_finale;
        let prior = self.states.get(subject.id).await?;
        let decision = should_write(prior.as_ref(), completes_subject);

        let mut collection = None;
        if decision.write {
            let target = if completes_subject {
                CollectionStatus::Watched
            } else {
                CollectionStatus::Watching
            };
            collection = Some(self.write_collection(subject.id, target).await?);
        } else {
            debug!("Subject {} already synced, collection untouched", subject.id);
        }

        let wants_mark =
            completed || (self.mark_on_start && event.kind() == EventKind::PlaybackStart);
        let already_marked = prior.as_ref().is_some_and(|s| s.is_marked(episode.id));
        let mut marked = false;
        if wants_mark && !already_marked {
            self.mark_episode(episode.id).await?;
            marked = true;
        }

        let name = subject.display_name().to_string();
        self.states
            .update(subject.id, &name, |state| {
                if let Some(status) = collection {
                    state.collection = Some(status);
                }
                if marked {
                    state.marked_episodes.insert(episode.id);
                }
            })
            .await?;

        info!(
            "{} episode {} synced (bangumi episode {}, score {}{})",
            name,
            query.episode,
            episode.id,
            resolved.score,
            if marked { ", marked watched" } else { "" }
        );
        Ok(())
    }

    /// Returns the status the remote ends up with
    async fn write_collection(
        &self,
        subject_id: u64,
        target: CollectionStatus,
    ) -> Result<CollectionStatus> {
        let uid = self.uid().await?;
        let remote = with_retry(
            &self.retry,
            || self.bangumi.collection(uid, subject_id),
            "bangumi collection",
        )
        .await?;

        if !collection_write(remote, target) {
            debug!("Subject {} already {:?} on bangumi", subject_id, remote);
            return Ok(remote.unwrap_or(target));
        }

        with_retry(
            &self.retry,
            || self.bangumi.set_collection(subject_id, target),
            "bangumi set collection",
        )
        .await?;
        info!("Subject {} collection set to {:?}", subject_id, target);
        Ok(target)
    }

    async fn mark_episode(&self, episode_id: u64) -> ClientResult<()> {
        let current = with_retry(
            &self.retry,
            || self.bangumi.episode_collection(episode_id),
            "bangumi episode collection",
        )
        .await?;
        if current == Some(EPISODE_WATCHED) {
            debug!("Bangumi episode {} already watched", episode_id);
            return Ok(());
        }
        with_retry(
            &self.retry,
            || self.bangumi.mark_episode_watched(episode_id),
            "bangumi mark episode",
        )
        .await
    }
}

#[async_trait]
impl Plugin for BangumiSyncPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn name(&self) -> &'static str {
        "Bangumi sync"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn on_webhook(&self, event: &WebhookEvent) -> Result<()> {
        let decision = self.gate.evaluate(event);
        if !decision.proceed {
            return Ok(());
        }
        if event.media_kind() != MediaKind::Episode {
            debug!("Bangumi sync ignores non-episode item");
            return Ok(());
        }

        let result = self.sync(event, decision.completed).await;
        if let Err(e) = &result {
            let auth = e
                .downcast_ref::<ClientError>()
                .is_some_and(is_auth_failure);
            if auth {
                warn!("Bangumi rejected the access token, renew it in the configuration");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_write_transitions() {
        use CollectionStatus::*;
        assert!(collection_write(None, Watching));
        assert!(collection_write(Some(Wish), Watching));
        assert!(collection_write(Some(OnHold), Watched));
        assert!(!collection_write(Some(Watching), Watching));
        assert!(collection_write(Some(Watching), Watched));
        assert!(!collection_write(Some(Watched), Watching));
        assert!(!collection_write(Some(Watched), Watched));
    }

    #[test]
    fn test_episode_query_from_event() {
        let event = WebhookEvent {
            item_name: Some("葬送的芙莉莲 S01E05 魔法使的梦想".to_string()),
            season_id: Some(1),
            episode_id: Some(5),
            tmdb_id: Some("209867".to_string()),
            ..Default::default()
        };
        let query = episode_query(&event).unwrap();
        assert_eq!(query.title, "葬送的芙莉莲");
        assert_eq!(query.tmdb_id, Some(209867));
        assert_eq!(query.season, 1);
        assert_eq!(query.episode, 5);
        assert_eq!(query.provider_episode_id, None);

        let mut event = event;
        event
            .provider_ids
            .insert("Bangumi".to_string(), "1227087".to_string());
        assert_eq!(episode_query(&event).unwrap().provider_episode_id, Some(1227087));
    }

    #[test]
    fn test_episode_query_needs_an_episode() {
        let event = WebhookEvent {
            item_name: Some("葬送的芙莉莲".to_string()),
            ..Default::default()
        };
        assert!(episode_query(&event).is_none());

        let event = WebhookEvent {
            item_name: Some("x S01E00".to_string()),
            episode_id: Some(0),
            ..Default::default()
        };
        assert!(episode_query(&event).is_none());
    }
}
