//! Resolve a played episode to its Bangumi subject and episode
//!
//! TMDB supplies the original title, the season's premiere date and the
//! episode's own air date and name; Bangumi is then searched for the subject
//! (air-date filtered around the premiere) and its episode list is run
//! through the matcher.

use crate::clients::{BangumiApi, BangumiSubject, TmdbApi, TmdbSeason, TmdbTvDetails};
use crate::errors::ClientResult;
use crate::matching::{AirDateWindow, EpisodeMatcher, MatchOutcome};
use crate::models::{EpisodeCandidate, LocalEpisode};
use crate::utils::title::season_title;
use crate::utils::{with_retry, RetryConfig, TtlCache};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SUBJECT_CACHE_CAPACITY: usize = 100;
const SUBJECT_CACHE_TTL: Duration = Duration::from_secs(3600);
const EPISODE_CACHE_CAPACITY: usize = 32;
const EPISODE_CACHE_TTL: Duration = Duration::from_secs(600);

/// What the media server told us about the played episode
#[derive(Debug, Clone, Default)]
pub struct EpisodeQuery {
    pub title: String,
    pub tmdb_id: Option<u64>,
    pub season: u32,
    pub episode: u32,
    /// Bangumi episode id, when the media server already knows it
    pub provider_episode_id: Option<u64>,
    pub air_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEpisode {
    pub subject: BangumiSubject,
    pub episode: EpisodeCandidate,
    pub score: u32,
    /// Played episode is the last one of its season according to TMDB
    pub is_season_finale: bool,
}

#[derive(Debug, Clone, Default)]
struct TmdbContext {
    original_title: Option<String>,
    season_air_date: Option<NaiveDate>,
    season_episode_count: Option<u32>,
    episode_air_date: Option<NaiveDate>,
    episode_name: Option<String>,
}

type SubjectKey = (String, Option<Vec<String>>);

pub struct SubjectResolver {
    bangumi: Arc<dyn BangumiApi>,
    tmdb: Option<Arc<dyn TmdbApi>>,
    language: String,
    retry: RetryConfig,
    subjects: TtlCache<SubjectKey, Vec<BangumiSubject>>,
    episodes: TtlCache<u64, Vec<EpisodeCandidate>>,
    matcher: EpisodeMatcher,
}

impl SubjectResolver {
    pub fn new(
        bangumi: Arc<dyn BangumiApi>,
        tmdb: Option<Arc<dyn TmdbApi>>,
        language: &str,
        retry: RetryConfig,
    ) -> Self {
        Self {
            bangumi,
            tmdb,
            language: language.to_string(),
            retry,
            subjects: TtlCache::new(SUBJECT_CACHE_CAPACITY, SUBJECT_CACHE_TTL),
            episodes: TtlCache::new(EPISODE_CACHE_CAPACITY, EPISODE_CACHE_TTL),
            matcher: EpisodeMatcher::new(AirDateWindow::EPISODE),
        }
    }

    /// `Ok(None)` is a soft miss (no subject or no episode matched); errors
    /// are remote failures that survived the retries.
    pub async fn resolve(&self, query: &EpisodeQuery) -> ClientResult<Option<ResolvedEpisode>> {
        let context = self.tmdb_context(query).await;

        let base_title = context
            .original_title
            .clone()
            .unwrap_or_else(|| query.title.clone());
        let keyword = season_title(&base_title, query.season);

        let Some(subject) = self.find_subject(&keyword, context.season_air_date).await? else {
            warn!("No bangumi subject found for '{}'", keyword);
            return Ok(None);
        };
        info!("'{}' => {} (bangumi subject {})", keyword, subject.display_name(), subject.id);

        let subject_id = subject.id;
        let candidates = self
            .episodes
            .get_or_try_insert_with(subject_id, || {
                with_retry(
                    &self.retry,
                    || self.bangumi.episodes(subject_id),
                    "bangumi episodes",
                )
            })
            .await?;

        let local = LocalEpisode {
            number: query.episode,
            provider_id: query.provider_episode_id,
            air_date: query.air_date.or(context.episode_air_date),
            name: context.episode_name.clone(),
        };

        match self.matcher.best_match(&local, &candidates) {
            MatchOutcome::Matched { candidate, score } => {
                debug!(
                    "Episode {} of '{}' matched bangumi episode {} (score {})",
                    query.episode, keyword, candidate.id, score
                );
                Ok(Some(ResolvedEpisode {
                    subject,
                    episode: candidate,
                    score,
                    is_season_finale: context
                        .season_episode_count
                        .is_some_and(|count| count > 0 && count == query.episode),
                }))
            }
            MatchOutcome::NoMatch => {
                warn!(
                    "No bangumi episode of subject {} matched episode {}; numbering may differ from TMDB",
                    subject_id, query.episode
                );
                Ok(None)
            }
        }
    }

    /// Search with the premiere-date filter first and unfiltered second
    async fn find_subject(
        &self,
        keyword: &str,
        premiere: Option<NaiveDate>,
    ) -> ClientResult<Option<BangumiSubject>> {
        let mut filters = Vec::new();
        if let Some(date) = premiere {
            filters.push(Some(AirDateWindow::SUBJECT.search_filter(date)));
        }
        filters.push(None);

        for filter in filters {
            let key = (keyword.to_string(), filter.clone());
            let subjects = self
                .subjects
                .get_or_try_insert_with(key, || {
                    with_retry(
                        &self.retry,
                        || self.bangumi.search_subjects(keyword, filter.clone()),
                        "bangumi subject search",
                    )
                })
                .await?;
            if let Some(subject) = subjects.into_iter().next() {
                return Ok(Some(subject));
            }
        }
        Ok(None)
    }

    /// TMDB lookups are best effort: without them the local title and event
    /// air date are used as they are
    async fn tmdb_context(&self, query: &EpisodeQuery) -> TmdbContext {
        let Some(tmdb) = self.tmdb.as_ref() else {
            return TmdbContext::default();
        };

        let details = match self.tmdb_details(tmdb.as_ref(), query).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                warn!("TMDB has no series for '{}'", query.title);
                return TmdbContext::default();
            }
            Err(e) => {
                warn!("TMDB lookup for '{}' failed: {}", query.title, e);
                return TmdbContext::default();
            }
        };

        let season_summary = details.season(query.season);
        let mut context = TmdbContext {
            original_title: Some(details.original_name.clone()).filter(|t| !t.is_empty()),
            season_air_date: season_summary.and_then(|s| s.air_date),
            season_episode_count: season_summary.map(|s| s.episode_count),
            ..Default::default()
        };

        let season: ClientResult<TmdbSeason> = with_retry(
            &self.retry,
            || tmdb.season_details(details.id, query.season, &self.language),
            "tmdb season",
        )
        .await;
        match season {
            Ok(season) => {
                context.season_air_date = context.season_air_date.or(season.air_date);
                if let Some(episode) = season.episode(query.episode) {
                    context.episode_air_date = episode.air_date;
                    context.episode_name = episode.name.clone().filter(|n| !n.is_empty());
                }
            }
            Err(e) => warn!("TMDB season {} of {} failed: {}", query.season, details.id, e),
        }
        context
    }

    async fn tmdb_details(
        &self,
        tmdb: &dyn TmdbApi,
        query: &EpisodeQuery,
    ) -> ClientResult<Option<TmdbTvDetails>> {
        let tv_id = match query.tmdb_id {
            Some(id) => id,
            None => {
                let results = with_retry(
                    &self.retry,
                    || tmdb.search_tv(&query.title, &self.language),
                    "tmdb search",
                )
                .await?;
                match results.first() {
                    Some(hit) => hit.id,
                    None => return Ok(None),
                }
            }
        };

        with_retry(
            &self.retry,
            || tmdb.tv_details(tv_id, &self.language),
            "tmdb details",
        )
        .await
        .map(Some)
    }
}
