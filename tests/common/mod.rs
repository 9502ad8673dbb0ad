#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use media_hooks::clients::{
    AniOpenApi, BangumiApi, BangumiSubject, DoubanApi, DoubanInterest, DoubanSubject, TmdbApi,
    TmdbEpisode, TmdbSeason, TmdbTvDetails, TmdbTvSummary, TorrentClient, TorrentTrackers,
    TrackerEdit,
};
use media_hooks::clients::tmdb::TmdbSeasonSummary;
use media_hooks::errors::{ClientError, ClientResult};
use media_hooks::models::{CollectionStatus, EpisodeCandidate, WebhookEvent};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const SUBJECT_ID: u64 = 400602;
pub const TMDB_ID: u64 = 209867;
pub const SEASON_EPISODES: u32 = 28;

pub fn premiere() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 9, 29).unwrap()
}

/// Weekly release starting at the premiere
pub fn air_date(episode: u32) -> NaiveDate {
    premiere() + Duration::days(7 * (episode as i64 - 1))
}

pub fn episode_event(event: &str, episode: u32, percentage: Option<f64>) -> WebhookEvent {
    WebhookEvent {
        event: event.to_string(),
        channel: Some("emby".to_string()),
        item_type: Some("Episode".to_string()),
        item_name: Some(format!("葬送的芙莉莲 S01E{episode:02} 第{episode}集")),
        item_path: Some(format!(
            "/media/anime/葬送的芙莉莲 (2023)/Season 1/葬送的芙莉莲 - S01E{episode:02}.mkv"
        )),
        season_id: Some(1),
        episode_id: Some(episode),
        tmdb_id: Some(TMDB_ID.to_string()),
        percentage,
        user_name: Some("honue".to_string()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Bangumi
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBangumi {
    pub calls: Mutex<Vec<String>>,
    /// Air-date filter of every subject search, in call order
    pub searches: Mutex<Vec<Option<Vec<String>>>>,
    pub collections: Mutex<HashMap<u64, CollectionStatus>>,
    pub watched: Mutex<HashSet<u64>>,
    pub fail_marks: AtomicBool,
}

impl FakeBangumi {
    pub fn episode_id(episode: u32) -> u64 {
        1000 + episode as u64
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Remote writes only, in call order
    pub fn writes(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("set_collection") || c.starts_with("mark"))
            .cloned()
            .collect()
    }

    pub fn set_fail_marks(&self, fail: bool) {
        self.fail_marks.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BangumiApi for FakeBangumi {
    async fn search_subjects(
        &self,
        keyword: &str,
        air_date: Option<Vec<String>>,
    ) -> ClientResult<Vec<BangumiSubject>> {
        tokio::task::yield_now().await;
        self.record(format!("search {keyword}"));
        self.searches.lock().unwrap().push(air_date.clone());
        if keyword != "葬送のフリーレン" && keyword != "葬送的芙莉莲" {
            return Ok(Vec::new());
        }
        let premiere = premiere().format("%Y-%m-%d").to_string();
        let inside = air_date.iter().flatten().all(|bound| {
            match (bound.strip_prefix(">="), bound.strip_prefix("<=")) {
                (Some(start), _) => premiere.as_str() >= start,
                (_, Some(end)) => premiere.as_str() <= end,
                _ => false,
            }
        });
        if !inside {
            return Ok(Vec::new());
        }
        Ok(vec![BangumiSubject {
            id: SUBJECT_ID,
            name: "葬送のフリーレン".to_string(),
            name_cn: "葬送的芙莉莲".to_string(),
            date: Some("2023-09-29".to_string()),
        }])
    }

    async fn episodes(&self, subject_id: u64) -> ClientResult<Vec<EpisodeCandidate>> {
        self.record(format!("episodes {subject_id}"));
        Ok((1..=SEASON_EPISODES)
            .map(|n| EpisodeCandidate {
                id: Self::episode_id(n),
                name: String::new(),
                name_cn: String::new(),
                airdate: air_date(n).format("%Y-%m-%d").to_string(),
                sort: n as f64,
                ep: Some(n as f64),
            })
            .collect())
    }

    async fn me(&self) -> ClientResult<u64> {
        self.record("me".to_string());
        Ok(42)
    }

    async fn collection(&self, _uid: u64, subject_id: u64) -> ClientResult<Option<CollectionStatus>> {
        tokio::task::yield_now().await;
        Ok(self.collections.lock().unwrap().get(&subject_id).copied())
    }

    async fn set_collection(&self, subject_id: u64, status: CollectionStatus) -> ClientResult<()> {
        self.record(format!("set_collection {subject_id} {status:?}"));
        self.collections.lock().unwrap().insert(subject_id, status);
        Ok(())
    }

    async fn episode_collection(&self, episode_id: u64) -> ClientResult<Option<u8>> {
        tokio::task::yield_now().await;
        Ok(self
            .watched
            .lock()
            .unwrap()
            .contains(&episode_id)
            .then_some(2))
    }

    async fn mark_episode_watched(&self, episode_id: u64) -> ClientResult<()> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(ClientError::http("bangumi", 503, "service unavailable"));
        }
        self.record(format!("mark {episode_id}"));
        self.watched.lock().unwrap().insert(episode_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TMDB
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTmdb;

#[async_trait]
impl TmdbApi for FakeTmdb {
    async fn search_tv(&self, _query: &str, _language: &str) -> ClientResult<Vec<TmdbTvSummary>> {
        Ok(vec![TmdbTvSummary {
            id: TMDB_ID,
            name: "葬送的芙莉莲".to_string(),
            original_name: "葬送のフリーレン".to_string(),
            first_air_date: Some(premiere()),
        }])
    }

    async fn tv_details(&self, tv_id: u64, _language: &str) -> ClientResult<TmdbTvDetails> {
        if tv_id != TMDB_ID {
            return Err(ClientError::http("tmdb", 404, "not found"));
        }
        Ok(TmdbTvDetails {
            id: TMDB_ID,
            name: "葬送的芙莉莲".to_string(),
            original_name: "葬送のフリーレン".to_string(),
            first_air_date: Some(premiere()),
            seasons: vec![TmdbSeasonSummary {
                season_number: 1,
                episode_count: SEASON_EPISODES,
                air_date: Some(premiere()),
            }],
        })
    }

    async fn season_details(&self, _tv_id: u64, season: u32, _language: &str) -> ClientResult<TmdbSeason> {
        Ok(TmdbSeason {
            season_number: season,
            air_date: Some(premiere()),
            episodes: (1..=SEASON_EPISODES)
                .map(|n| TmdbEpisode {
                    episode_number: n,
                    name: None,
                    air_date: Some(air_date(n)),
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Douban
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDouban {
    pub interests: Mutex<Vec<(String, DoubanInterest)>>,
}

impl FakeDouban {
    pub fn interests(&self) -> Vec<(String, DoubanInterest)> {
        self.interests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DoubanApi for FakeDouban {
    async fn search_subject(&self, title: &str) -> ClientResult<Option<DoubanSubject>> {
        let id = match title {
            "葬送的芙莉莲" => "36223214",
            "奥本海默" => "35593344",
            _ => return Ok(None),
        };
        Ok(Some(DoubanSubject {
            id: id.to_string(),
            title: title.to_string(),
        }))
    }

    async fn set_interest(
        &self,
        subject_id: &str,
        interest: DoubanInterest,
        _private: bool,
    ) -> ClientResult<()> {
        self.interests
            .lock()
            .unwrap()
            .push((subject_id.to_string(), interest));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ANi-Open
// ---------------------------------------------------------------------------

pub struct FakeAniOpen {
    pub files: Vec<String>,
}

impl FakeAniOpen {
    pub fn with_episodes(count: usize) -> Self {
        Self {
            files: (1..=count)
                .rev()
                .map(|n| format!("[ANi] 葬送的芙莉莲 - {n:02} [1080P][Baha][WEB-DL][AAC AVC][CHT].mp4"))
                .collect(),
        }
    }
}

#[async_trait]
impl AniOpenApi for FakeAniOpen {
    async fn list_files(&self, _season: &str) -> ClientResult<Vec<String>> {
        Ok(self.files.clone())
    }

    fn resource_url(&self, season: &str, file_name: &str) -> String {
        format!("https://resources.ani.rip/{season}/{file_name}?d=true")
    }
}

// ---------------------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------------------

pub struct FakeTorrentClient {
    pub torrents: Vec<TorrentTrackers>,
    pub applied: Mutex<Vec<(String, Vec<TrackerEdit>)>>,
}

impl FakeTorrentClient {
    pub fn new(torrents: Vec<TorrentTrackers>) -> Self {
        Self {
            torrents,
            applied: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TorrentClient for FakeTorrentClient {
    fn kind(&self) -> &'static str {
        "fake"
    }

    async fn torrents(&self) -> ClientResult<Vec<TorrentTrackers>> {
        Ok(self.torrents.clone())
    }

    async fn apply_tracker_edits(
        &self,
        torrent: &TorrentTrackers,
        edits: &[TrackerEdit],
    ) -> ClientResult<()> {
        self.applied
            .lock()
            .unwrap()
            .push((torrent.hash.clone(), edits.to_vec()));
        Ok(())
    }
}
