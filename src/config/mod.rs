use anyhow::{Context, Result};
use crate::utils::split_list;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub mod defaults;

use defaults::*;

/// Lists may be written as an array or as one comma separated string
fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(items) => items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Raw::Joined(raw) => split_list(&raw),
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub scheduler: SchedulerConfig,
    pub tmdb: TmdbConfig,
    pub bangumi_sync: BangumiSyncConfig,
    pub douban_sync: DoubanSyncConfig,
    pub cloud_strm: CloudStrmConfig,
    pub ani_strm: AniStrmConfig,
    pub log_cleaner: LogCleanerConfig,
    pub tracker_editor: TrackerEditorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Token expected in the `token` query parameter of ingress endpoints
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// IANA timezone cron expressions are evaluated in
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BangumiSyncConfig {
    pub enabled: bool,
    /// Media server user names whose playback is synced
    #[serde(deserialize_with = "string_or_list")]
    pub users: Vec<String>,
    pub token: Option<String>,
    pub base_url: String,
    #[serde(deserialize_with = "string_or_list")]
    pub anime_keywords: Vec<String>,
    /// Percentage at which a stopped playback counts as watched
    pub complete_threshold: f64,
    /// Mark the episode as soon as playback starts instead of on completion
    pub mark_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubanSyncConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "string_or_list")]
    pub users: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub exclude_keywords: Vec<String>,
    pub cookie: Option<String>,
    pub complete_threshold: f64,
    pub private: bool,
    /// Do not report the first episode of a season
    pub skip_first_episode: bool,
    pub search_url: String,
    pub movie_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudStrmConfig {
    pub enabled: bool,
    pub local_media_prefix: String,
    pub cloud_mount_prefix: String,
    /// Delay before uploading episodes of a series that is still airing
    pub upload_delay_minutes: u64,
    /// Delay before uploading anything else
    pub batch_delay_secs: u64,
    /// Days a local copy is kept after upload before it becomes a strm
    pub save_days: u64,
    pub strm_interval_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AniStrmConfig {
    pub enabled: bool,
    pub cron: String,
    pub storage_dir: PathBuf,
    /// Write strm files for every file of the season instead of the newest ones
    pub full_add: bool,
    pub run_on_start: bool,
    pub list_url: String,
    pub resource_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCleanerConfig {
    pub enabled: bool,
    pub cron: String,
    pub log_dir: PathBuf,
    /// Plugin ids whose logs are trimmed; empty means every log in `log_dir`
    #[serde(deserialize_with = "string_or_list")]
    pub plugin_ids: Vec<String>,
    pub rows: usize,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloaderKind {
    Qbittorrent,
    Transmission,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerEditorConfig {
    pub enabled: bool,
    pub downloader: DownloaderKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub target_domain: String,
    pub replace_domain: String,
    pub run_on_start: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_token: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            proxy: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_TMDB_BASE_URL.to_string(),
            language: DEFAULT_TMDB_LANGUAGE.to_string(),
        }
    }
}

impl Default for BangumiSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            users: Vec::new(),
            token: None,
            base_url: DEFAULT_BANGUMI_BASE_URL.to_string(),
            anime_keywords: DEFAULT_ANIME_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            complete_threshold: DEFAULT_COMPLETE_THRESHOLD,
            mark_on_start: false,
        }
    }
}

impl Default for DoubanSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            users: Vec::new(),
            exclude_keywords: Vec::new(),
            cookie: None,
            complete_threshold: DEFAULT_COMPLETE_THRESHOLD,
            private: true,
            skip_first_episode: true,
            search_url: DEFAULT_DOUBAN_SEARCH_URL.to_string(),
            movie_url: DEFAULT_DOUBAN_MOVIE_URL.to_string(),
        }
    }
}

impl Default for CloudStrmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            local_media_prefix: DEFAULT_LOCAL_MEDIA_PREFIX.to_string(),
            cloud_mount_prefix: DEFAULT_CLOUD_MOUNT_PREFIX.to_string(),
            upload_delay_minutes: DEFAULT_UPLOAD_DELAY_MINUTES,
            batch_delay_secs: DEFAULT_BATCH_DELAY_SECS,
            save_days: DEFAULT_SAVE_DAYS,
            strm_interval_minutes: DEFAULT_STRM_INTERVAL_MINUTES,
        }
    }
}

impl Default for AniStrmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: DEFAULT_ANI_CRON.to_string(),
            storage_dir: PathBuf::from(DEFAULT_ANI_STORAGE_DIR),
            full_add: false,
            run_on_start: false,
            list_url: DEFAULT_ANI_LIST_URL.to_string(),
            resource_url: DEFAULT_ANI_RESOURCE_URL.to_string(),
        }
    }
}

impl Default for LogCleanerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: DEFAULT_LOG_CLEAN_CRON.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            plugin_ids: Vec::new(),
            rows: DEFAULT_LOG_ROWS,
            run_on_start: false,
        }
    }
}

impl Default for TrackerEditorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            downloader: DownloaderKind::Qbittorrent,
            host: DEFAULT_DOWNLOADER_HOST.to_string(),
            port: DEFAULT_DOWNLOADER_PORT,
            username: String::new(),
            password: String::new(),
            target_domain: String::new(),
            replace_domain: String::new(),
            run_on_start: false,
        }
    }
}

impl Config {
    /// Load configuration from `path`, layered with `MEDIA_HOOKS__SECTION__KEY`
    /// environment variables. A missing file is created with the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)
                .with_context(|| format!("writing default config to {}", path.display()))?;
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.to_path_buf()).required(false))
            .add_source(
                ::config::Environment::with_prefix("MEDIA_HOOKS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("reading config from {}", path.display()))?;

        Ok(settings.try_deserialize()?)
    }

    /// Report configuration that leaves an enabled feature unusable.
    ///
    /// Problems are logged rather than returned: the affected plugin simply
    /// stays inert, the rest of the service still starts.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.bangumi_sync.enabled && self.bangumi_sync.token.is_none() {
            problems.push("bangumi_sync is enabled but no access token is set".to_string());
        }
        if self.bangumi_sync.enabled && self.bangumi_sync.users.is_empty() {
            problems.push("bangumi_sync is enabled but no users are listed".to_string());
        }
        if self.douban_sync.enabled && self.douban_sync.cookie.is_none() {
            problems.push("douban_sync is enabled but no cookie is set".to_string());
        }
        if self.douban_sync.enabled && self.douban_sync.users.is_empty() {
            problems.push("douban_sync is enabled but no users are listed".to_string());
        }
        if self.tracker_editor.enabled && self.tracker_editor.target_domain.is_empty() {
            problems.push("tracker_editor is enabled but target_domain is empty".to_string());
        }
        let cloud = &self.cloud_strm;
        if cloud.save_days > MAX_SAVE_DAYS {
            problems.push(format!(
                "cloud_strm save_days {} is above {}, uploaded files will never become strm",
                cloud.save_days, MAX_SAVE_DAYS
            ));
        }
        for (name, minutes) in [
            ("upload_delay_minutes", cloud.upload_delay_minutes),
            ("strm_interval_minutes", cloud.strm_interval_minutes),
        ] {
            if minutes > MAX_DELAY_MINUTES {
                problems.push(format!(
                    "cloud_strm {} {} is above {}",
                    name, minutes, MAX_DELAY_MINUTES
                ));
            }
        }
        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            problems.push(format!(
                "scheduler timezone '{}' is not a valid IANA name, falling back to UTC",
                self.scheduler.timezone
            ));
        }

        for problem in &problems {
            warn!("Configuration: {}", problem);
        }
        problems
    }

    /// Scheduler timezone, UTC when the configured name does not parse
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.scheduler.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}
