/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./media-hooks.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;

// Outbound HTTP defaults
pub const DEFAULT_USER_AGENT: &str = "media-hooks (https://github.com/jmylchreest/media-hooks)";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

// Scheduler defaults
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

// Catalog endpoints
pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_TMDB_LANGUAGE: &str = "zh-CN";
pub const DEFAULT_BANGUMI_BASE_URL: &str = "https://api.bgm.tv";
pub const DEFAULT_DOUBAN_SEARCH_URL: &str = "https://www.douban.com";
pub const DEFAULT_DOUBAN_MOVIE_URL: &str = "https://movie.douban.com";
pub const DEFAULT_ANI_LIST_URL: &str = "https://aniopen.an-i.workers.dev";
pub const DEFAULT_ANI_RESOURCE_URL: &str = "https://resources.ani.rip";

// Path keywords that mark an anime library
pub const DEFAULT_ANIME_KEYWORDS: &[&str] = &[
    "cartoon", "动漫", "动画", "ani", "anime", "新番", "番剧", "特摄", "bangumi", "ova", "映画",
    "国漫", "日漫",
];

// Playback percentage at which a stop event counts as watched
pub const DEFAULT_COMPLETE_THRESHOLD: f64 = 90.0;

// Cloud strm defaults
pub const DEFAULT_LOCAL_MEDIA_PREFIX: &str = "/strm/";
pub const DEFAULT_CLOUD_MOUNT_PREFIX: &str = "/CloudNAS/CloudDrive/115/emby/";
pub const DEFAULT_UPLOAD_DELAY_MINUTES: u64 = 20;
pub const DEFAULT_BATCH_DELAY_SECS: u64 = 5;
pub const DEFAULT_SAVE_DAYS: u64 = 3;
pub const DEFAULT_STRM_INTERVAL_MINUTES: u64 = 20;
pub const MAX_SAVE_DAYS: u64 = 3650;
pub const MAX_DELAY_MINUTES: u64 = 7 * 24 * 60;

// ANi strm defaults
pub const DEFAULT_ANI_CRON: &str = "*/20 22,23,0,1,2 * * *";
pub const DEFAULT_ANI_STORAGE_DIR: &str = "/downloads/cartoonstrm";
pub const DEFAULT_ANI_RECENT_LIMIT: usize = 15;

// Log cleaner defaults
pub const DEFAULT_LOG_CLEAN_CRON: &str = "30 3 * * *";
pub const DEFAULT_LOG_DIR: &str = "./logs/plugins";
pub const DEFAULT_LOG_ROWS: usize = 300;

// Tracker editor defaults
pub const DEFAULT_DOWNLOADER_HOST: &str = "http://127.0.0.1";
pub const DEFAULT_DOWNLOADER_PORT: u16 = 8080;
