//! Utility functions for media-hooks
//!
//! This module provides various helpers including:
//! - URL normalization for configured hosts
//! - TTL/LRU caching (`utils::ttl_cache`)
//! - Retry with linear backoff for outbound calls (`utils::retry`)
//! - Path keyword filters (`utils::keywords`)
//! - Title and season formatting (`utils::title`)
//! - `.strm` path derivation and writing (`utils::strm`)
//! - Cron expression helpers (`utils::cron_helper`)

pub mod cron_helper;
pub mod keywords;
pub mod retry;
pub mod strm;
pub mod title;
pub mod ttl_cache;

pub use keywords::{split_list, KeywordFilter};
pub use retry::{with_retry, RetryConfig};
pub use ttl_cache::TtlCache;

/// Normalize a URL by ensuring it has a proper scheme (http:// or https://)
/// and no trailing slashes.
pub fn sanitize_base_url(base_url: &str) -> String {
    let url = base_url.trim().trim_end_matches('/');

    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// Join a base URL and a host-relative path with exactly one slash
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_base_url() {
        assert_eq!(sanitize_base_url("127.0.0.1:8080/"), "http://127.0.0.1:8080");
        assert_eq!(sanitize_base_url(" https://qb.lan// "), "https://qb.lan");
        assert_eq!(sanitize_base_url("http://tr.lan"), "http://tr.lan");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://api.bgm.tv/", "/v0/me"),
            "https://api.bgm.tv/v0/me"
        );
        assert_eq!(
            join_url("https://api.themoviedb.org/3", "search/tv"),
            "https://api.themoviedb.org/3/search/tv"
        );
    }
}
