//! Outbound REST clients
//!
//! Every remote service sits behind an `async_trait` so plugins can be driven
//! by in-memory fakes in tests. The reqwest implementations share one
//! configured `reqwest::Client`.

use crate::config::HttpConfig;
use crate::errors::{ClientError, ClientResult};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub mod aniopen;
pub mod bangumi;
pub mod douban;
pub mod downloader;
pub mod tmdb;

pub use aniopen::{AniOpenApi, AniOpenClient};
pub use bangumi::{BangumiApi, BangumiClient, BangumiSubject};
pub use douban::{DoubanApi, DoubanClient, DoubanInterest, DoubanSubject};
pub use downloader::{
    QbittorrentClient, TorrentClient, TorrentTrackers, TrackerEdit, TransmissionClient,
};
pub use tmdb::{TmdbApi, TmdbClient, TmdbEpisode, TmdbSeason, TmdbTvDetails, TmdbTvSummary};

/// Build the shared HTTP client from the `[http]` section
pub fn build_http_client(config: &HttpConfig) -> ClientResult<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .user_agent(config.user_agent.clone());

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| ClientError::request("proxy", e))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| ClientError::request("http", e))
}

/// Map non-success responses to `ClientError`, keeping a snippet of the body
pub(crate) async fn check_status(service: &'static str, response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::auth_expired(
            service,
            format!("{} {}", status.as_u16(), snippet),
        ));
    }
    Err(ClientError::http(service, status.as_u16(), snippet))
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> ClientResult<T> {
    let response = check_status(service, response).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::request(service, e))?;
    serde_json::from_slice(&body).map_err(|e| ClientError::decode(service, e.to_string()))
}
