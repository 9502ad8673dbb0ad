//! Torrent downloader clients (qBittorrent Web API v2, Transmission RPC)
//!
//! Only tracker listing and editing is needed.

use super::{check_status, decode_json};
use crate::errors::{ClientError, ClientResult};
use crate::utils::sanitize_base_url;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentTrackers {
    pub hash: String,
    pub name: String,
    pub trackers: Vec<String>,
}

/// One tracker URL rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEdit {
    pub original: String,
    pub replacement: String,
}

#[async_trait]
pub trait TorrentClient: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn torrents(&self) -> ClientResult<Vec<TorrentTrackers>>;

    /// Apply `edits` to one torrent; trackers not named in `edits` stay
    async fn apply_tracker_edits(
        &self,
        torrent: &TorrentTrackers,
        edits: &[TrackerEdit],
    ) -> ClientResult<()>;
}

// ---------------------------------------------------------------------------
// qBittorrent
// ---------------------------------------------------------------------------

const QBITTORRENT: &str = "qbittorrent";

pub struct QbittorrentClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    sid: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct QbTorrent {
    hash: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct QbTracker {
    url: String,
}

/// DHT, PeX and LSD show up as pseudo trackers like `** [DHT] **`
fn is_real_tracker(url: &str) -> bool {
    !url.starts_with("** [")
}

fn sid_from_set_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .find_map(|part| part.strip_prefix("SID=").map(str::to_string))
}

impl QbittorrentClient {
    pub fn new(client: Client, host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            client,
            base_url: format!("{}:{}", sanitize_base_url(host), port),
            username: username.to_string(),
            password: password.to_string(),
            sid: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    async fn login(&self) -> ClientResult<String> {
        let mut sid = self.sid.lock().await;
        if let Some(existing) = sid.as_ref() {
            return Ok(existing.clone());
        }

        let response = self
            .client
            .post(self.url("auth/login"))
            .header(header::REFERER, self.base_url.as_str())
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ClientError::request(QBITTORRENT, e))?;
        let response = check_status(QBITTORRENT, response).await?;

        let cookie = sid_from_set_cookie(&response);
        let body = response.text().await.unwrap_or_default();
        match cookie {
            Some(cookie) => {
                debug!("Logged in to qBittorrent at {}", self.base_url);
                *sid = Some(cookie.clone());
                Ok(cookie)
            }
            None => Err(ClientError::auth_expired(
                QBITTORRENT,
                format!("login rejected: {}", body.trim()),
            )),
        }
    }

    async fn authorized(&self, builder: RequestBuilder) -> ClientResult<RequestBuilder> {
        let sid = self.login().await?;
        Ok(builder.header(header::COOKIE, format!("SID={sid}")))
    }
}

#[async_trait]
impl TorrentClient for QbittorrentClient {
    fn kind(&self) -> &'static str {
        QBITTORRENT
    }

    async fn torrents(&self) -> ClientResult<Vec<TorrentTrackers>> {
        let response = self
            .authorized(self.client.get(self.url("torrents/info")))
            .await?
            .send()
            .await
            .map_err(|e| ClientError::request(QBITTORRENT, e))?;
        let torrents: Vec<QbTorrent> = decode_json(QBITTORRENT, response).await?;

        let mut result = Vec::with_capacity(torrents.len());
        for torrent in torrents {
            let response = self
                .authorized(
                    self.client
                        .get(self.url("torrents/trackers"))
                        .query(&[("hash", torrent.hash.as_str())]),
                )
                .await?
                .send()
                .await
                .map_err(|e| ClientError::request(QBITTORRENT, e))?;
            let trackers: Vec<QbTracker> = decode_json(QBITTORRENT, response).await?;
            result.push(TorrentTrackers {
                hash: torrent.hash,
                name: torrent.name,
                trackers: trackers
                    .into_iter()
                    .map(|t| t.url)
                    .filter(|u| is_real_tracker(u))
                    .collect(),
            });
        }
        Ok(result)
    }

    async fn apply_tracker_edits(
        &self,
        torrent: &TorrentTrackers,
        edits: &[TrackerEdit],
    ) -> ClientResult<()> {
        for edit in edits {
            let response = self
                .authorized(self.client.post(self.url("torrents/editTracker")).form(&[
                    ("hash", torrent.hash.as_str()),
                    ("origUrl", edit.original.as_str()),
                    ("newUrl", edit.replacement.as_str()),
                ]))
                .await?
                .send()
                .await
                .map_err(|e| ClientError::request(QBITTORRENT, e))?;
            check_status(QBITTORRENT, response).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transmission
// ---------------------------------------------------------------------------

const TRANSMISSION: &str = "transmission";
const SESSION_HEADER: &str = "X-Transmission-Session-Id";

pub struct TransmissionClient {
    client: Client,
    rpc_url: String,
    username: String,
    password: String,
    session_id: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTorrent {
    hash_string: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tracker_list: String,
}

/// `trackerList` holds one announce URL per line, tiers separated by blank lines
pub fn parse_tracker_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

impl TransmissionClient {
    pub fn new(client: Client, host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            client,
            rpc_url: format!("{}:{}/transmission/rpc", sanitize_base_url(host), port),
            username: username.to_string(),
            password: password.to_string(),
            session_id: Mutex::new(None),
        }
    }

    /// Send one RPC call, renewing the CSRF session id once on 409
    async fn call(&self, method: &str, arguments: Value) -> ClientResult<Value> {
        let body = json!({ "method": method, "arguments": arguments });
        let mut session_id = self.session_id.lock().await;

        for _ in 0..2 {
            let mut request = self.client.post(&self.rpc_url).json(&body);
            if !self.username.is_empty() {
                request = request.basic_auth(&self.username, Some(&self.password));
            }
            if let Some(id) = session_id.as_ref() {
                request = request.header(SESSION_HEADER, id.as_str());
            }

            let response = request
                .send()
                .await
                .map_err(|e| ClientError::request(TRANSMISSION, e))?;

            if response.status() == StatusCode::CONFLICT {
                let renewed = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if renewed.is_none() {
                    break;
                }
                *session_id = renewed;
                continue;
            }

            let rpc: RpcResponse = decode_json(TRANSMISSION, response).await?;
            if rpc.result != "success" {
                return Err(ClientError::decode(
                    TRANSMISSION,
                    format!("{method} failed: {}", rpc.result),
                ));
            }
            return Ok(rpc.arguments);
        }

        Err(ClientError::http(
            TRANSMISSION,
            StatusCode::CONFLICT.as_u16(),
            "session id negotiation failed",
        ))
    }
}

#[async_trait]
impl TorrentClient for TransmissionClient {
    fn kind(&self) -> &'static str {
        TRANSMISSION
    }

    async fn torrents(&self) -> ClientResult<Vec<TorrentTrackers>> {
        let arguments = self
            .call(
                "torrent-get",
                json!({ "fields": ["hashString", "name", "trackerList"] }),
            )
            .await?;
        let torrents: Vec<RpcTorrent> =
            serde_json::from_value(arguments.get("torrents").cloned().unwrap_or_default())
                .map_err(|e| ClientError::decode(TRANSMISSION, e.to_string()))?;

        Ok(torrents
            .into_iter()
            .map(|t| TorrentTrackers {
                trackers: parse_tracker_list(&t.tracker_list),
                hash: t.hash_string,
                name: t.name,
            })
            .collect())
    }

    async fn apply_tracker_edits(
        &self,
        torrent: &TorrentTrackers,
        edits: &[TrackerEdit],
    ) -> ClientResult<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let updated: Vec<String> = torrent
            .trackers
            .iter()
            .map(|url| {
                edits
                    .iter()
                    .find(|e| &e.original == url)
                    .map(|e| e.replacement.clone())
                    .unwrap_or_else(|| url.clone())
            })
            .collect();

        self.call(
            "torrent-set",
            json!({ "ids": [torrent.hash], "trackerList": updated.join("\n") }),
        )
        .await?;
        info!("Updated {} trackers of '{}'", edits.len(), torrent.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tracker_list() {
        assert_eq!(
            parse_tracker_list("https://a.example/announce\n\nhttps://b.example/announce\n"),
            vec![
                "https://a.example/announce".to_string(),
                "https://b.example/announce".to_string()
            ]
        );
        assert!(parse_tracker_list("").is_empty());
    }

    #[test]
    fn test_pseudo_trackers_are_skipped() {
        assert!(!is_real_tracker("** [DHT] **"));
        assert!(is_real_tracker("https://tracker.example/announce"));
    }

    #[test]
    fn test_rpc_torrent_decodes() {
        let torrent: RpcTorrent = serde_json::from_str(
            r#"{"hashString":"abc","name":"Show","trackerList":"https://old.example/a\n"}"#,
        )
        .unwrap();
        assert_eq!(torrent.hash_string, "abc");
        assert_eq!(parse_tracker_list(&torrent.tracker_list).len(), 1);
    }

    #[test]
    fn test_base_urls() {
        let qb = QbittorrentClient::new(Client::new(), "192.168.2.100/", 8989, "u", "p");
        assert_eq!(qb.url("auth/login"), "http://192.168.2.100:8989/api/v2/auth/login");

        let tr = TransmissionClient::new(Client::new(), "https://nas.lan", 9091, "", "");
        assert_eq!(tr.rpc_url, "https://nas.lan:9091/transmission/rpc");
    }
}
