//! Bangumi (bgm.tv) v0 API client

use super::{check_status, decode_json};
use crate::errors::{ClientError, ClientResult};
use crate::models::{CollectionStatus, EpisodeCandidate};
use crate::utils::join_url;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const SERVICE: &str = "bangumi";
/// Subject type "anime"
const SUBJECT_TYPE_ANIME: u8 = 2;
/// Episode collection type "watched"
pub const EPISODE_WATCHED: u8 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BangumiSubject {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_cn: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl BangumiSubject {
    /// Chinese name when known, original name otherwise
    pub fn display_name(&self) -> &str {
        if self.name_cn.is_empty() {
            &self.name
        } else {
            &self.name_cn
        }
    }
}

#[async_trait]
pub trait BangumiApi: Send + Sync {
    /// Anime subjects for `keyword` sorted by rank, optionally limited to an
    /// air-date range in the `[">=YYYY-MM-DD", "<=YYYY-MM-DD"]` form
    async fn search_subjects(
        &self,
        keyword: &str,
        air_date: Option<Vec<String>>,
    ) -> ClientResult<Vec<BangumiSubject>>;

    async fn episodes(&self, subject_id: u64) -> ClientResult<Vec<EpisodeCandidate>>;

    /// Numeric id of the token owner
    async fn me(&self) -> ClientResult<u64>;

    /// Collection status of `subject_id` for user `uid`, `None` when not collected
    async fn collection(&self, uid: u64, subject_id: u64) -> ClientResult<Option<CollectionStatus>>;

    async fn set_collection(&self, subject_id: u64, status: CollectionStatus) -> ClientResult<()>;

    /// Collection type code of one episode for the token owner
    async fn episode_collection(&self, episode_id: u64) -> ClientResult<Option<u8>>;

    async fn mark_episode_watched(&self, episode_id: u64) -> ClientResult<()>;
}

#[derive(Clone)]
pub struct BangumiClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct Paged<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct Me {
    id: u64,
}

#[derive(Deserialize)]
struct TypedCollection {
    #[serde(rename = "type")]
    kind: u8,
}

impl BangumiClient {
    pub fn new(client: Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn send(&self, builder: RequestBuilder) -> ClientResult<reqwest::Response> {
        self.authorized(builder)
            .send()
            .await
            .map_err(|e| ClientError::request(SERVICE, e))
    }
}

#[async_trait]
impl BangumiApi for BangumiClient {
    async fn search_subjects(
        &self,
        keyword: &str,
        air_date: Option<Vec<String>>,
    ) -> ClientResult<Vec<BangumiSubject>> {
        let mut filter = json!({ "type": [SUBJECT_TYPE_ANIME] });
        if let Some(range) = air_date {
            filter["air_date"] = json!(range);
        }
        let body = json!({ "keyword": keyword, "sort": "rank", "filter": filter });
        debug!("Searching bangumi subjects: {}", body);

        let response = self
            .send(self.client.post(self.url("/v0/search/subjects")).json(&body))
            .await?;
        let page: Paged<BangumiSubject> = decode_json(SERVICE, response).await?;
        Ok(page.data)
    }

    async fn episodes(&self, subject_id: u64) -> ClientResult<Vec<EpisodeCandidate>> {
        let response = self
            .send(
                self.client
                    .get(self.url("/v0/episodes"))
                    .query(&[("subject_id", subject_id)]),
            )
            .await?;
        let page: Paged<EpisodeCandidate> = decode_json(SERVICE, response).await?;
        Ok(page.data)
    }

    async fn me(&self) -> ClientResult<u64> {
        let response = self.send(self.client.get(self.url("/v0/me"))).await?;
        let me: Me = decode_json(SERVICE, response).await?;
        Ok(me.id)
    }

    async fn collection(&self, uid: u64, subject_id: u64) -> ClientResult<Option<CollectionStatus>> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/v0/users/{uid}/collections/{subject_id}"))),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let collection: TypedCollection = decode_json(SERVICE, response).await?;
        Ok(CollectionStatus::from_code(collection.kind))
    }

    async fn set_collection(&self, subject_id: u64, status: CollectionStatus) -> ClientResult<()> {
        let body = json!({
            "type": status.code(),
            "comment": "",
            "private": false,
            "tags": [],
        });
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/v0/users/-/collections/{subject_id}")))
                    .json(&body),
            )
            .await?;
        check_status(SERVICE, response).await?;
        Ok(())
    }

    async fn episode_collection(&self, episode_id: u64) -> ClientResult<Option<u8>> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/v0/users/-/collections/-/episodes/{episode_id}"))),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let collection: TypedCollection = decode_json(SERVICE, response).await?;
        Ok(Some(collection.kind))
    }

    async fn mark_episode_watched(&self, episode_id: u64) -> ClientResult<()> {
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("/v0/users/-/collections/-/episodes/{episode_id}")))
                    .json(&json!({ "type": EPISODE_WATCHED })),
            )
            .await?;
        check_status(SERVICE, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_page_decodes() {
        let page: Paged<EpisodeCandidate> = serde_json::from_str(
            r#"{"data":[{"id":1277144,"type":0,"name":"冒険の終わり","name_cn":"冒险的结束","sort":1,"ep":1,"airdate":"2023-09-29","comment":0}],"total":28,"limit":100,"offset":0}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, 1277144);
        assert_eq!(page.data[0].ep, Some(1.0));
        assert_eq!(page.data[0].air_date().map(|d| d.to_string()), Some("2023-09-29".to_string()));
    }

    #[test]
    fn test_subject_display_name() {
        let subject = BangumiSubject {
            id: 400602,
            name: "葬送のフリーレン".to_string(),
            name_cn: String::new(),
            date: None,
        };
        assert_eq!(subject.display_name(), "葬送のフリーレン");
    }
}
