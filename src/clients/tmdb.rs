//! TMDB v3 client
//!
//! The response language is an explicit argument of every call.

use super::decode_json;
use crate::errors::{ClientError, ClientResult};
use crate::utils::join_url;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};

const SERVICE: &str = "tmdb";

/// TMDB sends `""` for unknown dates
fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbTvSummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub first_air_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbSeasonSummary {
    pub season_number: u32,
    #[serde(default)]
    pub episode_count: u32,
    #[serde(default, deserialize_with = "lenient_date")]
    pub air_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbTvDetails {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub first_air_date: Option<NaiveDate>,
    #[serde(default)]
    pub seasons: Vec<TmdbSeasonSummary>,
}

impl TmdbTvDetails {
    pub fn season(&self, number: u32) -> Option<&TmdbSeasonSummary> {
        self.seasons.iter().find(|s| s.season_number == number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbEpisode {
    pub episode_number: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub air_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbSeason {
    pub season_number: u32,
    #[serde(default, deserialize_with = "lenient_date")]
    pub air_date: Option<NaiveDate>,
    #[serde(default)]
    pub episodes: Vec<TmdbEpisode>,
}

impl TmdbSeason {
    pub fn episode(&self, number: u32) -> Option<&TmdbEpisode> {
        self.episodes.iter().find(|e| e.episode_number == number)
    }
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn search_tv(&self, query: &str, language: &str) -> ClientResult<Vec<TmdbTvSummary>>;

    async fn tv_details(&self, tv_id: u64, language: &str) -> ClientResult<TmdbTvDetails>;

    async fn season_details(
        &self,
        tv_id: u64,
        season: u32,
        language: &str,
    ) -> ClientResult<TmdbSeason>;
}

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<TmdbTvSummary>,
}

impl TmdbClient {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<T> {
        let response = self
            .client
            .get(join_url(&self.base_url, path))
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| ClientError::request(SERVICE, e))?;
        decode_json(SERVICE, response).await
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn search_tv(&self, query: &str, language: &str) -> ClientResult<Vec<TmdbTvSummary>> {
        let page: SearchPage = self
            .get("/search/tv", &[("query", query), ("language", language)])
            .await?;
        Ok(page.results)
    }

    async fn tv_details(&self, tv_id: u64, language: &str) -> ClientResult<TmdbTvDetails> {
        self.get(&format!("/tv/{tv_id}"), &[("language", language)])
            .await
    }

    async fn season_details(
        &self,
        tv_id: u64,
        season: u32,
        language: &str,
    ) -> ClientResult<TmdbSeason> {
        self.get(
            &format!("/tv/{tv_id}/season/{season}"),
            &[("language", language)],
        )
        .await
    }
}
