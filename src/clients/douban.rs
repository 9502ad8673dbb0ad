//! Douban client
//!
//! Douban has no public API for personal watch records: subjects are found
//! by scraping the web search page and status is written through the same
//! form endpoint the website uses, authenticated by the user's cookie.

use super::check_status;
use crate::errors::{ClientError, ClientResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

const SERVICE: &str = "douban";

static TITLE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.title a").expect("valid douban title selector"));
static SUBJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"subject/(\d+)/").expect("valid douban subject regex"));
static CK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|;\s*)ck=([^;]+)").expect("valid douban ck regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoubanInterest {
    /// Watching
    Do,
    /// Watched
    Collect,
}

impl DoubanInterest {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoubanInterest::Do => "do",
            DoubanInterest::Collect => "collect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubanSubject {
    pub id: String,
    pub title: String,
}

#[async_trait]
pub trait DoubanApi: Send + Sync {
    /// First movie/TV search hit for `title`
    async fn search_subject(&self, title: &str) -> ClientResult<Option<DoubanSubject>>;

    async fn set_interest(
        &self,
        subject_id: &str,
        interest: DoubanInterest,
        private: bool,
    ) -> ClientResult<()>;
}

#[derive(Clone)]
pub struct DoubanClient {
    client: Client,
    search_url: String,
    movie_url: String,
    cookie: String,
}

/// Extract the `ck` anti-CSRF token from a cookie header
pub fn cookie_ck(cookie: &str) -> Option<String> {
    CK.captures(cookie)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('"').to_string())
        .filter(|ck| !ck.is_empty())
}

/// Subjects in search-page order
pub fn parse_search_results(html: &str) -> Vec<DoubanSubject> {
    let document = Html::parse_document(html);
    document
        .select(&TITLE_LINK)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let href = urlencoding::decode(href)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| href.to_string());
            let id = SUBJECT_ID.captures(&href)?.get(1)?.as_str().to_string();
            let title = link
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            Some(DoubanSubject { id, title })
        })
        .collect()
}

impl DoubanClient {
    pub fn new(client: Client, search_url: &str, movie_url: &str, cookie: &str) -> Self {
        Self {
            client,
            search_url: search_url.trim_end_matches('/').to_string(),
            movie_url: movie_url.trim_end_matches('/').to_string(),
            cookie: cookie.to_string(),
        }
    }
}

#[async_trait]
impl DoubanApi for DoubanClient {
    async fn search_subject(&self, title: &str) -> ClientResult<Option<DoubanSubject>> {
        let response = self
            .client
            .get(format!("{}/search", self.search_url))
            .query(&[("cat", "1002"), ("q", title)])
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .header(header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.8,en-US;q=0.6")
            .send()
            .await
            .map_err(|e| ClientError::request(SERVICE, e))?;
        let html = check_status(SERVICE, response)
            .await?
            .text()
            .await
            .map_err(|e| ClientError::request(SERVICE, e))?;

        let results = parse_search_results(&html);
        debug!("Douban search '{}' returned {} subjects", title, results.len());
        Ok(results.into_iter().next())
    }

    async fn set_interest(
        &self,
        subject_id: &str,
        interest: DoubanInterest,
        private: bool,
    ) -> ClientResult<()> {
        let ck = cookie_ck(&self.cookie)
            .ok_or_else(|| ClientError::auth_expired(SERVICE, "cookie carries no ck token"))?;

        let mut form = vec![
            ("ck", ck),
            ("interest", interest.as_str().to_string()),
            ("rating", String::new()),
            ("foldcollect", "U".to_string()),
            ("tags", String::new()),
            ("comment", String::new()),
        ];
        if private {
            form.push(("private", "on".to_string()));
        }

        let response = self
            .client
            .post(format!("{}/j/subject/{}/interest", self.movie_url, subject_id))
            .header(header::COOKIE, &self.cookie)
            .header(header::REFERER, format!("{}/subject/{}/", self.movie_url, subject_id))
            .header(header::ORIGIN, self.movie_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::request(SERVICE, e))?;
        check_status(SERVICE, response).await?;
        Ok(())
    }
}
