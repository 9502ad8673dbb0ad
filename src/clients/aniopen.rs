//! ANi-Open file index client

use super::decode_json;
use crate::errors::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const SERVICE: &str = "aniopen";

#[async_trait]
pub trait AniOpenApi: Send + Sync {
    /// File names published for `season` (`YYYY-M`), newest first
    async fn list_files(&self, season: &str) -> ClientResult<Vec<String>>;

    /// Direct streaming URL of one published file
    fn resource_url(&self, season: &str, file_name: &str) -> String;
}

#[derive(Clone)]
pub struct AniOpenClient {
    client: Client,
    list_url: String,
    resource_url: String,
}

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    files: Vec<ListedFile>,
}

#[derive(Deserialize)]
struct ListedFile {
    name: String,
}

impl AniOpenClient {
    pub fn new(client: Client, list_url: &str, resource_url: &str) -> Self {
        Self {
            client,
            list_url: list_url.trim_end_matches('/').to_string(),
            resource_url: resource_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AniOpenApi for AniOpenClient {
    async fn list_files(&self, season: &str) -> ClientResult<Vec<String>> {
        let response = self
            .client
            .post(format!("{}/{}/", self.list_url, season))
            .send()
            .await
            .map_err(|e| ClientError::request(SERVICE, e))?;
        let listing: Listing = decode_json(SERVICE, response).await?;
        Ok(listing.files.into_iter().map(|f| f.name).collect())
    }

    fn resource_url(&self, season: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}?d=true",
            self.resource_url,
            season,
            urlencoding::encode(file_name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_url_encodes_file_name() {
        let client = AniOpenClient::new(
            Client::new(),
            "https://aniopen.an-i.workers.dev/",
            "https://resources.ani.rip",
        );
        assert_eq!(
            client.resource_url("2024-4", "[ANi] 葬送的芙莉蓮 - 05 [1080P].mp4"),
            "https://resources.ani.rip/2024-4/%5BANi%5D%20%E8%91%AC%E9%80%81%E7%9A%84%E8%8A%99%E8%8E%89%E8%93%AE%20-%2005%20%5B1080P%5D.mp4?d=true"
        );
    }

    #[test]
    fn test_listing_decodes() {
        let listing: Listing = serde_json::from_str(
            r#"{"nextPageToken":null,"curPageIndex":0,"files":[{"mimeType":"video/mp4","name":"a.mp4","size":"1"},{"name":"b.mp4"}]}"#,
        )
        .unwrap();
        let names: Vec<_> = listing.files.into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4"]);
    }
}
