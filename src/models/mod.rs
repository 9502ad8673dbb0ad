use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod episode;
pub mod sync_state;
pub mod transfer;

pub use episode::{EpisodeCandidate, LocalEpisode};
pub use sync_state::{CollectionStatus, SyncState};
pub use transfer::TransferRecord;

/// Normalized media-server webhook event.
///
/// Emitted once per notification by the ingress and handed to every enabled
/// plugin. Nothing here is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEvent {
    pub event: String,
    /// Media server flavour (emby, jellyfin, plex)
    pub channel: Option<String>,
    pub item_type: Option<String>,
    pub item_name: Option<String>,
    pub item_id: Option<String>,
    pub item_path: Option<String>,
    pub season_id: Option<u32>,
    pub episode_id: Option<u32>,
    pub tmdb_id: Option<String>,
    /// Provider ids of the played item keyed by provider name
    pub provider_ids: HashMap<String, String>,
    /// Playback progress in percent (0-100)
    pub percentage: Option<f64>,
    pub user_name: Option<String>,
    pub media_type: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub device_name: Option<String>,
    pub client: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PlaybackStart,
    PlaybackStop,
    PlaybackPause,
    PlaybackUnpause,
    MarkPlayed,
    ItemRate,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Episode,
    Movie,
    Other,
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "playback.start" | "media.play" | "PlaybackStart" => EventKind::PlaybackStart,
            "playback.stop" | "media.stop" | "PlaybackStop" => EventKind::PlaybackStop,
            "playback.pause" | "media.pause" => EventKind::PlaybackPause,
            "playback.unpause" | "media.resume" => EventKind::PlaybackUnpause,
            "item.markplayed" | "media.scrobble" => EventKind::MarkPlayed,
            "item.rate" => EventKind::ItemRate,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl WebhookEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event.as_str())
    }

    /// Id the item carries for `provider`, matched case-insensitively
    pub fn provider_id(&self, provider: &str) -> Option<&str> {
        self.provider_ids
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider))
            .map(|(_, id)| id.trim())
            .filter(|id| !id.is_empty())
    }

    /// Episode or movie, judged from `item_type` first and `media_type` second
    pub fn media_kind(&self) -> MediaKind {
        let raw = self
            .item_type
            .as_deref()
            .or(self.media_type.as_deref())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match raw.as_str() {
            "episode" | "tv" | "series" => MediaKind::Episode,
            "movie" | "mov" => MediaKind::Movie,
            _ => MediaKind::Other,
        }
    }
}

/// File transfer notification for a batch of organised media files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferEvent {
    /// Source paths, index-aligned with `file_list_new`
    pub file_list: Vec<String>,
    pub file_list_new: Vec<String>,
    pub media: TransferMedia,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferMedia {
    pub title: String,
    pub tmdb_id: Option<u64>,
    pub season: Option<u32>,
    /// Series still airing
    pub ongoing: bool,
}

/// Summary of a registered plugin as exposed over the API
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub jobs: Vec<String>,
}
