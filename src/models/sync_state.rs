use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bangumi collection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Wish,
    Watched,
    Watching,
    OnHold,
    Dropped,
}

impl CollectionStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Wish),
            2 => Some(Self::Watched),
            3 => Some(Self::Watching),
            4 => Some(Self::OnHold),
            5 => Some(Self::Dropped),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Wish => 1,
            Self::Watched => 2,
            Self::Watching => 3,
            Self::OnHold => 4,
            Self::Dropped => 5,
        }
    }
}

/// What has already been written for one remote subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub subject_name: String,
    pub collection: Option<CollectionStatus>,
    #[serde(default)]
    pub marked_episodes: BTreeSet<u64>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new<S: Into<String>>(subject_name: S) -> Self {
        Self {
            subject_name: subject_name.into(),
            collection: None,
            marked_episodes: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_marked(&self, episode_id: u64) -> bool {
        self.marked_episodes.contains(&episode_id)
    }
}
