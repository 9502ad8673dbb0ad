use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A transferred file waiting for upload or for strm replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub src: String,
    pub dest: String,
    pub transferred_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new<S: Into<String>, D: Into<String>>(src: S, dest: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            src: src.into(),
            dest: dest.into(),
            transferred_at: Utc::now(),
        }
    }
}
