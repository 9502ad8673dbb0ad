use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Episode record as returned by a remote catalog (Bangumi `/v0/episodes`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeCandidate {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_cn: String,
    /// `YYYY-MM-DD`, empty when the catalog does not know it
    #[serde(default)]
    pub airdate: String,
    /// Position of the episode across the whole subject
    #[serde(default)]
    pub sort: f64,
    /// Episode number as declared by the catalog, if any
    #[serde(default)]
    pub ep: Option<f64>,
}

impl EpisodeCandidate {
    pub fn air_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.airdate.trim(), "%Y-%m-%d").ok()
    }
}

/// Locally observed episode the catalog record is matched against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalEpisode {
    /// 1-based episode number within the season
    pub number: u32,
    pub provider_id: Option<u64>,
    pub air_date: Option<NaiveDate>,
    pub name: Option<String>,
}

impl LocalEpisode {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }

    pub fn with_air_date(mut self, air_date: NaiveDate) -> Self {
        self.air_date = Some(air_date);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_provider_id(mut self, id: u64) -> Self {
        self.provider_id = Some(id);
        self
    }
}
