//! Episode identity matching
//!
//! Maps a locally observed episode onto a record of a remote catalog that
//! numbers episodes differently (Bangumi counts across seasons, TMDB resets
//! per season, specials are interleaved). Each candidate is scored over four
//! independent signals; the highest score wins.

use crate::models::{EpisodeCandidate, LocalEpisode};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::cmp::Reverse;
use tracing::{debug, trace};

pub const NAME_WEIGHT: u32 = 4;
pub const AIR_DATE_WEIGHT: u32 = 4;
pub const ORDER_WEIGHT: u32 = 3;
pub const DECLARED_WEIGHT: u32 = 2;
pub const MAX_SCORE: u32 = NAME_WEIGHT + AIR_DATE_WEIGHT + ORDER_WEIGHT + DECLARED_WEIGHT;

/// Symmetric air-date acceptance window in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AirDateWindow {
    days: i64,
}

impl AirDateWindow {
    /// Episode disambiguation inside one subject
    pub const EPISODE: AirDateWindow = AirDateWindow { days: 1 };
    /// Whole subject / season discovery
    pub const SUBJECT: AirDateWindow = AirDateWindow { days: 15 };

    pub fn days(days: u32) -> Self {
        Self { days: days as i64 }
    }

    pub fn bounds(&self, target: NaiveDate) -> (NaiveDate, NaiveDate) {
        let span = Duration::days(self.days);
        (target - span, target + span)
    }

    pub fn contains(&self, target: NaiveDate, date: NaiveDate) -> bool {
        (date - target).num_days().abs() <= self.days
    }

    /// Range filter in the form the Bangumi search API expects
    pub fn search_filter(&self, target: NaiveDate) -> Vec<String> {
        let (start, end) = self.bounds(target);
        vec![
            format!(">={}", start.format("%Y-%m-%d")),
            format!("<={}", end.format("%Y-%m-%d")),
        ]
    }
}

/// Which signals hit for one candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchSignals {
    pub name: bool,
    pub air_date: bool,
    pub order: bool,
    pub declared: bool,
}

impl MatchSignals {
    pub fn score(&self) -> u32 {
        let mut score = 0;
        if self.name {
            score += NAME_WEIGHT;
        }
        if self.air_date {
            score += AIR_DATE_WEIGHT;
        }
        if self.order {
            score += ORDER_WEIGHT;
        }
        if self.declared {
            score += DECLARED_WEIGHT;
        }
        score
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        candidate: EpisodeCandidate,
        score: u32,
    },
    NoMatch,
}

impl MatchOutcome {
    pub fn candidate(&self) -> Option<&EpisodeCandidate> {
        match self {
            MatchOutcome::Matched { candidate, .. } => Some(candidate),
            MatchOutcome::NoMatch => None,
        }
    }

    pub fn score(&self) -> u32 {
        match self {
            MatchOutcome::Matched { score, .. } => *score,
            MatchOutcome::NoMatch => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EpisodeMatcher {
    window: AirDateWindow,
}

impl Default for EpisodeMatcher {
    fn default() -> Self {
        Self::new(AirDateWindow::EPISODE)
    }
}

fn same_name(local: &str, remote: &str) -> bool {
    let remote = remote.trim();
    !remote.is_empty() && local == remote
}

impl EpisodeMatcher {
    pub fn new(window: AirDateWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> AirDateWindow {
        self.window
    }

    pub fn signals(&self, local: &LocalEpisode, candidate: &EpisodeCandidate) -> MatchSignals {
        let number = local.number as f64;
        let local_name = local
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        MatchSignals {
            name: local_name.is_some_and(|name| {
                same_name(name, &candidate.name) || same_name(name, &candidate.name_cn)
            }),
            air_date: match (local.air_date, candidate.air_date()) {
                (Some(target), Some(date)) => self.window.contains(target, date),
                _ => false,
            },
            order: candidate.sort == number,
            declared: candidate.ep == Some(number),
        }
    }

    pub fn score(&self, local: &LocalEpisode, candidate: &EpisodeCandidate) -> u32 {
        self.signals(local, candidate).score()
    }

    /// Ids of every candidate with a nonzero score, ascending
    pub fn qualifying(&self, local: &LocalEpisode, candidates: &[EpisodeCandidate]) -> Vec<u64> {
        let mut ids: Vec<u64> = candidates
            .iter()
            .filter(|c| self.score(local, c) > 0)
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Pick the candidate that best corresponds to `local`.
    ///
    /// A candidate whose id equals the local provider id wins outright.
    /// Otherwise the highest score wins and equal scores go to the lowest id,
    /// so the result does not depend on the order of `candidates`.
    pub fn best_match(&self, local: &LocalEpisode, candidates: &[EpisodeCandidate]) -> MatchOutcome {
        if let Some(provider_id) = local.provider_id {
            if let Some(candidate) = candidates.iter().find(|c| c.id == provider_id) {
                debug!("Episode {} matched by provider id {}", local.number, provider_id);
                return MatchOutcome::Matched {
                    candidate: candidate.clone(),
                    score: MAX_SCORE,
                };
            }
        }

        let best = candidates
            .iter()
            .map(|candidate| (self.score(local, candidate), candidate))
            .inspect(|(score, candidate)| {
                trace!("Candidate {} '{}' scored {}", candidate.id, candidate.name, score)
            })
            .filter(|(score, _)| *score > 0)
            .max_by_key(|(score, candidate)| (*score, Reverse(candidate.id)));

        match best {
            Some((score, candidate)) => MatchOutcome::Matched {
                candidate: candidate.clone(),
                score,
            },
            None => {
                debug!(
                    "No candidate among {} matched episode {}",
                    candidates.len(),
                    local.number
                );
                MatchOutcome::NoMatch
            }
        }
    }
}
