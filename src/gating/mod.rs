//! Event gating and write de-duplication
//!
//! Every webhook plugin asks the same questions before doing any network
//! work: is this user synced, is this event kind interesting, does the path
//! pass the keyword filter, and did the viewer actually finish the item.
//! Afterwards it asks whether a remote write would repeat one already made.

use crate::models::{CollectionStatus, EventKind, SyncState, WebhookEvent};
use crate::utils::KeywordFilter;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub proceed: bool,
    /// Viewer finished the item (stop past the threshold, or marked played)
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct EventGate {
    users: Vec<String>,
    events: Vec<EventKind>,
    paths: KeywordFilter,
    complete_threshold: f64,
}

impl EventGate {
    /// `users` empty lets nobody through; `events` empty accepts every kind
    pub fn new(
        users: Vec<String>,
        events: Vec<EventKind>,
        paths: KeywordFilter,
        complete_threshold: f64,
    ) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            events,
            paths,
            complete_threshold,
        }
    }

    pub fn is_completed(&self, event: &WebhookEvent) -> bool {
        match event.kind() {
            EventKind::MarkPlayed => true,
            EventKind::PlaybackStop => event
                .percentage
                .is_some_and(|p| p >= self.complete_threshold),
            _ => false,
        }
    }

    pub fn evaluate(&self, event: &WebhookEvent) -> GateDecision {
        let completed = self.is_completed(event);
        let reject = |reason: &str| {
            debug!("Gate rejected '{}' event: {}", event.event, reason);
            GateDecision {
                proceed: false,
                completed,
            }
        };

        let user = event.user_name.as_deref().unwrap_or_default();
        if !self.users.iter().any(|u| u == user) {
            return reject("user not in allow-list");
        }

        let kind = event.kind();
        if !self.events.is_empty() && !self.events.contains(&kind) {
            return reject("event kind not handled");
        }

        let path = event.item_path.as_deref().unwrap_or_default();
        if !self.paths.is_included(path) {
            return reject("path matches no include keyword");
        }
        if self.paths.is_excluded(path) {
            return reject("path matches an exclude keyword");
        }

        GateDecision {
            proceed: true,
            completed,
        }
    }
}

/// Previously recorded remote write for one subject
pub trait SyncRecord {
    /// Remote already shows the subject as being watched
    fn in_progress(&self) -> bool;
    /// Remote already shows the subject as finished
    fn completed(&self) -> bool;
}

impl SyncRecord for SyncState {
    fn in_progress(&self) -> bool {
        self.collection == Some(CollectionStatus::Watching)
    }

    fn completed(&self) -> bool {
        self.collection == Some(CollectionStatus::Watched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteDecision {
    pub write: bool,
    /// The write is a status transition on a subject already in progress
    pub forced: bool,
}

/// Decide whether a remote status write is needed.
///
/// First sight always writes. A subject already in progress is only written
/// again when this event completes it; a completed subject is never
/// rewritten.
pub fn should_write<R: SyncRecord + ?Sized>(prior: Option<&R>, completes_subject: bool) -> WriteDecision {
    match prior {
        None => WriteDecision {
            write: true,
            forced: false,
        },
        Some(record) if record.completed() => WriteDecision {
            write: false,
            forced: false,
        },
        Some(record) if record.in_progress() => WriteDecision {
            write: completes_subject,
            forced: completes_subject,
        },
        Some(_) => WriteDecision {
            write: true,
            forced: false,
        },
    }
}
