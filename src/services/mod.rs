//! Stateful services injected into plugins

pub mod pending_queue;
pub mod subject_resolver;
pub mod sync_state;

pub use pending_queue::{PendingLists, PendingQueue};
pub use subject_resolver::{EpisodeQuery, ResolvedEpisode, SubjectResolver};
pub use sync_state::SyncStateStore;
