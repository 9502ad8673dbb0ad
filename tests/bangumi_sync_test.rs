mod common;

use common::{episode_event, FakeBangumi, FakeTmdb, SUBJECT_ID};
use media_hooks::clients::TmdbApi;
use media_hooks::config::BangumiSyncConfig;
use media_hooks::database::Database;
use media_hooks::models::CollectionStatus;
use media_hooks::plugins::{BangumiSyncPlugin, Plugin};
use media_hooks::services::SyncStateStore;
use media_hooks::utils::RetryConfig;
use std::sync::Arc;

fn config() -> BangumiSyncConfig {
    BangumiSyncConfig {
        enabled: true,
        users: vec!["honue".to_string()],
        token: Some("bgm-token".to_string()),
        ..Default::default()
    }
}

async fn setup() -> (BangumiSyncPlugin, Arc<FakeBangumi>, Database) {
    let db = Database::in_memory().await.unwrap();
    let bangumi = Arc::new(FakeBangumi::default());
    let tmdb: Arc<dyn TmdbApi> = Arc::new(FakeTmdb);
    let plugin = BangumiSyncPlugin::new(
        &config(),
        bangumi.clone(),
        Some(tmdb),
        "zh-CN",
        db.clone(),
        RetryConfig::none(),
    );
    (plugin, bangumi, db)
}

fn set_collection(status: &str) -> String {
    format!("set_collection {SUBJECT_ID} {status}")
}

fn mark(episode: u32) -> String {
    format!("mark {}", FakeBangumi::episode_id(episode))
}

#[tokio::test]
async fn test_watch_progress_is_synced_once() {
    let (plugin, bangumi, db) = setup().await;
    let states = SyncStateStore::new(db.clone(), "bangumi_sync");
    assert!(plugin.enabled());

    plugin
        .on_webhook(&episode_event("playback.start", 5, None))
        .await
        .unwrap();
    assert_eq!(bangumi.writes(), vec![set_collection("Watching")]);
    let state = states.get(SUBJECT_ID).await.unwrap().unwrap();
    assert_eq!(state.collection, Some(CollectionStatus::Watching));
    assert!(state.marked_episodes.is_empty());

    plugin
        .on_webhook(&episode_event("playback.stop", 5, Some(95.0)))
        .await
        .unwrap();
    assert_eq!(bangumi.writes(), vec![set_collection("Watching"), mark(5)]);

    // replaying the same completion changes nothing remotely
    plugin
        .on_webhook(&episode_event("playback.stop", 5, Some(97.0)))
        .await
        .unwrap();
    assert_eq!(bangumi.writes(), vec![set_collection("Watching"), mark(5)]);

    let state = states.get(SUBJECT_ID).await.unwrap().unwrap();
    assert_eq!(state.subject_name, "葬送的芙莉莲");
    assert!(state.is_marked(FakeBangumi::episode_id(5)));

    let me_calls = bangumi
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| *c == "me")
        .count();
    assert_eq!(me_calls, 1);
    assert_eq!(
        db.get_plugin_data::<u64>("bangumi_sync", "uid").await.unwrap(),
        Some(42)
    );
}

#[tokio::test]
async fn test_concurrent_events_write_once() {
    let (plugin, bangumi, db) = setup().await;
    let states = SyncStateStore::new(db, "bangumi_sync");

    let start = episode_event("playback.start", 5, None);
    let stop = episode_event("playback.stop", 5, Some(95.0));
    let (first, second) = tokio::join!(plugin.on_webhook(&start), plugin.on_webhook(&stop));
    first.unwrap();
    second.unwrap();

    assert_eq!(bangumi.writes(), vec![set_collection("Watching"), mark(5)]);
    let state = states.get(SUBJECT_ID).await.unwrap().unwrap();
    assert_eq!(state.collection, Some(CollectionStatus::Watching));
    assert!(state.is_marked(FakeBangumi::episode_id(5)));
}

#[tokio::test]
async fn test_subject_search_uses_premiere_window() {
    let (plugin, bangumi, _db) = setup().await;

    plugin
        .on_webhook(&episode_event("playback.start", 5, None))
        .await
        .unwrap();

    assert_eq!(
        *bangumi.searches.lock().unwrap(),
        vec![Some(vec![
            ">=2023-09-14".to_string(),
            "<=2023-10-14".to_string()
        ])]
    );
}

#[tokio::test]
async fn test_season_finale_completes_subject() {
    let (plugin, bangumi, db) = setup().await;
    let states = SyncStateStore::new(db, "bangumi_sync");

    plugin
        .on_webhook(&episode_event("playback.stop", 27, Some(92.0)))
        .await
        .unwrap();
    plugin
        .on_webhook(&episode_event("item.markplayed", 28, None))
        .await
        .unwrap();

    assert_eq!(
        bangumi.writes(),
        vec![
            set_collection("Watching"),
            mark(27),
            set_collection("Watched"),
            mark(28),
        ]
    );
    let state = states.get(SUBJECT_ID).await.unwrap().unwrap();
    assert_eq!(state.collection, Some(CollectionStatus::Watched));

    // a completed subject is never written again
    plugin
        .on_webhook(&episode_event("playback.start", 3, None))
        .await
        .unwrap();
    assert_eq!(bangumi.writes().len(), 4);
}

#[tokio::test]
async fn test_partial_failure_records_nothing() {
    let (plugin, bangumi, db) = setup().await;
    let states = SyncStateStore::new(db, "bangumi_sync");

    bangumi.set_fail_marks(true);
    let result = plugin
        .on_webhook(&episode_event("playback.stop", 5, Some(95.0)))
        .await;
    assert!(result.is_err());
    assert_eq!(bangumi.writes(), vec![set_collection("Watching")]);
    assert!(states.get(SUBJECT_ID).await.unwrap().is_none());

    // the retry sees the remote collection and only marks the episode
    bangumi.set_fail_marks(false);
    plugin
        .on_webhook(&episode_event("playback.stop", 5, Some(95.0)))
        .await
        .unwrap();
    assert_eq!(bangumi.writes(), vec![set_collection("Watching"), mark(5)]);

    let state = states.get(SUBJECT_ID).await.unwrap().unwrap();
    assert_eq!(state.collection, Some(CollectionStatus::Watching));
    assert!(state.is_marked(FakeBangumi::episode_id(5)));
}

#[tokio::test]
async fn test_gate_filters_before_any_request() {
    let (plugin, bangumi, _db) = setup().await;

    let mut stranger = episode_event("playback.stop", 5, Some(95.0));
    stranger.user_name = Some("stranger".to_string());
    plugin.on_webhook(&stranger).await.unwrap();

    let mut drama = episode_event("playback.stop", 5, Some(95.0));
    drama.item_path = Some("/media/drama/Show/Season 1/Show - S01E05.mkv".to_string());
    plugin.on_webhook(&drama).await.unwrap();

    let mut paused = episode_event("playback.pause", 5, Some(50.0));
    paused.item_type = Some("Episode".to_string());
    plugin.on_webhook(&paused).await.unwrap();

    let mut movie = episode_event("playback.stop", 5, Some(95.0));
    movie.item_type = Some("Movie".to_string());
    plugin.on_webhook(&movie).await.unwrap();

    assert!(bangumi.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_token_disables_plugin() {
    let db = Database::in_memory().await.unwrap();
    let config = BangumiSyncConfig {
        token: None,
        ..config()
    };
    let plugin = BangumiSyncPlugin::new(
        &config,
        Arc::new(FakeBangumi::default()),
        None,
        "zh-CN",
        db,
        RetryConfig::none(),
    );
    assert!(!plugin.enabled());
}
