mod common;

use common::{FakeAniOpen, FakeTorrentClient};
use media_hooks::clients::{TorrentTrackers, TrackerEdit};
use media_hooks::config::{AniStrmConfig, LogCleanerConfig, TrackerEditorConfig};
use media_hooks::database::Database;
use media_hooks::plugins::tracker_editor::EditSummary;
use media_hooks::plugins::{
    AniStrmPlugin, LogCleanerPlugin, Plugin, PluginRegistry, TrackerEditorPlugin,
};
use media_hooks::scheduler::SchedulerService;
use std::sync::Arc;

fn torrents() -> Vec<TorrentTrackers> {
    vec![
        TorrentTrackers {
            hash: "aaa".to_string(),
            name: "Frieren S01 1080p".to_string(),
            trackers: vec![
                "https://tracker.old.org/announce.php?passkey=1234".to_string(),
                "udp://open.tracker.example:1337/announce".to_string(),
            ],
        },
        TorrentTrackers {
            hash: "bbb".to_string(),
            name: "Other".to_string(),
            trackers: vec!["https://elsewhere.example/announce".to_string()],
        },
    ]
}

fn tracker_config() -> TrackerEditorConfig {
    TrackerEditorConfig {
        enabled: true,
        target_domain: "tracker.old.org".to_string(),
        replace_domain: "tracker.new.org".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_tracker_editor_rewrites_matching_trackers() {
    let client = Arc::new(FakeTorrentClient::new(torrents()));
    let plugin = TrackerEditorPlugin::new(tracker_config(), client.clone());
    assert!(plugin.enabled());

    let summary = plugin.edit_all().await.unwrap();
    assert_eq!(
        summary,
        EditSummary {
            torrents: 1,
            trackers: 1
        }
    );

    let applied = client.applied.lock().unwrap().clone();
    assert_eq!(
        applied,
        vec![(
            "aaa".to_string(),
            vec![TrackerEdit {
                original: "https://tracker.old.org/announce.php?passkey=1234".to_string(),
                replacement: "https://tracker.new.org/announce.php?passkey=1234".to_string(),
            }]
        )]
    );
}

#[tokio::test]
async fn test_tracker_editor_without_target_is_disabled() {
    let client = Arc::new(FakeTorrentClient::new(torrents()));
    let plugin = TrackerEditorPlugin::new(
        TrackerEditorConfig {
            target_domain: String::new(),
            ..tracker_config()
        },
        client,
    );
    assert!(!plugin.enabled());
}

#[tokio::test]
async fn test_log_cleaner_trims_every_log_in_directory() {
    let dir = tempfile::tempdir().unwrap();
    let long: String = (1..=10).map(|n| format!("line {n}\n")).collect();
    std::fs::write(dir.path().join("bangumi_sync.log"), &long).unwrap();
    std::fs::write(dir.path().join("douban_sync.log"), "only\n").unwrap();
    std::fs::write(dir.path().join("notes.txt"), &long).unwrap();

    let plugin = LogCleanerPlugin::new(LogCleanerConfig {
        enabled: true,
        log_dir: dir.path().to_path_buf(),
        rows: 3,
        ..Default::default()
    });
    assert_eq!(plugin.clean().await.unwrap(), 7);

    assert_eq!(
        std::fs::read_to_string(dir.path().join("bangumi_sync.log")).unwrap(),
        "line 8\nline 9\nline 10\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("douban_sync.log")).unwrap(),
        "only\n"
    );
    assert_eq!(std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(), long);
}

#[tokio::test]
async fn test_registry_collects_jobs_of_enabled_plugins() {
    let db = Database::in_memory().await.unwrap();
    let storage = tempfile::tempdir().unwrap();
    let mut registry = PluginRegistry::new(db);

    registry.register(Arc::new(AniStrmPlugin::new(
        AniStrmConfig {
            enabled: true,
            run_on_start: true,
            storage_dir: storage.path().to_path_buf(),
            ..Default::default()
        },
        Arc::new(FakeAniOpen::with_episodes(3)),
        chrono_tz::Asia::Shanghai,
    )));
    registry.register(Arc::new(LogCleanerPlugin::new(LogCleanerConfig {
        enabled: true,
        cron: "every day please".to_string(),
        ..Default::default()
    })));
    registry.register(Arc::new(TrackerEditorPlugin::new(
        TrackerEditorConfig {
            enabled: false,
            run_on_start: true,
            ..tracker_config()
        },
        Arc::new(FakeTorrentClient::new(Vec::new())),
    )));

    let (mut scheduler, _handle) = SchedulerService::new(chrono_tz::Asia::Shanghai);
    assert_eq!(registry.register_jobs(&mut scheduler), 2);
    assert_eq!(
        scheduler.job_names(),
        vec!["ani_strm on start".to_string(), "ani_strm season".to_string()]
    );

    let info = registry.list();
    assert_eq!(info.len(), 3);
    assert_eq!(info[0].jobs.len(), 2);
    assert!(info[1].enabled && info[1].jobs.is_empty());
    assert!(!info[2].enabled);
}
