use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use regionwatch::config::{RegionWatchConfig, TelegramSettings};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "REGIONWATCH_CONFIG",
        "REGIONWATCH_CAMERAS",
        "REGIONWATCH_EVENTS_DIR",
        "REGIONWATCH_COUNTS_PATH",
        "REGIONWATCH_PERIODIC_INTERVAL",
        "REGIONWATCH_TELEGRAM_BOT_TOKEN",
        "REGIONWATCH_TELEGRAM_CHAT_ID",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RegionWatchConfig::load().expect("load defaults");
    assert_eq!(cfg.cameras_path, PathBuf::from("cameras.json"));
    assert_eq!(cfg.regions_path(), PathBuf::from("cameras_regions.json"));
    assert_eq!(cfg.events_dir, PathBuf::from("events"));
    assert_eq!(cfg.counts.path, PathBuf::from("region_count.json"));
    assert!(cfg.counts.auto_save);
    assert_eq!(cfg.tracking.periodic_interval_frames, 30);
    assert_eq!(cfg.tracking.stale_after_frames, 90);
    assert_eq!(cfg.tracking.frame_interval, Duration::from_millis(33));
    assert!(cfg.selected_classes.is_empty());
    assert_eq!(cfg.telegram, TelegramSettings::default());
    assert_eq!(cfg.telegram.retry_count, 2);
    assert_eq!(cfg.telegram.timeout_ms, 10_000);
    assert_eq!(cfg.telegram.cooldown_ms, 5_000);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "cameras_path": "/etc/regionwatch/site.json",
            "events_dir": "/var/lib/regionwatch/events",
            "counts": { "path": "/var/lib/regionwatch/counts.json", "auto_save": false },
            "tracking": { "periodic_interval_frames": 15, "stale_after_frames": 40, "frame_interval_ms": 50 },
            "detector": { "script_path": "/srv/detections.json" },
            "classes": [2, 0, 2],
            "telegram": { "enabled": true, "bot_token": "file-token", "chat_id": " 42 ", "cooldown_ms": 2000 }
        }"#,
    );
    std::env::set_var("REGIONWATCH_CONFIG", file.path());
    std::env::set_var("REGIONWATCH_PERIODIC_INTERVAL", "45");
    std::env::set_var("REGIONWATCH_TELEGRAM_BOT_TOKEN", "env-token");

    let cfg = RegionWatchConfig::load().expect("load config");

    assert_eq!(
        cfg.regions_path(),
        PathBuf::from("/etc/regionwatch/site_regions.json")
    );
    assert_eq!(cfg.events_dir, PathBuf::from("/var/lib/regionwatch/events"));
    assert_eq!(cfg.counts.path, PathBuf::from("/var/lib/regionwatch/counts.json"));
    assert!(!cfg.counts.auto_save);
    assert_eq!(cfg.tracking.periodic_interval_frames, 45);
    assert_eq!(cfg.tracking.stale_after_frames, 40);
    assert_eq!(cfg.tracking.frame_interval, Duration::from_millis(50));
    assert_eq!(cfg.detector.script_path, Some(PathBuf::from("/srv/detections.json")));
    assert_eq!(cfg.selected_classes, vec![0, 2]);
    assert!(cfg.telegram.enabled);
    assert_eq!(cfg.telegram.bot_token, "env-token");
    assert_eq!(cfg.telegram.chat_id, "42");
    assert_eq!(cfg.telegram.cooldown_ms, 2000);
    assert_eq!(cfg.telegram.retry_count, 2);

    clear_env();
}

#[test]
fn rejects_invalid_periodic_interval() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("REGIONWATCH_PERIODIC_INTERVAL", "often");
    assert!(RegionWatchConfig::load().is_err());
    std::env::set_var("REGIONWATCH_PERIODIC_INTERVAL", "0");
    assert!(RegionWatchConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_enabled_telegram_without_credentials() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "telegram": { "enabled": true, "bot_token": "abc" } }"#);
    std::env::set_var("REGIONWATCH_CONFIG", file.path());
    assert!(RegionWatchConfig::load().is_err());

    std::env::set_var("REGIONWATCH_TELEGRAM_CHAT_ID", "12345");
    let cfg = RegionWatchConfig::load().expect("chat id from env");
    assert_eq!(cfg.telegram.chat_id, "12345");

    clear_env();
}

#[test]
fn legacy_telegram_file_is_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let legacy = write_config(
        r#"{ "enabled": true, "botToken": "legacy", "chatId": "-1001", "retryCount": 4, "timeout": 3000 }"#,
    );
    let settings = TelegramSettings::from_legacy_file(legacy.path()).expect("legacy file");
    assert!(settings.enabled);
    assert_eq!(settings.bot_token, "legacy");
    assert_eq!(settings.chat_id, "-1001");
    assert_eq!(settings.retry_count, 4);
    assert_eq!(settings.timeout_ms, 3000);
    assert_eq!(settings.cooldown_ms, 5000);

    let config = write_config(&format!(
        r#"{{ "telegram_config": "{}", "telegram": {{ "retry_count": 1 }} }}"#,
        legacy.path().display()
    ));
    std::env::set_var("REGIONWATCH_CONFIG", config.path());
    let cfg = RegionWatchConfig::load().expect("load with legacy telegram file");
    assert_eq!(cfg.telegram.bot_token, "legacy");
    assert_eq!(cfg.telegram.retry_count, 1);

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("REGIONWATCH_CONFIG", "/nonexistent/regionwatch.json");
    assert!(RegionWatchConfig::load().is_err());

    clear_env();
}
