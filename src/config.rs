use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::region::companion_regions_path;

const DEFAULT_CAMERAS_PATH: &str = "cameras.json";
const DEFAULT_EVENTS_DIR: &str = "events";
const DEFAULT_COUNTS_PATH: &str = "region_count.json";
const DEFAULT_PERIODIC_INTERVAL_FRAMES: u64 = 30;
const DEFAULT_STALE_AFTER_FRAMES: u64 = 90;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;
const DEFAULT_TELEGRAM_RETRY_COUNT: u32 = 2;
const DEFAULT_TELEGRAM_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_TELEGRAM_COOLDOWN_MS: u64 = 5_000;

#[derive(Debug, Deserialize, Default)]
struct RegionWatchConfigFile {
    cameras_path: Option<PathBuf>,
    events_dir: Option<PathBuf>,
    counts: Option<CountsConfigFile>,
    tracking: Option<TrackingConfigFile>,
    detector: Option<DetectorConfigFile>,
    classes: Option<Vec<u32>>,
    telegram: Option<TelegramConfigFile>,
    /// Path to a standalone `telegram_config.json` in the legacy layout.
    telegram_config: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CountsConfigFile {
    path: Option<PathBuf>,
    auto_save: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    periodic_interval_frames: Option<u64>,
    stale_after_frames: Option<u64>,
    frame_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    script_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct TelegramConfigFile {
    enabled: Option<bool>,
    bot_token: Option<String>,
    chat_id: Option<String>,
    retry_count: Option<u32>,
    timeout_ms: Option<u64>,
    cooldown_ms: Option<u64>,
}

/// `telegram_config.json` as written by earlier releases.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LegacyTelegramFile {
    enabled: Option<bool>,
    bot_token: Option<String>,
    chat_id: Option<String>,
    retry_count: Option<u32>,
    timeout: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RegionWatchConfig {
    pub cameras_path: PathBuf,
    pub events_dir: PathBuf,
    pub counts: CountsSettings,
    pub tracking: TrackingSettings,
    pub detector: DetectorSettings,
    /// Classes of interest; empty counts every class.
    pub selected_classes: Vec<u32>,
    pub telegram: TelegramSettings,
}

#[derive(Debug, Clone)]
pub struct CountsSettings {
    pub path: PathBuf,
    pub auto_save: bool,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub periodic_interval_frames: u64,
    pub stale_after_frames: u64,
    pub frame_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct DetectorSettings {
    /// Recorded detections replayed by the scripted detector backend.
    pub script_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    /// Extra attempts after a failed first delivery.
    pub retry_count: u32,
    pub timeout_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            retry_count: DEFAULT_TELEGRAM_RETRY_COUNT,
            timeout_ms: DEFAULT_TELEGRAM_TIMEOUT_MS,
            cooldown_ms: DEFAULT_TELEGRAM_COOLDOWN_MS,
        }
    }
}

impl TelegramSettings {
    /// Read the legacy `telegram_config.json` (`enabled`, `botToken`, `chatId`,
    /// `retryCount`, `timeout` in ms).
    pub fn from_legacy_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read telegram config {}: {}", path.display(), e))?;
        let legacy: LegacyTelegramFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid telegram config {}: {}", path.display(), e))?;
        let defaults = Self::default();
        Ok(Self {
            enabled: legacy.enabled.unwrap_or(false),
            bot_token: legacy.bot_token.unwrap_or_default(),
            chat_id: legacy.chat_id.unwrap_or_default(),
            retry_count: legacy.retry_count.unwrap_or(defaults.retry_count),
            timeout_ms: legacy.timeout.unwrap_or(defaults.timeout_ms),
            cooldown_ms: defaults.cooldown_ms,
        })
    }

    fn merge_file(&mut self, file: TelegramConfigFile) {
        if let Some(enabled) = file.enabled {
            self.enabled = enabled;
        }
        if let Some(token) = file.bot_token {
            self.bot_token = token;
        }
        if let Some(chat_id) = file.chat_id {
            self.chat_id = chat_id;
        }
        if let Some(retry_count) = file.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(timeout_ms) = file.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(cooldown_ms) = file.cooldown_ms {
            self.cooldown_ms = cooldown_ms;
        }
    }

    /// Disabled settings are always valid.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.bot_token.trim().is_empty() {
            return Err(anyhow!("telegram enabled but bot token is empty"));
        }
        if self.chat_id.trim().is_empty() {
            return Err(anyhow!("telegram enabled but chat id is empty"));
        }
        if self.timeout_ms == 0 {
            return Err(anyhow!("telegram timeout must be greater than zero"));
        }
        if self.cooldown_ms == 0 {
            return Err(anyhow!("telegram cooldown must be greater than zero"));
        }
        Ok(())
    }
}

impl RegionWatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REGIONWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `cameras.json` -> `cameras_regions.json`.
    pub fn regions_path(&self) -> PathBuf {
        companion_regions_path(&self.cameras_path)
    }

    fn from_file(file: RegionWatchConfigFile) -> Result<Self> {
        let cameras_path = file
            .cameras_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CAMERAS_PATH));
        let events_dir = file
            .events_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENTS_DIR));
        let counts = CountsSettings {
            path: file
                .counts
                .as_ref()
                .and_then(|counts| counts.path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COUNTS_PATH)),
            auto_save: file
                .counts
                .as_ref()
                .and_then(|counts| counts.auto_save)
                .unwrap_or(true),
        };
        let tracking = TrackingSettings {
            periodic_interval_frames: file
                .tracking
                .as_ref()
                .and_then(|t| t.periodic_interval_frames)
                .unwrap_or(DEFAULT_PERIODIC_INTERVAL_FRAMES),
            stale_after_frames: file
                .tracking
                .as_ref()
                .and_then(|t| t.stale_after_frames)
                .unwrap_or(DEFAULT_STALE_AFTER_FRAMES),
            frame_interval: Duration::from_millis(
                file.tracking
                    .as_ref()
                    .and_then(|t| t.frame_interval_ms)
                    .unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
            ),
        };
        let detector = DetectorSettings {
            script_path: file.detector.and_then(|d| d.script_path),
        };

        let mut telegram = match file.telegram_config.as_deref() {
            Some(path) => TelegramSettings::from_legacy_file(path)?,
            None => TelegramSettings::default(),
        };
        if let Some(section) = file.telegram {
            telegram.merge_file(section);
        }

        Ok(Self {
            cameras_path,
            events_dir,
            counts,
            tracking,
            detector,
            selected_classes: file.classes.unwrap_or_default(),
            telegram,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("REGIONWATCH_CAMERAS") {
            if !path.trim().is_empty() {
                self.cameras_path = PathBuf::from(path);
            }
        }
        if let Ok(dir) = std::env::var("REGIONWATCH_EVENTS_DIR") {
            if !dir.trim().is_empty() {
                self.events_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("REGIONWATCH_COUNTS_PATH") {
            if !path.trim().is_empty() {
                self.counts.path = PathBuf::from(path);
            }
        }
        if let Ok(interval) = std::env::var("REGIONWATCH_PERIODIC_INTERVAL") {
            self.tracking.periodic_interval_frames = interval.trim().parse().map_err(|_| {
                anyhow!("REGIONWATCH_PERIODIC_INTERVAL must be an integer number of frames")
            })?;
        }
        if let Ok(token) = std::env::var("REGIONWATCH_TELEGRAM_BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.telegram.bot_token = token;
            }
        }
        if let Ok(chat_id) = std::env::var("REGIONWATCH_TELEGRAM_CHAT_ID") {
            if !chat_id.trim().is_empty() {
                self.telegram.chat_id = chat_id;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.tracking.periodic_interval_frames == 0 {
            return Err(anyhow!("periodic interval must be greater than zero"));
        }
        if self.tracking.stale_after_frames == 0 {
            return Err(anyhow!("stale_after_frames must be greater than zero"));
        }
        if self.tracking.frame_interval.is_zero() {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        self.selected_classes.sort_unstable();
        self.selected_classes.dedup();
        self.telegram.bot_token = self.telegram.bot_token.trim().to_string();
        self.telegram.chat_id = self.telegram.chat_id.trim().to_string();
        self.telegram.validate()
    }
}

fn read_config_file(path: &Path) -> Result<RegionWatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
