//! Region Watch
//!
//! Turns per-frame object detections into a de-duplicated, rate-limited stream
//! of region lifecycle events with image evidence, and keeps durable
//! unique-object counters per region.
//!
//! # Pipeline
//!
//! Per camera and per frame:
//!
//! 1. detections are filtered by the shared [`ClassFilter`],
//! 2. detections outside every region are dropped,
//! 3. the tracker assigns persistent ids,
//! 4. [`TrackClassResolver`] re-derives each track's class by IoU,
//! 5. [`RegionOccupancyEngine`] drives ENTRY / PERIODIC / EXIT,
//! 6. each committed transition lands in [`RegionCountStore`], [`EventStore`]
//!    and, for entries and exits, the [`NotificationThrottler`].
//!
//! # Module Structure
//!
//! - `geometry`, `region`: boxes, polygons, per-camera region catalogs
//! - `detect`, `track`, `ingest`, `frame`: collaborator seams and image helpers
//! - `resolver`, `occupancy`: per-camera state
//! - `counts`, `events`, `notify`: cross-camera services
//! - `camera`, `config`, `pipeline`: wiring for the binaries

use anyhow::Result;
use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub mod camera;
pub mod class_filter;
pub mod config;
pub mod counts;
pub mod detect;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod notify;
pub mod occupancy;
pub mod pipeline;
pub mod region;
pub mod resolver;
pub mod track;

pub use camera::{CameraConfig, CameraKind, CameraRegistry};
pub use class_filter::ClassFilter;
pub use config::{RegionWatchConfig, TelegramSettings};
pub use counts::{RegionCount, RegionCountStore};
pub use detect::{Detection, DetectorBackend, ScriptedBackend};
pub use events::EventStore;
pub use frame::Frame;
pub use geometry::{BoundingBox, Point};
pub use ingest::{open_source, FileSource, FrameSource};
pub use notify::{NotificationThrottler, NotificationTransport};
pub use occupancy::{RegionOccupancyEngine, TrackRegionState};
pub use pipeline::{CameraPipeline, PipelineSettings, Services};
pub use region::{Region, RegionCatalog, RegionColor};
pub use resolver::TrackClassResolver;
pub use track::{IouTracker, Track, Tracker};

/// `yyyy-MM-dd HH:mm:ss`, local clock.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local wall-clock time, second precision.
pub fn local_now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Lock a mutex shared across camera threads. A panic on another thread
/// does not take the shared state down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// -------------------- Event Types --------------------

/// Lifecycle point of a track in a region.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "ENTRY", alias = "FIRST_ENTRY")]
    FirstEntry,
    #[serde(rename = "PERIODIC")]
    Periodic,
    #[serde(rename = "EXIT")]
    Exit,
}

impl EventKind {
    /// Wire and filename spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FirstEntry => "ENTRY",
            EventKind::Periodic => "PERIODIC",
            EventKind::Exit => "EXIT",
        }
    }

    /// Only entries and exits are pushed to external notification.
    pub fn is_notifiable(&self) -> bool {
        matches!(self, EventKind::FirstEntry | EventKind::Exit)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Events --------------------

/// One emitted lifecycle event with its stored evidence. Never mutated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectionEvent {
    pub track_id: u64,
    pub camera_id: u32,
    pub camera_name: String,
    pub region_name: String,
    pub object_class: String,
    pub confidence: f32,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub frame_number: u64,
    pub image_path: PathBuf,
    pub bbox: BoundingBox,
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Parse a user-supplied `yyyy-MM-dd HH:mm:ss` timestamp.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid timestamp '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(kind: EventKind) -> DetectionEvent {
        DetectionEvent {
            track_id: 12,
            camera_id: 1,
            camera_name: "Front Cam".into(),
            region_name: "Door".into(),
            object_class: "person".into(),
            confidence: 0.75,
            kind,
            timestamp: parse_timestamp("2024-05-01 08:30:15").unwrap(),
            frame_number: 42,
            image_path: PathBuf::from("events/Front_Cam/Door/2024-05-01/12_083015_42_ENTRY.jpg"),
            bbox: BoundingBox::new(1, 2, 3, 4),
        }
    }

    #[test]
    fn event_json_uses_wire_names() {
        let value = serde_json::to_value(sample_event(EventKind::FirstEntry)).unwrap();
        assert_eq!(value["event_type"], "ENTRY");
        assert_eq!(value["timestamp"], "2024-05-01 08:30:15");
        assert_eq!(value["bbox"]["width"], 3);
        assert_eq!(
            value["image_path"],
            "events/Front_Cam/Door/2024-05-01/12_083015_42_ENTRY.jpg"
        );
    }

    #[test]
    fn event_kind_accepts_legacy_first_entry() {
        let kind: EventKind = serde_json::from_str("\"FIRST_ENTRY\"").unwrap();
        assert_eq!(kind, EventKind::FirstEntry);
        let kind: EventKind = serde_json::from_str("\"EXIT\"").unwrap();
        assert_eq!(kind, EventKind::Exit);
        assert!(serde_json::from_str::<EventKind>("\"LEAVE\"").is_err());
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = sample_event(EventKind::Periodic);
        let raw = serde_json::to_string(&event).unwrap();
        let back: DetectionEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn only_entry_and_exit_notify() {
        assert!(EventKind::FirstEntry.is_notifiable());
        assert!(EventKind::Exit.is_notifiable());
        assert!(!EventKind::Periodic.is_notifiable());
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        assert!(parse_timestamp("2024-05-01T08:30:15").is_err());
        assert!(parse_timestamp(" 2024-05-01 08:30:15 ").is_ok());
    }

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn lock_recovers_from_poisoned_mutex() {
        let shared = std::sync::Arc::new(Mutex::new(5));
        let poisoner = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(shared.is_poisoned());
        *lock(&shared) += 1;
        assert_eq!(*lock(&shared), 6);
    }
}
