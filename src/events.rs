//! Append-only event log with on-disk image evidence.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<camera>/<region>/<yyyy-MM-dd>/<track>_<HHMMSS>_<frame>_<KIND>.jpg
//! <base>/<camera>/<region>/<yyyy-MM-dd>/metadata.json   {"events": [...]}
//! ```
//!
//! Camera and region names have spaces (and path separators) replaced by `_`.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{lock, write_atomic, DetectionEvent, EventKind};

pub const MANIFEST_FILE: &str = "metadata.json";

const DATE_DIR_FORMAT: &str = "%Y-%m-%d";
const FILE_TIME_FORMAT: &str = "%H%M%S";
const IMAGE_EXTENSION: &str = "jpg";

#[derive(Serialize)]
struct ManifestOut<'a> {
    events: Vec<&'a DetectionEvent>,
}

#[derive(Deserialize)]
struct ManifestIn {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

pub struct EventStore {
    base_dir: PathBuf,
    events: Mutex<Vec<DetectionEvent>>,
    manifest_lock: Mutex<()>,
}

impl EventStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            events: Mutex::new(Vec::new()),
            manifest_lock: Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn append(&self, event: DetectionEvent) {
        lock(&self.events).push(event);
    }

    pub fn all(&self) -> Vec<DetectionEvent> {
        lock(&self.events).clone()
    }

    pub fn by_camera(&self, camera_id: u32) -> Vec<DetectionEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.camera_id == camera_id)
            .cloned()
            .collect()
    }

    /// Events with `start <= timestamp <= end`.
    pub fn by_time_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<DetectionEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    pub fn count(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn event_directory(&self, camera_name: &str, region_name: &str, date: NaiveDate) -> PathBuf {
        self.base_dir
            .join(sanitize_component(camera_name))
            .join(sanitize_component(region_name))
            .join(date.format(DATE_DIR_FORMAT).to_string())
    }

    /// Write the evidence image for an event. Returns the written path, or
    /// `None` (logged) when the write fails.
    ///
    /// The frame number keeps two events of one track within the same second
    /// apart.
    #[allow(clippy::too_many_arguments)]
    pub fn save_event_image(
        &self,
        image: &[u8],
        camera_name: &str,
        region_name: &str,
        track_id: u64,
        frame_number: u64,
        kind: EventKind,
        at: NaiveDateTime,
    ) -> Option<PathBuf> {
        let dir = self.event_directory(camera_name, region_name, at.date());
        let file_name = format!(
            "{}_{}_{}_{}.{}",
            track_id,
            at.format(FILE_TIME_FORMAT),
            frame_number,
            kind.as_str(),
            IMAGE_EXTENSION
        );
        let path = dir.join(file_name);
        let result = fs::create_dir_all(&dir).and_then(|_| fs::write(&path, image));
        match result {
            Ok(()) => Some(path),
            Err(e) => {
                log::warn!("failed to save event image {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Rewrite `<dir>/metadata.json` from the in-memory events whose image
    /// lives in `dir`.
    pub fn write_manifest(&self, dir: &Path) -> Result<()> {
        let _writer = lock(&self.manifest_lock);
        let events: Vec<DetectionEvent> = lock(&self.events)
            .iter()
            .filter(|e| e.image_path.parent() == Some(dir))
            .cloned()
            .collect();
        let manifest = ManifestOut {
            events: events.iter().collect(),
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        let path = dir.join(MANIFEST_FILE);
        write_atomic(&path, &json).with_context(|| format!("write manifest {}", path.display()))
    }

    /// Scan the base directory for manifests and merge their events into the
    /// log. Corrupt manifests and entries are skipped with a warning; events
    /// already present are not duplicated. Returns the number added.
    pub fn load_from_directory(&self) -> Result<usize> {
        if !self.base_dir.exists() {
            return Ok(0);
        }
        let mut manifests = Vec::new();
        collect_manifests(&self.base_dir, &mut manifests)
            .with_context(|| format!("scan events dir {}", self.base_dir.display()))?;
        manifests.sort();

        let mut loaded = Vec::new();
        for path in manifests {
            match read_manifest(&path) {
                Ok(events) => loaded.extend(events),
                Err(e) => log::warn!("skipping manifest {}: {:#}", path.display(), e),
            }
        }

        let mut events = lock(&self.events);
        let mut seen: HashSet<(PathBuf, u64, EventKind)> = events
            .iter()
            .map(|e| (e.image_path.clone(), e.frame_number, e.kind))
            .collect();
        let mut added = 0;
        for event in loaded {
            if seen.insert((event.image_path.clone(), event.frame_number, event.kind)) {
                events.push(event);
                added += 1;
            }
        }
        events.sort_by_key(|e| e.timestamp);
        Ok(added)
    }
}

fn collect_manifests(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_manifests(&path, out)?;
        } else if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
            out.push(path);
        }
    }
    Ok(())
}

fn read_manifest(path: &Path) -> Result<Vec<DetectionEvent>> {
    let raw = fs::read_to_string(path)?;
    let manifest: ManifestIn =
        serde_json::from_str(&raw).map_err(|e| anyhow!("invalid manifest: {}", e))?;
    let mut events = Vec::with_capacity(manifest.events.len());
    for (idx, value) in manifest.events.into_iter().enumerate() {
        match serde_json::from_value::<DetectionEvent>(value) {
            Ok(event) => events.push(event),
            Err(e) => log::warn!("{}: skipping event #{}: {}", path.display(), idx, e),
        }
    }
    Ok(events)
}

/// Directory-safe form of a camera or region name.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}
