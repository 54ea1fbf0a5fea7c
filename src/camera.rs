//! Camera registry and its JSON file (`{"next_id", "cameras": [...]}`).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::write_atomic;

/// Kind of video source behind a camera. Unknown strings fall back to
/// `Webcam`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CameraKind {
    Webcam,
    VideoFile,
    RtspStream,
    IpCamera,
}

impl CameraKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraKind::Webcam => "webcam",
            CameraKind::VideoFile => "video_file",
            CameraKind::RtspStream => "rtsp_stream",
            CameraKind::IpCamera => "ip_camera",
        }
    }

    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "video_file" => CameraKind::VideoFile,
            "rtsp_stream" => CameraKind::RtspStream,
            "ip_camera" => CameraKind::IpCamera,
            "webcam" => CameraKind::Webcam,
            other => {
                log::warn!("unknown camera type '{}', treating as webcam", other);
                CameraKind::Webcam
            }
        }
    }
}

impl From<String> for CameraKind {
    fn from(raw: String) -> Self {
        CameraKind::parse_lossy(&raw)
    }
}

impl From<CameraKind> for String {
    fn from(kind: CameraKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CameraKind,
    /// Device index, file/directory path or stream URL depending on `kind`.
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraFile {
    #[serde(default = "first_id")]
    next_id: u32,
    #[serde(default)]
    cameras: Vec<CameraConfig>,
}

fn first_id() -> u32 {
    1
}

#[derive(Clone, Debug)]
pub struct CameraRegistry {
    next_id: u32,
    cameras: Vec<CameraConfig>,
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            cameras: Vec::new(),
        }
    }
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a camera and return its newly assigned id.
    pub fn add(&mut self, name: &str, kind: CameraKind, source: &str) -> Result<u32> {
        if name.trim().is_empty() {
            return Err(anyhow!("camera name must not be empty"));
        }
        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| anyhow!("camera id space exhausted"))?;
        self.cameras.push(CameraConfig {
            id,
            name: name.to_string(),
            kind,
            source: source.to_string(),
        });
        Ok(id)
    }

    pub fn remove(&mut self, id: u32) -> Option<CameraConfig> {
        let idx = self.cameras.iter().position(|c| c.id == id)?;
        Some(self.cameras.remove(idx))
    }

    /// Replace name, kind and source of an existing camera; the id is kept.
    pub fn update(&mut self, camera: CameraConfig) -> Result<()> {
        let slot = self
            .cameras
            .iter_mut()
            .find(|c| c.id == camera.id)
            .ok_or_else(|| anyhow!("camera {} not found", camera.id))?;
        *slot = camera;
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn cameras(&self) -> &[CameraConfig] {
        &self.cameras
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = CameraFile {
            next_id: self.next_id,
            cameras: self.cameras.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        write_atomic(path, &json).with_context(|| format!("write cameras file {}", path.display()))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read cameras file {}", path.display()))?;
        let file: CameraFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid cameras file {}: {}", path.display(), e))?;

        let mut cameras: Vec<CameraConfig> = Vec::with_capacity(file.cameras.len());
        for camera in file.cameras {
            if cameras.iter().any(|c| c.id == camera.id) {
                log::warn!("duplicate camera id {} in {}, skipping", camera.id, path.display());
                continue;
            }
            cameras.push(camera);
        }
        // Never hand out an id that is already in use.
        let max_id = cameras.iter().map(|c| c.id).max().unwrap_or(0);
        Ok(Self {
            next_id: file.next_id.max(max_id.saturating_add(1)),
            cameras,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_falls_back_to_webcam() {
        let cam: CameraConfig =
            serde_json::from_str(r#"{"id":4,"name":"x","type":"thermal","source":"0"}"#).unwrap();
        assert_eq!(cam.kind, CameraKind::Webcam);
        let cam: CameraConfig =
            serde_json::from_str(r#"{"id":4,"name":"x","type":"rtsp_stream","source":"rtsp://h"}"#)
                .unwrap();
        assert_eq!(cam.kind, CameraKind::RtspStream);
        assert_eq!(serde_json::to_value(&cam).unwrap()["type"], "rtsp_stream");
    }

    #[test]
    fn ids_are_assigned_monotonically() {
        let mut registry = CameraRegistry::new();
        let a = registry.add("front", CameraKind::Webcam, "0").unwrap();
        let b = registry.add("back", CameraKind::VideoFile, "clip.mp4").unwrap();
        assert_eq!((a, b), (1, 2));
        registry.remove(b).unwrap();
        let c = registry.add("side", CameraKind::IpCamera, "http://cam").unwrap();
        assert_eq!(c, 3);
        assert!(registry.add(" ", CameraKind::Webcam, "0").is_err());
    }

    #[test]
    fn update_keeps_id() {
        let mut registry = CameraRegistry::new();
        let id = registry.add("front", CameraKind::Webcam, "0").unwrap();
        registry
            .update(CameraConfig {
                id,
                name: "Front Door".into(),
                kind: CameraKind::RtspStream,
                source: "rtsp://door".into(),
            })
            .unwrap();
        assert_eq!(registry.get(id).unwrap().name, "Front Door");
        assert!(registry
            .update(CameraConfig {
                id: 99,
                name: "x".into(),
                kind: CameraKind::Webcam,
                source: "0".into(),
            })
            .is_err());
    }

    #[test]
    fn file_round_trip_preserves_next_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cameras.json");
        let mut registry = CameraRegistry::new();
        registry.add("front", CameraKind::Webcam, "0").unwrap();
        let gone = registry.add("temp", CameraKind::Webcam, "1").unwrap();
        registry.remove(gone);
        registry.save_to_file(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["next_id"], 3);
        assert_eq!(raw["cameras"][0]["type"], "webcam");

        let loaded = CameraRegistry::load_from_file(&path).unwrap();
        assert_eq!(loaded.next_id(), 3);
        assert_eq!(loaded.cameras(), registry.cameras());
    }

    #[test]
    fn stale_next_id_is_bumped_past_existing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cameras.json");
        std::fs::write(
            &path,
            r#"{"next_id":1,"cameras":[{"id":5,"name":"a","type":"webcam","source":"0"},
                {"id":5,"name":"dup","type":"webcam","source":"1"}]}"#,
        )
        .unwrap();
        let mut loaded = CameraRegistry::load_from_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.add("b", CameraKind::Webcam, "2").unwrap(), 6);
    }
}
