use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector that replays prepared per-frame detections.
///
/// Used for tests and for running the daemon against recorded model output.
/// Once the script is exhausted every frame yields no detections.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    classes: Vec<String>,
    frames: VecDeque<Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    frames: Vec<Vec<Detection>>,
}

impl ScriptedBackend {
    pub fn new(classes: Vec<String>) -> Self {
        Self {
            classes,
            frames: VecDeque::new(),
        }
    }

    /// Load `{"classes": [...], "frames": [[Detection, ...], ...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        let script: ScriptFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;
        Ok(Self {
            classes: script.classes,
            frames: script.frames.into(),
        })
    }

    pub fn push_frame(&mut self, detections: Vec<Detection>) {
        self.frames.push_back(detections);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }

    fn class_name(&self, class_id: u32) -> String {
        self.classes
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}
