//! Local file frame source.
//!
//! `FileSource` reads frames from local storage only:
//! - a directory of still images, replayed in file-name order,
//! - a single still image (one frame),
//! - `stub://` paths, which generate synthetic frames.
//!
//! URL schemes other than `stub://` are rejected.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Image directory, image file, or `stub://<name>`.
    pub path: String,
    /// Synthetic frame size.
    pub width: u32,
    pub height: u32,
    /// Stop a synthetic source after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    Images(ImageSequenceSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): {}",
                config.path
            ));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticFileSource::new(config))
        } else {
            FileBackend::Images(ImageSequenceSource::new(config))
        };
        Ok(Self { backend })
    }

    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            FileBackend::Images(source) => source.stats(),
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            FileBackend::Images(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Images(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            FileBackend::Images(source) => source.connected,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

// -------------------- Synthetic source (stub://) --------------------

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("FileSource: connected to {} (synthetic)", self.config.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(max) = self.config.max_frames {
            if self.frame_count >= max {
                return Ok(None);
            }
        }
        self.frame_count += 1;
        let shift = self.frame_count;
        let image = RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            Rgb([
                ((x as u64 + shift) % 256) as u8,
                ((y as u64 + shift) % 256) as u8,
                (shift % 256) as u8,
            ])
        });
        Ok(Some(Frame::new(image)))
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

// -------------------- Still-image sequence --------------------

struct ImageSequenceSource {
    config: FileConfig,
    pending: VecDeque<PathBuf>,
    frame_count: u64,
    connected: bool,
}

impl ImageSequenceSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            frame_count: 0,
            connected: false,
        }
    }

    fn connect(&mut self) -> Result<()> {
        let path = Path::new(&self.config.path);
        let files = if path.is_dir() {
            list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(anyhow!("frame source {} does not exist", path.display()));
        };
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", path.display()));
        }
        log::info!(
            "FileSource: connected to {} ({} image(s))",
            path.display(),
            files.len()
        );
        self.pending = files.into();
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("file source not connected; call connect() first"));
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("decode frame {}", path.display()))?
            .into_rgb8();
        self.frame_count += 1;
        Ok(Some(Frame::new(image)))
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
