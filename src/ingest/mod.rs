//! Frame ingestion sources.
//!
//! Video acquisition is a collaborator of the pipeline: a source hands out
//! decoded frames on demand and may fail or run dry.
//!
//! - `stub://<name>`: synthetic frames (testing, demos)
//! - local image directory or single image file (recorded footage)
//!
//! Live capture backends plug in by implementing `FrameSource`.

pub mod file;

use anyhow::{anyhow, Result};

use crate::camera::{CameraConfig, CameraKind};
use crate::frame::Frame;

pub use file::{FileConfig, FileSource};

pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<()>;

    /// Next decoded frame; `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;
}

/// Open the built-in source for a configured camera.
pub fn open_source(camera: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    let stub = camera.source.starts_with("stub://");
    match camera.kind {
        CameraKind::VideoFile => {}
        _ if stub => {}
        other => {
            return Err(anyhow!(
                "camera {} ('{}'): no built-in capture backend for {} sources",
                camera.id,
                camera.name,
                other
            ))
        }
    }
    let source = FileSource::new(FileConfig {
        path: camera.source.clone(),
        ..FileConfig::default()
    })?;
    Ok(Box::new(source))
}
