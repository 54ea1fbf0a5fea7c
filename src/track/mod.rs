//! Track interface between the external multi-object tracker and the
//! region pipeline.
//!
//! The tracker assigns persistent ids; the pipeline only reads tracks. Class
//! identity is not carried by tracks and is re-derived per frame by
//! `resolver::TrackClassResolver`.

mod iou;

use anyhow::Result;

use crate::detect::Detection;
use crate::geometry::BoundingBox;

pub use iou::IouTracker;

/// Tracker output for one object in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// Monotonically assigned, never reused within a process lifetime.
    pub id: u64,
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Multi-object tracker.
pub trait Tracker: Send {
    /// Feed one frame of (already filtered) detections and return the tracks
    /// active in this frame.
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Track>>;

    /// Drop all tracks. Ids are still never reused.
    fn reset(&mut self);

    /// Number of tracks currently held (including temporarily lost ones).
    fn track_count(&self) -> usize;
}
