//! Track-id -> class-id reconciliation.
//!
//! The tracker does not carry class identity, so every frame each track is
//! matched against the filtered detections by IoU. The mapping is sticky: a
//! track that matches nothing this frame keeps its last known class.

use std::collections::HashMap;

use crate::detect::Detection;
use crate::track::Track;

/// A detection must overlap a track by strictly more than this to claim it.
pub const IOU_MATCH_THRESHOLD: f32 = 0.3;

#[derive(Debug, Default)]
pub struct TrackClassResolver {
    classes: HashMap<u64, u32>,
}

impl TrackClassResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the mapping from this frame's tracks and detections.
    pub fn update(&mut self, tracks: &[Track], detections: &[Detection]) {
        for track in tracks {
            let mut best_iou = 0.0f32;
            let mut best_class = None;
            for det in detections {
                let iou = track.bbox.iou(&det.bbox);
                if iou > best_iou && iou > IOU_MATCH_THRESHOLD {
                    best_iou = iou;
                    best_class = Some(det.class_id);
                }
            }
            if let Some(class_id) = best_class {
                self.classes.insert(track.id, class_id);
            }
        }
    }

    /// Last known class for a track; `None` while it has never matched.
    pub fn class_of(&self, track_id: u64) -> Option<u32> {
        self.classes.get(&track_id).copied()
    }

    pub fn forget(&mut self, track_id: u64) {
        self.classes.remove(&track_id);
    }

    pub fn clear(&mut self) {
        self.classes.clear();
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn track(id: u64, bbox: BoundingBox) -> Track {
        Track {
            id,
            bbox,
            score: 0.9,
        }
    }

    #[test]
    fn best_overlap_above_threshold_wins() {
        let t = track(7, BoundingBox::new(0, 0, 10, 10));
        // IoU 0.5: 10x10 vs 10x5 fully inside -> 50 / 100
        let a = Detection::new(BoundingBox::new(0, 0, 10, 5), 1, 0.9);
        // IoU 0.2: 2x10 strip inside the track -> 20 / 100
        let b = Detection::new(BoundingBox::new(8, 0, 2, 10), 2, 0.9);
        assert!((t.bbox.iou(&a.bbox) - 0.5).abs() < 1e-6);
        assert!((t.bbox.iou(&b.bbox) - 0.2).abs() < 1e-6);

        let mut resolver = TrackClassResolver::new();
        resolver.update(&[t.clone()], &[b, a]);
        assert_eq!(resolver.class_of(7), Some(1));
    }

    #[test]
    fn mapping_is_sticky_without_a_match() {
        let t = track(3, BoundingBox::new(0, 0, 10, 10));
        let mut resolver = TrackClassResolver::new();
        resolver.update(&[t.clone()], &[Detection::new(t.bbox, 4, 0.8)]);
        assert_eq!(resolver.class_of(3), Some(4));

        // Only a weak overlap (IoU 0.2) this frame.
        resolver.update(
            &[t.clone()],
            &[Detection::new(BoundingBox::new(8, 0, 2, 10), 9, 0.8)],
        );
        assert_eq!(resolver.class_of(3), Some(4));

        resolver.update(&[t], &[]);
        assert_eq!(resolver.class_of(3), Some(4));
    }

    #[test]
    fn exactly_threshold_does_not_match() {
        // 10x10 track vs 10x3 detection inside it -> IoU 0.3 exactly
        let t = track(1, BoundingBox::new(0, 0, 10, 10));
        let mut resolver = TrackClassResolver::new();
        resolver.update(&[t], &[Detection::new(BoundingBox::new(0, 0, 10, 3), 5, 0.9)]);
        assert_eq!(resolver.class_of(1), None);
    }

    #[test]
    fn forget_drops_mapping() {
        let t = track(2, BoundingBox::new(0, 0, 10, 10));
        let mut resolver = TrackClassResolver::new();
        resolver.update(&[t.clone()], &[Detection::new(t.bbox, 0, 0.9)]);
        assert_eq!(resolver.len(), 1);
        resolver.forget(2);
        assert!(resolver.is_empty());
        assert_eq!(resolver.class_of(2), None);
    }
}
