use anyhow::Result;

use super::{Track, Tracker};
use crate::detect::Detection;
use crate::geometry::BoundingBox;

const DEFAULT_MATCH_IOU: f32 = 0.3;
const DEFAULT_MAX_LOST_FRAMES: u32 = 30;

struct LiveTrack {
    id: u64,
    bbox: BoundingBox,
    score: f32,
    frames_lost: u32,
}

/// Greedy IoU association tracker.
///
/// A minimal stand-in for a production tracker (ByteTrack and friends): each
/// frame, detection/track pairs are matched in descending IoU order; unmatched
/// detections open new tracks and tracks unseen for more than
/// `max_lost_frames` are dropped. Only tracks matched in the current frame are
/// reported.
pub struct IouTracker {
    tracks: Vec<LiveTrack>,
    next_id: u64,
    match_iou: f32,
    max_lost_frames: u32,
}

impl IouTracker {
    pub fn new(match_iou: f32, max_lost_frames: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            match_iou,
            max_lost_frames,
        }
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_IOU, DEFAULT_MAX_LOST_FRAMES)
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Track>> {
        let mut pairs = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.match_iou {
                    pairs.push((iou, ti, di));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];
        for (_, ti, di) in pairs {
            if track_matched[ti] || det_matched[di] {
                continue;
            }
            track_matched[ti] = true;
            det_matched[di] = true;
            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.score = detections[di].confidence;
            track.frames_lost = 0;
        }

        for (ti, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[ti].frames_lost += 1;
            }
        }

        let mut active: Vec<u64> = self
            .tracks
            .iter()
            .zip(&track_matched)
            .filter(|(_, matched)| **matched)
            .map(|(t, _)| t.id)
            .collect();

        for (di, det) in detections.iter().enumerate() {
            if det_matched[di] {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(LiveTrack {
                id,
                bbox: det.bbox,
                score: det.confidence,
                frames_lost: 0,
            });
            active.push(id);
        }

        let max_lost = self.max_lost_frames;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        Ok(self
            .tracks
            .iter()
            .filter(|t| active.contains(&t.id))
            .map(|t| Track {
                id: t.id,
                bbox: t.bbox,
                score: t.score,
            })
            .collect())
    }

    fn reset(&mut self) {
        self.tracks.clear();
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: i32, y: i32) -> Detection {
        Detection::new(BoundingBox::new(x, y, 40, 40), 0, 0.8)
    }

    #[test]
    fn keeps_identity_across_small_motion() {
        let mut tracker = IouTracker::default();
        let first = tracker.update(&[det(0, 0), det(200, 200)]).unwrap();
        let second = tracker.update(&[det(204, 202), det(3, 2)]).unwrap();
        let id_at = |tracks: &[Track], x: i32| tracks.iter().find(|t| t.bbox.x == x).unwrap().id;
        assert_eq!(id_at(first.as_slice(), 0), id_at(second.as_slice(), 3));
        assert_eq!(id_at(first.as_slice(), 200), id_at(second.as_slice(), 204));
    }

    #[test]
    fn ids_are_never_reused() {
        let mut tracker = IouTracker::new(0.3, 0);
        let a = tracker.update(&[det(0, 0)]).unwrap()[0].id;
        assert!(tracker.update(&[]).unwrap().is_empty());
        assert_eq!(tracker.track_count(), 0);
        let b = tracker.update(&[det(0, 0)]).unwrap()[0].id;
        assert!(b > a);
        tracker.reset();
        let c = tracker.update(&[det(0, 0)]).unwrap()[0].id;
        assert!(c > b);
    }

    #[test]
    fn lost_track_resumes_within_budget() {
        let mut tracker = IouTracker::new(0.3, 5);
        let a = tracker.update(&[det(10, 10)]).unwrap()[0].id;
        for _ in 0..3 {
            assert!(tracker.update(&[]).unwrap().is_empty());
        }
        let resumed = tracker.update(&[det(12, 10)]).unwrap();
        assert_eq!(resumed[0].id, a);
    }

    #[test]
    fn boxes_at_coordinate_limits_are_tracked() {
        let mut tracker = IouTracker::default();
        // Right and bottom edges saturate at i32::MAX.
        let edge = det(i32::MAX - 10, i32::MAX - 10);
        let first = tracker.update(&[edge.clone(), det(0, 0)]).unwrap();
        assert_eq!(first.len(), 2);
        let second = tracker.update(&[edge, det(2, 0)]).unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().any(|t| t.id == first[1].id && t.bbox.x == 2));
    }
}
