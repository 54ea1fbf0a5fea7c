//! Per-camera frame processing.
//!
//! A `CameraPipeline` owns everything that belongs to one camera (detector,
//! tracker, class resolver, occupancy state, region catalog) and shares the
//! cross-camera services through `Services`. Each camera runs on its own
//! thread; nothing here is touched by two cameras at once except the services.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::CameraConfig;
use crate::class_filter::ClassFilter;
use crate::config::TrackingSettings;
use crate::counts::RegionCountStore;
use crate::detect::{Detection, DetectorBackend};
use crate::events::EventStore;
use crate::frame::{encode_jpeg, Frame, CROP_PADDING_PX};
use crate::ingest::FrameSource;
use crate::notify::{caption, NotificationThrottler};
use crate::occupancy::RegionOccupancyEngine;
use crate::region::RegionCatalog;
use crate::resolver::TrackClassResolver;
use crate::track::{Track, Tracker};
use crate::{local_now, DetectionEvent, EventKind};

const UNKNOWN_CLASS: &str = "unknown";
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Process-wide services shared by every camera.
#[derive(Clone)]
pub struct Services {
    pub class_filter: Arc<ClassFilter>,
    pub counts: Arc<RegionCountStore>,
    pub events: Arc<EventStore>,
    pub notifier: Arc<NotificationThrottler>,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub periodic_interval_frames: u64,
    /// Frames a track may go unreported before it is exited and its state
    /// dropped.
    pub stale_after_frames: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            periodic_interval_frames: 30,
            stale_after_frames: 90,
        }
    }
}

impl From<&TrackingSettings> for PipelineSettings {
    fn from(tracking: &TrackingSettings) -> Self {
        Self {
            periodic_interval_frames: tracking.periodic_interval_frames,
            stale_after_frames: tracking.stale_after_frames,
        }
    }
}

/// What one `process_frame` call did.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame_number: u64,
    pub detections: usize,
    pub tracks: usize,
    pub events: Vec<DetectionEvent>,
    pub evicted: usize,
}

pub struct CameraPipeline {
    camera: CameraConfig,
    regions: RegionCatalog,
    detector: Box<dyn DetectorBackend>,
    tracker: Box<dyn Tracker>,
    resolver: TrackClassResolver,
    occupancy: RegionOccupancyEngine,
    services: Services,
    settings: PipelineSettings,
    frame_number: u64,
    last_seen: HashMap<u64, LastSeen>,
}

/// Where a track was when the tracker last reported it.
struct LastSeen {
    frame_number: u64,
    track: Track,
}

impl CameraPipeline {
    pub fn new(
        camera: CameraConfig,
        regions: RegionCatalog,
        detector: Box<dyn DetectorBackend>,
        tracker: Box<dyn Tracker>,
        services: Services,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            camera,
            regions,
            detector,
            tracker,
            resolver: TrackClassResolver::new(),
            occupancy: RegionOccupancyEngine::new(settings.periodic_interval_frames),
            services,
            settings,
            frame_number: 0,
            last_seen: HashMap::new(),
        }
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    pub fn regions(&self) -> &RegionCatalog {
        &self.regions
    }

    /// Swap the region catalog. Tracks inside a region that no longer exists
    /// exit on their next frame.
    pub fn set_regions(&mut self, regions: RegionCatalog) {
        self.regions = regions;
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn occupancy(&self) -> &RegionOccupancyEngine {
        &self.occupancy
    }

    pub fn resolver(&self) -> &TrackClassResolver {
        &self.resolver
    }

    /// Run one frame through filter, tracker, class resolution and the
    /// occupancy state machine. A detector or tracker error fails this frame
    /// only; per-track state is left as it was.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport> {
        self.frame_number += 1;
        let frame_number = self.frame_number;

        let mut detections = self.detector.infer(frame)?;
        gate_detections(&mut detections, &self.services.class_filter, &self.regions);

        let tracks = self.tracker.update(&detections)?;
        self.resolver.update(&tracks, &detections);

        let mut report = FrameReport {
            frame_number,
            detections: detections.len(),
            tracks: tracks.len(),
            ..FrameReport::default()
        };

        for track in &tracks {
            self.last_seen.insert(
                track.id,
                LastSeen {
                    frame_number,
                    track: track.clone(),
                },
            );
            let region = self
                .regions
                .first_containing(&track.bbox)
                .map(|r| r.name().to_string());
            let object_class = match self.resolver.class_of(track.id) {
                Some(class_id) => self.detector.class_name(class_id),
                None => UNKNOWN_CLASS.to_string(),
            };
            let capture = Capture {
                frame,
                track,
                frame_number,
                camera: &self.camera,
                services: &self.services,
                object_class: &object_class,
            };
            let events = &mut report.events;
            self.occupancy
                .observe(frame_number, track.id, region.as_deref(), |kind, region_name| {
                    match capture.emit(kind, region_name) {
                        Some(event) => {
                            events.push(event);
                            true
                        }
                        None => false,
                    }
                });
        }

        report.evicted = self.evict_stale(frame, frame_number, &mut report.events);
        Ok(report)
    }

    /// Process frames from `source` until it runs dry or `stop` is set.
    /// Returns the number of frames processed.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        frame_interval: Duration,
        stop: &AtomicBool,
    ) -> Result<u64> {
        self.detector.warm_up()?;
        source.connect()?;
        let mut processed = 0u64;
        let mut last_health_log = Instant::now();

        while !stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            match source.next_frame() {
                Ok(Some(frame)) => {
                    match self.process_frame(&frame) {
                        Ok(report) => {
                            for event in &report.events {
                                log::info!(
                                    "camera {}: {} track={} region='{}' class={} frame={}",
                                    self.camera.name,
                                    event.kind,
                                    event.track_id,
                                    event.region_name,
                                    event.object_class,
                                    event.frame_number
                                );
                            }
                        }
                        Err(e) => log::warn!(
                            "camera {}: frame {} skipped: {:#}",
                            self.camera.name,
                            self.frame_number,
                            e
                        ),
                    }
                    processed += 1;
                }
                Ok(None) => {
                    log::info!("camera {}: end of stream", self.camera.name);
                    break;
                }
                Err(e) => log::warn!("camera {}: frame read failed: {:#}", self.camera.name, e),
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "camera {} health={} frames={} tracked={}",
                    self.camera.name,
                    source.is_healthy(),
                    processed,
                    self.occupancy.len()
                );
                last_health_log = Instant::now();
            }

            if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        Ok(processed)
    }

    /// Exit and drop every track unreported for more than
    /// `stale_after_frames` frames. The exit evidence is cropped from the
    /// current frame at the track's last known box.
    fn evict_stale(
        &mut self,
        frame: &Frame,
        frame_number: u64,
        events: &mut Vec<DetectionEvent>,
    ) -> usize {
        let stale_after = self.settings.stale_after_frames;
        let mut stale: Vec<u64> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| frame_number.saturating_sub(seen.frame_number) > stale_after)
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();

        for id in &stale {
            let Some(seen) = self.last_seen.remove(id) else {
                continue;
            };
            let object_class = match self.resolver.class_of(*id) {
                Some(class_id) => self.detector.class_name(class_id),
                None => UNKNOWN_CLASS.to_string(),
            };
            self.resolver.forget(*id);
            let capture = Capture {
                frame,
                track: &seen.track,
                frame_number,
                camera: &self.camera,
                services: &self.services,
                object_class: &object_class,
            };
            let exited = self.occupancy.vacate(*id, |kind, region_name| {
                match capture.emit(kind, region_name) {
                    Some(event) => {
                        events.push(event);
                        true
                    }
                    None => false,
                }
            });
            if let Some((_, region)) = exited {
                log::debug!(
                    "camera {}: track {} vanished, exited '{}'",
                    self.camera.name,
                    id,
                    region
                );
            } else {
                log::debug!("camera {}: dropped vanished track {}", self.camera.name, id);
            }
        }
        stale.len()
    }
}

/// Evidence capture for one track in one frame.
struct Capture<'a> {
    frame: &'a Frame,
    track: &'a Track,
    frame_number: u64,
    camera: &'a CameraConfig,
    services: &'a Services,
    object_class: &'a str,
}

impl Capture<'_> {
    /// Crop, store and record one event. `None` means nothing was recorded
    /// (no count, no event, no notification).
    fn emit(&self, kind: EventKind, region: &str) -> Option<DetectionEvent> {
        let Some(crop) = self.frame.crop_padded(&self.track.bbox, CROP_PADDING_PX) else {
            log::debug!(
                "camera {}: track {} crop outside frame, skipping {}",
                self.camera.name,
                self.track.id,
                kind
            );
            return None;
        };
        let jpeg = match encode_jpeg(&crop) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                log::warn!("camera {}: {:#}", self.camera.name, e);
                return None;
            }
        };
        let at = local_now();
        let image_path = self.services.events.save_event_image(
            &jpeg,
            &self.camera.name,
            region,
            self.track.id,
            self.frame_number,
            kind,
            at,
        )?;

        let counts = &self.services.counts;
        if kind == EventKind::FirstEntry && counts.record_entry(region, self.track.id) {
            log::info!(
                "region '{}': new unique {} (track {}), count {}",
                region,
                self.object_class,
                self.track.id,
                counts.get_count(region)
            );
        }

        let event = DetectionEvent {
            track_id: self.track.id,
            camera_id: self.camera.id,
            camera_name: self.camera.name.clone(),
            region_name: region.to_string(),
            object_class: self.object_class.to_string(),
            confidence: self.track.score,
            kind,
            timestamp: at,
            frame_number: self.frame_number,
            image_path: image_path.clone(),
            bbox: self.track.bbox,
        };
        self.services.events.append(event.clone());
        if let Some(dir) = image_path.parent() {
            if let Err(e) = self.services.events.write_manifest(dir) {
                log::warn!("{:#}", e);
            }
        }

        if kind.is_notifiable() {
            self.notify(kind, region);
        }
        Some(event)
    }

    fn notify(&self, kind: EventKind, region: &str) {
        let notifier = &self.services.notifier;
        if !notifier.is_enabled() {
            return;
        }
        let photo = match encode_jpeg(&self.frame.annotated(&self.track.bbox)) {
            Ok(photo) => photo,
            Err(e) => {
                log::warn!("camera {}: notification photo: {:#}", self.camera.name, e);
                return;
            }
        };
        let text = caption(
            kind,
            &self.camera.name,
            region,
            self.services.counts.get_count(region),
        );
        notifier.maybe_send(region, photo, text);
    }
}

/// Keep only detections of interest that fall inside some region. With no
/// regions defined every detection of interest is kept.
pub fn gate_detections(
    detections: &mut Vec<Detection>,
    filter: &ClassFilter,
    regions: &RegionCatalog,
) {
    detections.retain(|d| filter.should_count(d.class_id));
    if !regions.is_empty() {
        detections.retain(|d| regions.first_containing(&d.bbox).is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, Point};
    use crate::region::Region;

    #[test]
    fn gate_applies_class_filter_then_regions() {
        let filter = ClassFilter::with_selection([0]);
        let regions = RegionCatalog::from_regions(vec![Region::new(
            "door",
            vec![
                Point::new(0, 0),
                Point::new(50, 0),
                Point::new(50, 50),
                Point::new(0, 50),
            ],
        )])
        .unwrap();
        let mut detections = vec![
            Detection::new(BoundingBox::new(10, 10, 10, 10), 0, 0.9),
            Detection::new(BoundingBox::new(10, 10, 10, 10), 1, 0.9),
            Detection::new(BoundingBox::new(80, 80, 10, 10), 0, 0.9),
        ];
        gate_detections(&mut detections, &filter, &regions);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 0);
        assert_eq!(detections[0].bbox.x, 10);
    }

    #[test]
    fn gate_without_regions_keeps_everything_of_interest() {
        let filter = ClassFilter::new();
        let mut detections = vec![
            Detection::new(BoundingBox::new(10, 10, 10, 10), 3, 0.9),
            Detection::new(BoundingBox::new(900, 900, 10, 10), 4, 0.9),
        ];
        gate_detections(&mut detections, &filter, &RegionCatalog::new());
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn settings_follow_tracking_config() {
        let tracking = TrackingSettings {
            periodic_interval_frames: 12,
            stale_after_frames: 7,
            frame_interval: Duration::from_millis(40),
        };
        let settings = PipelineSettings::from(&tracking);
        assert_eq!(settings.periodic_interval_frames, 12);
        assert_eq!(settings.stale_after_frames, 7);
    }
}
