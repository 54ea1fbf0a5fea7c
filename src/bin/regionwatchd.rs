//! regionwatchd - region watch daemon
//!
//! This daemon:
//! 1. Loads the camera registry and per-camera regions
//! 2. Restores region counts and the event log from disk
//! 3. Runs one processing thread per camera (detect, track, occupancy)
//! 4. Stores event evidence, counts unique entries, pushes notifications
//! 5. On Ctrl-C, stops the cameras and saves the counts snapshot

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regionwatch::config::RegionWatchConfig;
use regionwatch::region::load_regions;
use regionwatch::{
    open_source, CameraConfig, CameraPipeline, CameraRegistry, ClassFilter, DetectorBackend,
    EventStore, IouTracker, NotificationThrottler, PipelineSettings, RegionCatalog,
    RegionCountStore, ScriptedBackend, Services,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = RegionWatchConfig::load()?;

    let registry = CameraRegistry::load_from_file(&cfg.cameras_path)?;
    if registry.is_empty() {
        return Err(anyhow!(
            "no cameras configured in {}",
            cfg.cameras_path.display()
        ));
    }
    let regions_path = cfg.regions_path();
    let mut regions: BTreeMap<u32, RegionCatalog> = if regions_path.exists() {
        load_regions(&regions_path)?
    } else {
        log::warn!(
            "no regions file at {}; cameras will track without counting",
            regions_path.display()
        );
        BTreeMap::new()
    };

    let class_filter = Arc::new(ClassFilter::with_selection(
        cfg.selected_classes.iter().copied(),
    ));

    let counts = Arc::new(RegionCountStore::new());
    if cfg.counts.path.exists() {
        let loaded = counts.load_from_file(&cfg.counts.path)?;
        log::info!(
            "restored counts for {} region(s) from {}",
            loaded,
            cfg.counts.path.display()
        );
    }
    if cfg.counts.auto_save {
        counts.set_auto_save(Some(cfg.counts.path.clone()));
    }

    let events = Arc::new(EventStore::new(&cfg.events_dir));
    match events.load_from_directory() {
        Ok(n) => log::info!("restored {} event(s) from {}", n, cfg.events_dir.display()),
        Err(e) => log::warn!("event history not restored: {:#}", e),
    }

    let notifier = Arc::new(NotificationThrottler::from_settings(&cfg.telegram)?);

    let services = Services {
        class_filter,
        counts: counts.clone(),
        events,
        notifier: notifier.clone(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;
    }

    let settings = PipelineSettings::from(&cfg.tracking);
    let mut workers = Vec::new();
    for camera in registry.cameras() {
        let catalog = regions.remove(&camera.id).unwrap_or_default();
        let detector = match build_detector(&cfg) {
            Ok(detector) => detector,
            Err(e) => {
                log::error!("camera {} ('{}') not started: {:#}", camera.id, camera.name, e);
                continue;
            }
        };
        match spawn_camera(camera.clone(), catalog, detector, services.clone(), settings, &cfg, &stop) {
            Ok(handle) => workers.push(handle),
            Err(e) => log::error!("camera {} ('{}') not started: {:#}", camera.id, camera.name, e),
        }
    }
    if workers.is_empty() {
        return Err(anyhow!("no camera could be started"));
    }

    log::info!("regionwatchd running with {} camera(s)", workers.len());
    for handle in workers {
        if handle.join().is_err() {
            log::error!("camera thread panicked");
        }
    }

    counts
        .save_to_file(&cfg.counts.path)
        .with_context(|| "final counts snapshot")?;
    notifier.shutdown();
    let stats = notifier.stats();
    log::info!(
        "shutdown complete: notifications dispatched={} delivered={} failed={} throttled={}",
        stats.dispatched,
        stats.delivered,
        stats.failed,
        stats.throttled
    );
    Ok(())
}

fn build_detector(cfg: &RegionWatchConfig) -> Result<Box<dyn DetectorBackend>> {
    match cfg.detector.script_path.as_deref() {
        Some(path) => Ok(Box::new(ScriptedBackend::from_json_file(path)?)),
        None => {
            log::warn!("no detector configured; frames will yield no detections");
            Ok(Box::new(ScriptedBackend::new(Vec::new())))
        }
    }
}

fn spawn_camera(
    camera: CameraConfig,
    regions: RegionCatalog,
    detector: Box<dyn DetectorBackend>,
    services: Services,
    settings: PipelineSettings,
    cfg: &RegionWatchConfig,
    stop: &Arc<AtomicBool>,
) -> Result<std::thread::JoinHandle<()>> {
    let mut source = open_source(&camera)?;
    let frame_interval = cfg.tracking.frame_interval;
    let stop = stop.clone();
    let name = format!("camera-{}", camera.id);
    log::info!(
        "camera {} ('{}', {}): {} region(s), detector={}",
        camera.id,
        camera.name,
        camera.kind,
        regions.len(),
        detector.name()
    );
    let handle = std::thread::Builder::new().name(name).spawn(move || {
        let label = camera.name.clone();
        let mut pipeline = CameraPipeline::new(
            camera,
            regions,
            detector,
            Box::new(IouTracker::default()),
            services,
            settings,
        );
        match pipeline.run(source.as_mut(), frame_interval, &stop) {
            Ok(frames) => log::info!("camera {} stopped after {} frame(s)", label, frames),
            Err(e) => log::error!("camera {} failed: {:#}", label, e),
        }
    })?;
    Ok(handle)
}
