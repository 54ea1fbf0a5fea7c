//! Named polygonal regions and the per-camera region catalog.
//!
//! A track is "in" a region when the centroid of its box lies inside the
//! region polygon (edges included). When regions overlap, the first region in
//! catalog order wins.

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::geometry::{polygon_bounds, polygon_contains, BoundingBox, Point};
use crate::write_atomic;

/// Display color for overlays. Serialized as `{"r","g","b"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RegionColor {
    /// Random, reasonably bright color (each channel in 50..=255).
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            r: rng.gen_range(50..=255),
            g: rng.gen_range(50..=255),
            b: rng.gen_range(50..=255),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    name: String,
    #[serde(default)]
    points: Vec<Point>,
    #[serde(default = "RegionColor::random")]
    color: RegionColor,
}

impl Region {
    pub fn new(name: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            points,
            color: RegionColor::random(),
        }
    }

    pub fn with_color(mut self, color: RegionColor) -> Self {
        self.color = color;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn color(&self) -> RegionColor {
        self.color
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points;
    }

    /// Regions with fewer than three points never match.
    pub fn is_active(&self) -> bool {
        self.points.len() >= 3
    }

    pub fn contains_point(&self, point: Point) -> bool {
        polygon_contains(&self.points, point)
    }

    /// Centroid policy: the box is inside when its center is.
    pub fn contains_box(&self, bbox: &BoundingBox) -> bool {
        self.contains_point(bbox.centroid())
    }

    pub fn bounding_box(&self) -> BoundingBox {
        polygon_bounds(&self.points)
    }
}

/// Ordered set of uniquely named regions for one camera.
#[derive(Clone, Debug, Default)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl RegionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_regions(regions: Vec<Region>) -> Result<Self> {
        let mut catalog = Self::new();
        for region in regions {
            catalog.add(region)?;
        }
        Ok(catalog)
    }

    pub fn add(&mut self, region: Region) -> Result<()> {
        if region.name.trim().is_empty() {
            return Err(anyhow!("region name must not be empty"));
        }
        if self.get(&region.name).is_some() {
            return Err(anyhow!("region '{}' already exists", region.name));
        }
        self.regions.push(region);
        Ok(())
    }

    /// Remove a region by name. Returns false when no such region exists.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.regions.len();
        self.regions.retain(|r| r.name != name);
        self.regions.len() != before
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if new.trim().is_empty() {
            return Err(anyhow!("region name must not be empty"));
        }
        if old != new && self.get(new).is_some() {
            return Err(anyhow!("region '{}' already exists", new));
        }
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.name == old)
            .ok_or_else(|| anyhow!("region '{}' not found", old))?;
        region.name = new.to_string();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// First region in definition order whose polygon holds the box centroid.
    pub fn first_containing(&self, bbox: &BoundingBox) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains_box(bbox))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

// -------------------- Regions companion file --------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegionsFile {
    #[serde(default)]
    regions: Vec<CameraRegionsEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraRegionsEntry {
    camera_id: u32,
    #[serde(default)]
    regions: Vec<Region>,
}

/// `cameras.json` -> `cameras_regions.json`.
pub fn companion_regions_path(camera_config: &Path) -> PathBuf {
    let stem = camera_config
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match camera_config.extension() {
        Some(ext) => format!("{}_regions.{}", stem, ext.to_string_lossy()),
        None => format!("{}_regions.json", stem),
    };
    camera_config.with_file_name(file_name)
}

pub fn save_regions(path: &Path, catalogs: &BTreeMap<u32, RegionCatalog>) -> Result<()> {
    let file = RegionsFile {
        regions: catalogs
            .iter()
            .map(|(camera_id, catalog)| CameraRegionsEntry {
                camera_id: *camera_id,
                regions: catalog.regions.clone(),
            })
            .collect(),
    };
    let json = serde_json::to_vec_pretty(&file)?;
    write_atomic(path, &json).with_context(|| format!("write regions file {}", path.display()))
}

/// Load per-camera catalogs. Duplicate region names within one camera keep the
/// first definition.
pub fn load_regions(path: &Path) -> Result<BTreeMap<u32, RegionCatalog>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read regions file {}", path.display()))?;
    let file: RegionsFile = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid regions file {}: {}", path.display(), e))?;

    let mut out = BTreeMap::new();
    for entry in file.regions {
        let catalog: &mut RegionCatalog = out.entry(entry.camera_id).or_default();
        for region in entry.regions {
            let name = region.name.clone();
            if let Err(e) = catalog.add(region) {
                log::warn!(
                    "camera {}: skipping region '{}': {}",
                    entry.camera_id,
                    name,
                    e
                );
            }
        }
    }
    Ok(out)
}
