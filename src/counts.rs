//! Durable unique-object counters per region.
//!
//! A region's count is the number of distinct track ids that ever entered it.
//! Counts only grow during normal operation; they shrink only on an explicit
//! clear. Snapshot writes never happen while the state lock is held.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{lock, write_atomic};

/// One region's entry in the snapshot file: `{"count": n, "ids": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCount {
    pub count: usize,
    pub ids: Vec<u64>,
}

#[derive(Debug, Default)]
pub struct RegionCountStore {
    regions: Mutex<BTreeMap<String, BTreeSet<u64>>>,
    auto_save: Mutex<Option<PathBuf>>,
    // Serializes snapshot writers so an older snapshot never lands last.
    save_lock: Mutex<()>,
}

impl RegionCountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save after every mutation to `path`, or disable with `None`.
    pub fn set_auto_save(&self, path: Option<PathBuf>) {
        *lock(&self.auto_save) = path;
    }

    /// Record that `track_id` entered `region`. Returns true only the first
    /// time this (region, track) pair is seen.
    pub fn record_entry(&self, region: &str, track_id: u64) -> bool {
        let inserted = {
            let mut regions = lock(&self.regions);
            regions
                .entry(region.to_string())
                .or_default()
                .insert(track_id)
        };
        if inserted {
            self.auto_save_now();
        }
        inserted
    }

    pub fn get_count(&self, region: &str) -> usize {
        lock(&self.regions).get(region).map_or(0, |ids| ids.len())
    }

    pub fn get_ids(&self, region: &str) -> BTreeSet<u64> {
        lock(&self.regions).get(region).cloned().unwrap_or_default()
    }

    pub fn get_all(&self) -> BTreeMap<String, RegionCount> {
        snapshot(&lock(&self.regions))
    }

    pub fn region_names(&self) -> Vec<String> {
        lock(&self.regions).keys().cloned().collect()
    }

    /// Returns false when the region had no counter.
    pub fn clear_region(&self, region: &str) -> bool {
        let removed = lock(&self.regions).remove(region).is_some();
        if removed {
            self.auto_save_now();
        }
        removed
    }

    pub fn clear_all(&self) {
        lock(&self.regions).clear();
        self.auto_save_now();
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let _writer = lock(&self.save_lock);
        let data = snapshot(&lock(&self.regions));
        let json = serde_json::to_vec_pretty(&data)?;
        write_atomic(path, &json)
            .with_context(|| format!("write region counts {}", path.display()))
    }

    /// Replace the in-memory state with the snapshot at `path`. Returns the
    /// number of regions loaded.
    pub fn load_from_file(&self, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read region counts {}", path.display()))?;
        let data: BTreeMap<String, RegionCount> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid region counts {}: {}", path.display(), e))?;

        let mut loaded = BTreeMap::new();
        for (region, entry) in data {
            let ids: BTreeSet<u64> = entry.ids.into_iter().collect();
            if ids.len() != entry.count {
                log::warn!(
                    "region '{}': stored count {} disagrees with {} ids, using ids",
                    region,
                    entry.count,
                    ids.len()
                );
            }
            loaded.insert(region, ids);
        }
        let count = loaded.len();
        *lock(&self.regions) = loaded;
        Ok(count)
    }

    fn auto_save_now(&self) {
        let path = lock(&self.auto_save).clone();
        if let Some(path) = path {
            if let Err(e) = self.save_to_file(&path) {
                log::error!("region counts auto-save failed: {:#}", e);
            }
        }
    }
}

fn snapshot(regions: &BTreeMap<String, BTreeSet<u64>>) -> BTreeMap<String, RegionCount> {
    regions
        .iter()
        .map(|(name, ids)| {
            (
                name.clone(),
                RegionCount {
                    count: ids.len(),
                    ids: ids.iter().copied().collect(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn record_entry_is_idempotent_per_pair() {
        let store = RegionCountStore::new();
        assert!(store.record_entry("door", 1));
        assert_eq!(store.get_count("door"), 1);
        assert!(!store.record_entry("door", 1));
        assert_eq!(store.get_count("door"), 1);
        assert!(store.record_entry("lot", 1));
        assert_eq!(store.get_count("lot"), 1);
        assert_eq!(store.get_count("nowhere"), 0);
        assert!(store.get_ids("nowhere").is_empty());
    }

    #[test]
    fn count_always_matches_ids() {
        let store = Arc::new(RegionCountStore::new());
        let handles: Vec<_> = (0..4u64)
            .map(|cam| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for id in 0..250u64 {
                        store.record_entry(if id % 2 == 0 { "a" } else { "b" }, id + cam % 2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for (region, entry) in store.get_all() {
            assert_eq!(entry.count, entry.ids.len());
            assert_eq!(entry.count, store.get_ids(&region).len());
        }
    }

    #[test]
    fn clear_region_and_all() {
        let store = RegionCountStore::new();
        store.record_entry("a", 1);
        store.record_entry("b", 2);
        assert!(store.clear_region("a"));
        assert!(!store.clear_region("a"));
        assert_eq!(store.get_count("b"), 1);
        store.clear_all();
        assert!(store.get_all().is_empty());
        // Cleared ids count again.
        assert!(store.record_entry("b", 2));
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region_count.json");
        let store = RegionCountStore::new();
        store.record_entry("Front Door", 3);
        store.record_entry("Front Door", 1);
        store.record_entry("Lot", 7);
        store.save_to_file(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["Front Door"]["count"], 2);
        assert_eq!(raw["Front Door"]["ids"], serde_json::json!([1, 3]));

        let fresh = RegionCountStore::new();
        fresh.record_entry("stale", 99);
        assert_eq!(fresh.load_from_file(&path).unwrap(), 2);
        assert_eq!(fresh.get_all(), store.get_all());
    }

    #[test]
    fn auto_save_writes_on_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.json");
        let store = RegionCountStore::new();
        store.set_auto_save(Some(path.clone()));
        store.record_entry("gate", 5);

        let reloaded = RegionCountStore::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get_count("gate"), 1);

        store.clear_region("gate");
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get_count("gate"), 0);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = RegionCountStore::new();
        store.record_entry("keep", 1);
        assert!(store.load_from_file(&path).is_err());
        assert_eq!(store.get_count("keep"), 1);
    }
}
