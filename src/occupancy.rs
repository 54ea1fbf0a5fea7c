//! Per-track region occupancy state machine for one camera.
//!
//! OUTSIDE (no state) -> INSIDE (state present) -> OUTSIDE, with:
//! - `FirstEntry` on entering a region,
//! - `Periodic` every `periodic_interval` frames while staying inside it,
//! - `Exit` (named after the previous region) on leaving it.
//!
//! Moving straight from region A to region B is an exit from A followed by an
//! entry into B within the same frame.
//!
//! Every transition goes through a capture callback. A transition is committed
//! only when the capture succeeds, so a failed entry is retried on the next
//! frame and a failed periodic capture keeps the old capture frame. Exits
//! always delete the state.
//!
//! A track the tracker stops reporting is closed with `vacate`, which exits
//! it from the region it was last inside.

use std::collections::HashMap;

use crate::EventKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackRegionState {
    pub region_name: String,
    pub entry_frame: u64,
    pub last_capture_frame: u64,
}

#[derive(Debug)]
pub struct RegionOccupancyEngine {
    periodic_interval: u64,
    states: HashMap<u64, TrackRegionState>,
}

impl RegionOccupancyEngine {
    pub fn new(periodic_interval: u64) -> Self {
        Self {
            periodic_interval: periodic_interval.max(1),
            states: HashMap::new(),
        }
    }

    pub fn periodic_interval(&self) -> u64 {
        self.periodic_interval
    }

    /// Advance the state of `track_id` for `frame`, given the region its box
    /// currently falls in (first match in catalog order).
    ///
    /// `capture(kind, region)` produces the evidence for a transition and
    /// returns whether it succeeded. Returns the committed transitions in
    /// emission order.
    pub fn observe<F>(
        &mut self,
        frame: u64,
        track_id: u64,
        region: Option<&str>,
        mut capture: F,
    ) -> Vec<(EventKind, String)>
    where
        F: FnMut(EventKind, &str) -> bool,
    {
        let mut emitted = Vec::new();

        let left = match self.states.get(&track_id) {
            Some(state) => region != Some(state.region_name.as_str()),
            None => false,
        };
        if left {
            if let Some(state) = self.states.remove(&track_id) {
                if capture(EventKind::Exit, &state.region_name) {
                    emitted.push((EventKind::Exit, state.region_name));
                } else {
                    log::debug!(
                        "track {}: exit capture from '{}' failed, state dropped",
                        track_id,
                        state.region_name
                    );
                }
            }
        }

        let Some(region) = region else {
            return emitted;
        };

        match self.states.get_mut(&track_id) {
            None => {
                if capture(EventKind::FirstEntry, region) {
                    self.states.insert(
                        track_id,
                        TrackRegionState {
                            region_name: region.to_string(),
                            entry_frame: frame,
                            last_capture_frame: frame,
                        },
                    );
                    emitted.push((EventKind::FirstEntry, region.to_string()));
                }
            }
            Some(state) => {
                if frame.saturating_sub(state.last_capture_frame) >= self.periodic_interval
                    && capture(EventKind::Periodic, region)
                {
                    state.last_capture_frame = frame;
                    emitted.push((EventKind::Periodic, region.to_string()));
                }
            }
        }
        emitted
    }

    pub fn state(&self, track_id: u64) -> Option<&TrackRegionState> {
        self.states.get(&track_id)
    }

    /// Close out a track the tracker no longer reports. If it was inside a
    /// region, `capture(Exit, region)` runs and the exit is returned when it
    /// succeeds. The state is dropped either way.
    pub fn vacate<F>(&mut self, track_id: u64, mut capture: F) -> Option<(EventKind, String)>
    where
        F: FnMut(EventKind, &str) -> bool,
    {
        let state = self.states.remove(&track_id)?;
        if capture(EventKind::Exit, &state.region_name) {
            Some((EventKind::Exit, state.region_name))
        } else {
            log::debug!(
                "track {}: exit capture from '{}' failed on eviction",
                track_id,
                state.region_name
            );
            None
        }
    }

    pub fn tracked_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.states.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
