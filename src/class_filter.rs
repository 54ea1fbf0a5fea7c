//! Classes-of-interest filter shared by every camera pipeline.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard};

/// Set of detector class ids to keep. The empty set means "count all classes".
///
/// Writes replace the whole set, so readers see either the old or the new
/// selection, never a mix.
#[derive(Debug, Default)]
pub struct ClassFilter {
    selected: RwLock<BTreeSet<u32>>,
}

impl ClassFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            selected: RwLock::new(ids.into_iter().collect()),
        }
    }

    pub fn set_selected(&self, ids: BTreeSet<u32>) {
        let count = ids.len();
        match self.selected.write() {
            Ok(mut guard) => *guard = ids,
            Err(poisoned) => *poisoned.into_inner() = ids,
        }
        if count == 0 {
            log::info!("class filter: counting all classes");
        } else {
            log::info!("class filter: counting {} selected class(es)", count);
        }
    }

    pub fn clear(&self) {
        self.set_selected(BTreeSet::new());
    }

    pub fn should_count(&self, class_id: u32) -> bool {
        let selected = self.read();
        selected.is_empty() || selected.contains(&class_id)
    }

    pub fn selected(&self) -> BTreeSet<u32> {
        self.read().clone()
    }

    pub fn is_count_all(&self) -> bool {
        self.read().is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeSet<u32>> {
        self.selected
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
