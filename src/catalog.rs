use tracing::{debug, info, warn};

use crate::level::{default_levels, Level};
use crate::store::{KeyValueStore, StoreError};

const LEVELS_KEY: &str = "levels";

/// Ordered set of levels plus the store they are persisted in.
///
/// Exactly one level is selected at any time, level indices are `0..N`,
/// availability never flips back to false and records never decrease.
#[derive(Debug)]
pub struct LevelCatalog<S: KeyValueStore> {
    levels: Vec<Level>,
    store: S,
}

impl<S: KeyValueStore> LevelCatalog<S> {
    /// Restore the catalog from `store`, or build the default one when there
    /// is nothing usable persisted.
    pub fn new(store: S) -> Self {
        let levels = match store.get::<Vec<Level>>(LEVELS_KEY) {
            Some(levels) if is_consistent(&levels) => {
                debug!(count = levels.len(), "Restored level catalog");
                levels
            }
            Some(_) => {
                warn!("Persisted level catalog is inconsistent, rebuilding defaults");
                default_levels()
            }
            None => default_levels(),
        };
        Self { levels, store }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    /// The selected level.
    ///
    /// # Panics
    ///
    /// When no level is selected; the catalog never reaches that state on its
    /// own.
    pub fn current_level(&self) -> &Level {
        self.levels
            .iter()
            .find(|level| level.is_selected)
            .expect("level catalog has no selected level")
    }

    pub fn next_level(&self) -> Option<&Level> {
        self.levels.get(self.current_level().index + 1)
    }

    pub fn last_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    /// Move the selection to `index`. Out-of-range indices leave the catalog
    /// untouched and return false.
    pub fn set_current_level(&mut self, index: usize) -> bool {
        if index >= self.levels.len() {
            debug!(index, "Ignoring selection of unknown level");
            return false;
        }
        for level in &mut self.levels {
            level.is_selected = level.index == index;
        }
        true
    }

    pub fn set_passed(&mut self, index: usize) {
        if let Some(level) = self.levels.get_mut(index) {
            level.is_passed = true;
        }
    }

    pub fn set_available(&mut self, index: usize) {
        if let Some(level) = self.levels.get_mut(index) {
            if !level.is_available {
                info!(serial = level.serial, "Level unlocked");
            }
            level.is_available = true;
        }
    }

    /// Raise the record of level `index` to `value`. Lower or equal values
    /// are ignored; returns whether the record changed.
    pub fn set_record(&mut self, index: usize, value: u32) -> bool {
        match self.levels.get_mut(index) {
            Some(level) if value > level.record => {
                level.record = value;
                true
            }
            _ => false,
        }
    }

    pub fn save(&mut self) -> Result<(), StoreError> {
        self.store.set(LEVELS_KEY, &self.levels)
    }

    /// Forget all progress and persist the default catalog.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.levels = default_levels();
        self.store.remove(LEVELS_KEY)?;
        self.save()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

fn is_consistent(levels: &[Level]) -> bool {
    !levels.is_empty()
        && levels
            .iter()
            .enumerate()
            .all(|(i, l)| l.index == i && l.serial == i + 1 && l.is_playable())
        && levels.iter().filter(|l| l.is_selected).count() == 1
}
