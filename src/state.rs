//! The tables guarded by the manager's "big lock": live plots, the failed-open
//! table, the no-key set, and the cache store, plus the `_initial` flag. Bundled
//! into one struct so a single `parking_lot::Mutex` serializes all of them, per
//! the crate's concurrency model — none of these is ever mutated while a Prover
//! is being opened or the cache is being saved.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::cache::CacheStore;
use crate::plot_info::PlotInfo;

pub struct BigState {
    pub live_plots: HashMap<PathBuf, PlotInfo>,
    pub failed_to_open: HashMap<PathBuf, u64>,
    pub no_key_filenames: HashSet<PathBuf>,
    pub cache: CacheStore,
    pub initial: bool,
}

impl BigState {
    pub fn new(cache_path: PathBuf) -> Self {
        Self {
            live_plots: HashMap::new(),
            failed_to_open: HashMap::new(),
            no_key_filenames: HashSet::new(),
            cache: CacheStore::new(cache_path),
            initial: true,
        }
    }

    /// Clears every table and marks the next cycle as initial again. Used by
    /// both the public `reset()` operation and the loop's exception handler.
    pub fn reset(&mut self) {
        self.live_plots.clear();
        self.failed_to_open.clear();
        self.no_key_filenames.clear();
        self.initial = true;
    }

    pub fn plot_count(&self) -> usize {
        self.live_plots.len()
    }
}
