//! The public API (component G: the Manager Facade).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::RefreshParameter;
use crate::dedup::DeduplicationIndex;
use crate::events::{RefreshCallback, RefreshEvent, RefreshResult};
use crate::keys::{FarmerPublicKey, PoolPublicKey};
use crate::prover::ProverAdapter;
use crate::refresh::{now_seconds, RefreshLoop};
use crate::source::PlotFilenameSource;
use crate::state::BigState;

fn noop_callback() -> RefreshCallback {
    Box::new(|_event: RefreshEvent, _result: &RefreshResult| {})
}

/// Owns every table in the data model and drives the refresh loop. Construct
/// with `new`, then call `start_refreshing` to begin background discovery.
pub struct PlotManager {
    big_state: Arc<Mutex<BigState>>,
    dedup_index: Arc<Mutex<DeduplicationIndex>>,
    farmer_public_keys: Arc<RwLock<Vec<FarmerPublicKey>>>,
    pool_public_keys: Arc<RwLock<Vec<PoolPublicKey>>>,
    callback: Arc<RwLock<RefreshCallback>>,
    refreshing_enabled: Arc<AtomicBool>,
    last_refresh_time: Arc<AtomicU64>,
    refresh_loop: Arc<RefreshLoop>,
    loop_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl PlotManager {
    pub fn new(
        root_path: &Path,
        source: Arc<dyn PlotFilenameSource>,
        prover_adapter: Arc<dyn ProverAdapter>,
        on_event: RefreshCallback,
        match_str: Option<String>,
        open_no_key_filenames: bool,
        refresh_parameter: RefreshParameter,
    ) -> Self {
        let cache_path = root_path.join("cache").join("plot_manager.dat");
        let big_state = Arc::new(Mutex::new(BigState::new(cache_path)));
        let dedup_index = Arc::new(Mutex::new(DeduplicationIndex::new()));
        let farmer_public_keys = Arc::new(RwLock::new(Vec::new()));
        let pool_public_keys = Arc::new(RwLock::new(Vec::new()));
        let callback = Arc::new(RwLock::new(on_event));
        let refreshing_enabled = Arc::new(AtomicBool::new(false));
        let last_refresh_time = Arc::new(AtomicU64::new(0));

        let refresh_loop = Arc::new(RefreshLoop {
            source,
            prover_adapter,
            big_state: Arc::clone(&big_state),
            dedup_index: Arc::clone(&dedup_index),
            farmer_public_keys: Arc::clone(&farmer_public_keys),
            pool_public_keys: Arc::clone(&pool_public_keys),
            match_str,
            open_no_key_filenames,
            refresh_parameter,
            refreshing_enabled: Arc::clone(&refreshing_enabled),
            last_refresh_time: Arc::clone(&last_refresh_time),
            callback: Arc::clone(&callback),
        });

        Self {
            big_state,
            dedup_index,
            farmer_public_keys,
            pool_public_keys,
            callback,
            refreshing_enabled,
            last_refresh_time,
            refresh_loop,
            loop_handle: Mutex::new(None),
        }
    }

    /// Convenience constructor using a no-op observer; callers typically
    /// provide a real `on_event` via `new`.
    pub fn with_defaults(
        root_path: &Path,
        source: Arc<dyn PlotFilenameSource>,
        prover_adapter: Arc<dyn ProverAdapter>,
    ) -> Self {
        Self::new(
            root_path,
            source,
            prover_adapter,
            noop_callback(),
            None,
            false,
            RefreshParameter::default(),
        )
    }

    pub fn set_public_keys(&self, farmer: Vec<FarmerPublicKey>, pool: Vec<PoolPublicKey>) {
        *self.farmer_public_keys.write() = farmer;
        *self.pool_public_keys.write() = pool;
    }

    pub fn set_refresh_callback(&self, callback: RefreshCallback) {
        *self.callback.write() = callback;
    }

    pub fn trigger_refresh(&self) {
        log::debug!("trigger_refresh");
        self.last_refresh_time.store(0, Ordering::SeqCst);
    }

    /// Enables refreshing and spawns the loop thread if it isn't already alive.
    /// Loads the cache first, synchronously, before the thread starts.
    pub fn start_refreshing(&self) {
        self.refreshing_enabled.store(true, Ordering::SeqCst);
        let mut handle = self.loop_handle.lock();
        if handle.as_ref().map(|h| h.is_finished()).unwrap_or(true) {
            self.big_state.lock().cache.load();
            *handle = Some(Arc::clone(&self.refresh_loop).spawn());
        }
    }

    /// Disables refreshing and joins the loop thread. After this returns, no
    /// observer callback fires until `start_refreshing` is called again.
    pub fn stop_refreshing(&self) {
        self.refreshing_enabled.store(false, Ordering::SeqCst);
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Clears every in-memory table and marks the next cycle as initial again.
    pub fn reset(&self) {
        self.big_state.lock().reset();
        self.dedup_index.lock().clear();
        self.last_refresh_time.store(now_seconds(), Ordering::SeqCst);
    }

    pub fn plot_count(&self) -> usize {
        self.big_state.lock().plot_count()
    }

    pub fn initial_refresh(&self) -> bool {
        self.big_state.lock().initial
    }

    pub fn public_keys_available(&self) -> bool {
        !self.farmer_public_keys.read().is_empty() && !self.pool_public_keys.read().is_empty()
    }

    pub fn needs_refresh(&self) -> bool {
        self.refresh_loop.needs_refresh()
    }

    pub fn get_duplicates(&self) -> Vec<PathBuf> {
        self.dedup_index.lock().list_duplicates()
    }

    /// Runs exactly one refresh cycle synchronously on the calling thread,
    /// without spawning the background loop. Intended for tests and for
    /// callers that want deterministic control over cycle timing.
    pub fn run_cycle_now(&self) {
        self.refreshing_enabled.store(true, Ordering::SeqCst);
        self.refresh_loop.run_cycle();
    }
}
