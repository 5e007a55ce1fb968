//! The cycle orchestrator (component F: the Refresh Loop). `run_cycle` performs
//! one end-to-end pass; `spawn` wraps it in the dedicated background thread the
//! manager facade starts and stops.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::batch::{process_batch, BatchContext};
use crate::config::RefreshParameter;
use crate::dedup::DeduplicationIndex;
use crate::events::{RefreshCallback, RefreshEvent, RefreshResult};
use crate::keys::{FarmerPublicKey, PoolPublicKey};
use crate::prover::ProverAdapter;
use crate::source::PlotFilenameSource;
use crate::state::BigState;

pub fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Everything the refresh loop needs to run a cycle, shared with the manager
/// facade via `Arc`. Cheap to clone (all fields are already reference-counted
/// or `Copy`).
#[derive(Clone)]
pub struct RefreshLoop {
    pub source: Arc<dyn PlotFilenameSource>,
    pub prover_adapter: Arc<dyn ProverAdapter>,
    pub big_state: Arc<Mutex<BigState>>,
    pub dedup_index: Arc<Mutex<DeduplicationIndex>>,
    pub farmer_public_keys: Arc<RwLock<Vec<FarmerPublicKey>>>,
    pub pool_public_keys: Arc<RwLock<Vec<PoolPublicKey>>>,
    pub match_str: Option<String>,
    pub open_no_key_filenames: bool,
    pub refresh_parameter: RefreshParameter,
    pub refreshing_enabled: Arc<AtomicBool>,
    pub last_refresh_time: Arc<AtomicU64>,
    pub callback: Arc<RwLock<RefreshCallback>>,
}

impl RefreshLoop {
    fn emit(&self, event: RefreshEvent, result: &RefreshResult) {
        let callback = self.callback.read();
        (*callback)(event, result);
    }

    pub fn needs_refresh(&self) -> bool {
        let last = self.last_refresh_time.load(Ordering::SeqCst);
        now_seconds().saturating_sub(last) > self.refresh_parameter.interval_seconds
    }

    /// Runs one full refresh cycle: enumerate, prune, reconcile, batch, report,
    /// sweep the cache. Never returns an error — any anomaly should be caught by
    /// the caller (see `spawn`) and turned into a `reset()`.
    pub fn run_cycle(&self) {
        let now = now_seconds();

        let directories = self.source.get_plot_filenames().unwrap_or_else(|err| {
            log::warn!("enumeration error, skipping this cycle: {}", err);
            Vec::new()
        });
        let candidate_paths: Vec<PathBuf> = directories.into_iter().flat_map(|(_, paths)| paths).collect();
        let candidate_set: HashSet<PathBuf> = candidate_paths.iter().cloned().collect();

        self.emit(
            RefreshEvent::Started,
            &RefreshResult::with_remaining(candidate_paths.len()),
        );

        let mut total_removed: Vec<PathBuf> = Vec::new();
        let mut total_loaded = Vec::new();
        let mut total_processed = 0usize;
        let mut total_duration = std::time::Duration::default();

        // Prune failed-open and no-key entries whose paths are no longer candidates.
        {
            let mut big_state = self.big_state.lock();
            big_state
                .failed_to_open
                .retain(|path, _| candidate_set.contains(path));
            big_state
                .no_key_filenames
                .retain(|path| candidate_set.contains(path));
        }

        // Reconcile dedup index and live plots against the current candidate set.
        {
            let mut big_state = self.big_state.lock();
            let mut dedup = self.dedup_index.lock();
            let removed = dedup.drop_missing(&candidate_set);
            for path in &removed {
                big_state.live_plots.remove(path);
            }
            total_removed.extend(removed);
        }

        // Re-check already-live plots against the current allow-lists. The
        // admission gate skips anything already in `live_plots`, so a key
        // rotation via `set_public_keys` would otherwise never be noticed for
        // a plot whose file never changes. Evicted paths are forgotten by the
        // dedup index too, so a later cycle can re-admit them once (or if)
        // their keys are allowed again.
        if !self.open_no_key_filenames {
            let mut big_state = self.big_state.lock();
            let mut dedup = self.dedup_index.lock();
            let farmer_keys = self.farmer_public_keys.read();
            let pool_keys = self.pool_public_keys.read();

            let mut to_evict = Vec::new();
            for path in big_state.live_plots.keys() {
                let entry = match big_state.cache.get(path) {
                    Some(entry) => entry,
                    None => continue,
                };
                let farmer_ok = farmer_keys.contains(&entry.farmer_public_key);
                let pool_ok = entry
                    .pool_public_key
                    .map_or(true, |key| pool_keys.contains(&key));
                if !farmer_ok || !pool_ok {
                    to_evict.push(path.clone());
                }
            }

            for path in to_evict {
                log::warn!(
                    "plot {} no longer has an allowed key, unloading",
                    path.display()
                );
                big_state.live_plots.remove(&path);
                big_state.no_key_filenames.insert(path.clone());
                dedup.forget(&path);
            }
        }

        let batch_size = self.refresh_parameter.batch_size.max(1);
        let mut remaining = candidate_paths.len();
        for batch in candidate_paths.chunks(batch_size) {
            if !self.refreshing_enabled.load(Ordering::SeqCst) {
                log::debug!("refresh loop aborted mid-batch");
                break;
            }

            let ctx = BatchContext {
                prover_adapter: self.prover_adapter.as_ref(),
                big_state: self.big_state.as_ref(),
                dedup_index: self.dedup_index.as_ref(),
                farmer_public_keys: self.farmer_public_keys.as_ref(),
                pool_public_keys: self.pool_public_keys.as_ref(),
                match_str: self.match_str.as_deref(),
                open_no_key_filenames: self.open_no_key_filenames,
                retry_invalid_seconds: self.refresh_parameter.retry_invalid_seconds,
                refreshing_enabled: self.refreshing_enabled.as_ref(),
                now_seconds: now,
            };

            let mut batch_result = process_batch(&ctx, batch);
            remaining = remaining.saturating_sub(batch.len());
            batch_result.remaining = remaining;

            total_loaded.extend(batch_result.loaded.iter().cloned());
            total_processed += batch_result.processed;
            total_duration += batch_result.duration;

            self.emit(RefreshEvent::BatchProcessed, &batch_result);

            if remaining == 0 {
                break;
            }
        }

        if self.refreshing_enabled.load(Ordering::SeqCst) {
            log::debug!(
                "run_cycle: total_result.loaded {}, removed {}, total_duration {:?}",
                total_loaded.len(),
                total_removed.len(),
                total_duration
            );
            self.emit(
                RefreshEvent::Done,
                &RefreshResult {
                    loaded: total_loaded,
                    removed: total_removed,
                    processed: total_processed,
                    remaining: 0,
                    duration: total_duration,
                },
            );
        }

        {
            let mut big_state = self.big_state.lock();
            big_state.initial = false;

            let expiry = self.refresh_parameter.expiry_seconds;
            let mut to_remove = Vec::new();
            let mut to_bump = Vec::new();
            for (path, entry) in big_state.cache.items() {
                let is_live = big_state.live_plots.contains_key(path);
                if entry.expired(expiry, now) && !is_live {
                    to_remove.push(path.clone());
                } else if is_live {
                    to_bump.push(path.clone());
                }
            }
            for path in &to_bump {
                if let Some(entry) = big_state.cache.get_mut(path) {
                    entry.bump_last_use(now);
                }
            }
            big_state.cache.remove(&to_remove);

            if big_state.cache.changed() {
                if let Err(err) = big_state.cache.save() {
                    log::error!("cache save failed: {}", err);
                }
            }
        }

        self.last_refresh_time.store(now, Ordering::SeqCst);
    }

    /// Spawns the dedicated loop thread. Runs until `refreshing_enabled` is
    /// cleared. Any panic inside a cycle is caught, logged, and turned into a
    /// full `reset()` so the manager never ends up in a partial state; the loop
    /// itself keeps running afterward.
    pub fn spawn(self: Arc<Self>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            while self.refreshing_enabled.load(Ordering::SeqCst) {
                while !self.needs_refresh() && self.refreshing_enabled.load(Ordering::SeqCst) {
                    std::thread::sleep(std::time::Duration::from_secs(1));
                }

                if !self.refreshing_enabled.load(Ordering::SeqCst) {
                    return;
                }

                let this = Arc::clone(&self);
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    this.run_cycle();
                }));

                if let Err(panic) = outcome {
                    log::error!("refresh cycle panicked: {:?}", panic_message(&panic));
                    self.big_state.lock().reset();
                    self.last_refresh_time.store(now_seconds(), Ordering::SeqCst);
                }
            }
        })
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
