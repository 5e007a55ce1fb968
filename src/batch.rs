//! Per-batch admission fanout (component E: the Batch Processor).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use crate::cache::entry::CacheEntry;
use crate::dedup::{DeduplicationIndex, Registration};
use crate::events::RefreshResult;
use crate::keys::{FarmerPublicKey, PoolPublicKey};
use crate::plot_info::PlotInfo;
use crate::prover::ProverAdapter;
use crate::state::BigState;

/// `expected_plot_size(k) * UI_ACTUAL_SPACE_CONSTANT_FACTOR` is compared against
/// the file's actual size to detect a plot that is still being copied. The
/// constant factor accounts for on-disk table compression overhead relative to
/// the theoretical minimum size for a given k.
pub const UI_ACTUAL_SPACE_CONSTANT_FACTOR: f64 = 0.762;

/// Approximates the expected byte size of a plot of the given k-size.
pub fn expected_plot_size(k: u32) -> f64 {
    (2.0 * k as f64 + 1.0) * 2f64.powi(k as i32 - 1)
}

/// Collaborators a batch needs, bundled so `process_batch` doesn't take a dozen
/// parameters. Borrowed for the duration of one batch; never stored.
pub struct BatchContext<'a> {
    pub prover_adapter: &'a dyn ProverAdapter,
    pub big_state: &'a Mutex<BigState>,
    pub dedup_index: &'a Mutex<DeduplicationIndex>,
    pub farmer_public_keys: &'a RwLock<Vec<FarmerPublicKey>>,
    pub pool_public_keys: &'a RwLock<Vec<PoolPublicKey>>,
    pub match_str: Option<&'a str>,
    pub open_no_key_filenames: bool,
    pub retry_invalid_seconds: u64,
    pub refreshing_enabled: &'a AtomicBool,
    pub now_seconds: u64,
}

/// The admission gate (step 1 of the batch processor): cheap checks that avoid
/// spending a worker slot on paths we already know should be skipped.
fn processing_required(ctx: &BatchContext<'_>, path: &Path) -> bool {
    if !ctx.refreshing_enabled.load(Ordering::SeqCst) {
        return false;
    }

    if let Some(match_str) = ctx.match_str {
        if !path.to_string_lossy().contains(match_str) {
            return false;
        }
    }

    {
        let state = ctx.big_state.lock();
        if let Some(&failed_at) = state.failed_to_open.get(path) {
            if ctx.now_seconds.saturating_sub(failed_at) < ctx.retry_invalid_seconds {
                return false;
            }
        }
        if state.live_plots.contains_key(path) {
            return false;
        }
    }

    let basename = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let parent = path.parent();
    if let (Some(basename), Some(parent)) = (basename, parent) {
        let dedup = ctx.dedup_index.lock();
        if dedup.is_known_under_other_parent(&basename, parent) {
            log::debug!("skip duplicated plot {}", path.display());
            return false;
        }
    }

    true
}

/// Opens, validates, and admits a single candidate path. Never returns an
/// error: any failure is recorded in the failed-open table and `None` is
/// returned, per the crate's error handling policy.
fn process_file(ctx: &BatchContext<'_>, path: &Path) -> Option<PlotInfo> {
    let (stat, prover) = match ctx.prover_adapter.open(path) {
        Ok(opened) => opened,
        Err(err) => {
            log::warn!("failed to open plot {}: {}", path.display(), err);
            ctx.big_state
                .lock()
                .failed_to_open
                .insert(path.to_path_buf(), ctx.now_seconds);
            return None;
        }
    };

    let k = prover.size();
    let expected_size = expected_plot_size(k) * UI_ACTUAL_SPACE_CONSTANT_FACTOR;
    if k >= 30 && (stat.size as f64) < 0.98 * expected_size {
        log::warn!(
            "not farming plot {}: size is {} bytes, expected at least {:.0} bytes; assuming still being copied",
            path.display(),
            stat.size,
            expected_size
        );
        return None;
    }

    let mut big_state = ctx.big_state.lock();

    // The freshly opened `prover` above is only used to learn the keys on a
    // cache miss; the handle actually attached to the descriptor is always the
    // one owned by the cache entry, so a hit reuses the same long-lived handle
    // across cycles instead of discarding it for the one just opened.
    let cache_hit = big_state.cache.get(path).is_some();
    if !cache_hit {
        let entry = CacheEntry::from_prover(Arc::clone(&prover), ctx.now_seconds);
        big_state.cache.update(path.to_path_buf(), entry);
    }

    let (farmer_public_key, pool_public_key, pool_contract_puzzle_hash, plot_public_key, cached_prover) = {
        let entry = big_state.cache.get(path).expect("just inserted or present");
        (
            entry.farmer_public_key,
            entry.pool_public_key,
            entry.pool_contract_puzzle_hash,
            entry.plot_public_key,
            Arc::clone(&entry.prover),
        )
    };

    if !ctx.farmer_public_keys.read().contains(&farmer_public_key) {
        log::warn!("plot {} has a farmer public key not in the allow-list", path.display());
        big_state.no_key_filenames.insert(path.to_path_buf());
        if !ctx.open_no_key_filenames {
            return None;
        }
    }

    if let Some(pool_key) = pool_public_key {
        if !ctx.pool_public_keys.read().contains(&pool_key) {
            log::warn!("plot {} has a pool public key not in the allow-list", path.display());
            big_state.no_key_filenames.insert(path.to_path_buf());
            if !ctx.open_no_key_filenames {
                return None;
            }
        }
    }

    big_state.no_key_filenames.remove(path);

    let registration = {
        let mut dedup = ctx.dedup_index.lock();
        dedup.register(path)
    };
    if registration == Registration::Duplicate {
        log::warn!("have multiple copies of plot basename for {}", path.display());
        return None;
    }

    if let Some(entry) = big_state.cache.get_mut(path) {
        entry.bump_last_use(ctx.now_seconds);
    }
    big_state.failed_to_open.remove(path);

    log::info!("found plot {} of size {}, cache_hit: {}", path.display(), k, cache_hit);

    Some(PlotInfo::new(
        cached_prover,
        pool_public_key,
        pool_contract_puzzle_hash,
        plot_public_key,
        stat.size,
        stat.mtime_seconds,
    ))
}

/// Fans a batch of candidate paths out to a bounded worker pool, merges the
/// admitted descriptors into the live plots map under the big lock, and
/// returns the per-batch result.
pub fn process_batch(ctx: &BatchContext<'_>, paths: &[PathBuf]) -> RefreshResult {
    let start = Instant::now();
    let processed = paths.len();

    let to_process: Vec<&PathBuf> = paths
        .iter()
        .filter(|path| processing_required(ctx, path))
        .collect();

    let loaded: Vec<PlotInfo> = to_process
        .par_iter()
        .filter_map(|path| process_file(ctx, path))
        .collect();

    {
        let mut big_state = ctx.big_state.lock();
        for plot in &loaded {
            big_state.live_plots.insert(plot.prover.filename().to_path_buf(), plot.clone());
        }
    }

    let duration = start.elapsed();
    log::debug!(
        "process_batch: loaded {}, processed {}, duration {:?}",
        loaded.len(),
        processed,
        duration
    );

    RefreshResult {
        loaded,
        removed: Vec::new(),
        processed,
        remaining: 0,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PlotPublicKey;
    use crate::prover::{PlotStat, Prover};
    use std::io;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct FixedProver {
        filename: PathBuf,
        size: u32,
        farmer: FarmerPublicKey,
        pool: Option<PoolPublicKey>,
        plot: PlotPublicKey,
    }

    impl Prover for FixedProver {
        fn size(&self) -> u32 {
            self.size
        }
        fn filename(&self) -> &Path {
            &self.filename
        }
        fn farmer_public_key(&self) -> FarmerPublicKey {
            self.farmer
        }
        fn pool_public_key(&self) -> Option<PoolPublicKey> {
            self.pool
        }
        fn pool_contract_puzzle_hash(&self) -> Option<crate::keys::PoolContractPuzzleHash> {
            None
        }
        fn plot_public_key(&self) -> PlotPublicKey {
            self.plot
        }
    }

    struct FixedAdapter {
        size_bytes: u64,
        k: u32,
        farmer: FarmerPublicKey,
    }

    impl ProverAdapter for FixedAdapter {
        fn open(&self, path: &Path) -> io::Result<(PlotStat, Arc<dyn Prover>)> {
            Ok((
                PlotStat {
                    size: self.size_bytes,
                    mtime_seconds: 0,
                },
                Arc::new(FixedProver {
                    filename: path.to_path_buf(),
                    size: self.k,
                    farmer: self.farmer,
                    pool: None,
                    plot: PlotPublicKey([9u8; 48]),
                }),
            ))
        }
    }

    fn harness(
        k: u32,
        size_bytes: u64,
        farmer: FarmerPublicKey,
        allowed_farmer: FarmerPublicKey,
    ) -> (Mutex<BigState>, Mutex<DeduplicationIndex>, RwLock<Vec<FarmerPublicKey>>, RwLock<Vec<PoolPublicKey>>, FixedAdapter, AtomicBool) {
        let dir = tempfile::tempdir().unwrap();
        (
            Mutex::new(BigState::new(dir.path().join("cache.dat"))),
            Mutex::new(DeduplicationIndex::new()),
            RwLock::new(vec![allowed_farmer]),
            RwLock::new(vec![]),
            FixedAdapter {
                size_bytes,
                k,
                farmer,
            },
            AtomicBool::new(true),
        )
    }

    #[test]
    fn admits_well_sized_known_key_plot() {
        let farmer = FarmerPublicKey([1u8; 48]);
        let (big_state, dedup, farmer_keys, pool_keys, adapter, enabled) =
            harness(32, (expected_plot_size(32) * UI_ACTUAL_SPACE_CONSTANT_FACTOR) as u64 + 1024, farmer, farmer);

        let ctx = BatchContext {
            prover_adapter: &adapter,
            big_state: &big_state,
            dedup_index: &dedup,
            farmer_public_keys: &farmer_keys,
            pool_public_keys: &pool_keys,
            match_str: None,
            open_no_key_filenames: false,
            retry_invalid_seconds: 1200,
            refreshing_enabled: &enabled,
            now_seconds: 1_000,
        };

        let result = process_batch(&ctx, &[PathBuf::from("/plots/a.plot")]);
        assert_eq!(result.loaded.len(), 1);
        assert_eq!(big_state.lock().live_plots.len(), 1);
    }

    #[test]
    fn rejects_still_copying_plot() {
        let farmer = FarmerPublicKey([1u8; 48]);
        let (big_state, dedup, farmer_keys, pool_keys, adapter, enabled) =
            harness(32, 1024, farmer, farmer);

        let ctx = BatchContext {
            prover_adapter: &adapter,
            big_state: &big_state,
            dedup_index: &dedup,
            farmer_public_keys: &farmer_keys,
            pool_public_keys: &pool_keys,
            match_str: None,
            open_no_key_filenames: false,
            retry_invalid_seconds: 1200,
            refreshing_enabled: &enabled,
            now_seconds: 1_000,
        };

        let result = process_batch(&ctx, &[PathBuf::from("/plots/b.plot")]);
        assert!(result.loaded.is_empty());
        assert!(big_state.lock().failed_to_open.is_empty());
    }

    #[test]
    fn unknown_key_goes_to_no_key_set_and_is_skipped() {
        let farmer = FarmerPublicKey([1u8; 48]);
        let other = FarmerPublicKey([2u8; 48]);
        let (big_state, dedup, farmer_keys, pool_keys, adapter, enabled) =
            harness(32, (expected_plot_size(32) * UI_ACTUAL_SPACE_CONSTANT_FACTOR) as u64 + 1024, farmer, other);

        let ctx = BatchContext {
            prover_adapter: &adapter,
            big_state: &big_state,
            dedup_index: &dedup,
            farmer_public_keys: &farmer_keys,
            pool_public_keys: &pool_keys,
            match_str: None,
            open_no_key_filenames: false,
            retry_invalid_seconds: 1200,
            refreshing_enabled: &enabled,
            now_seconds: 1_000,
        };

        let result = process_batch(&ctx, &[PathBuf::from("/plots/c.plot")]);
        assert!(result.loaded.is_empty());
        assert!(big_state.lock().no_key_filenames.contains(Path::new("/plots/c.plot")));
    }
}
