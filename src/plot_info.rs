use std::sync::Arc;

use crate::keys::{PlotPublicKey, PoolContractPuzzleHash, PoolPublicKey};
use crate::prover::Prover;

/// Descriptor for one admitted live plot. Shares ownership of the `Prover` handle
/// with the cache entry it was built from (see `cache::entry::CacheEntry`); the
/// handle is released once both holders have dropped their reference.
#[derive(Clone)]
pub struct PlotInfo {
    pub prover: Arc<dyn Prover>,
    pub pool_public_key: Option<PoolPublicKey>,
    pub pool_contract_puzzle_hash: Option<PoolContractPuzzleHash>,
    pub plot_public_key: PlotPublicKey,
    pub file_size: u64,
    pub file_modified_seconds: i64,
}

impl PlotInfo {
    pub fn new(
        prover: Arc<dyn Prover>,
        pool_public_key: Option<PoolPublicKey>,
        pool_contract_puzzle_hash: Option<PoolContractPuzzleHash>,
        plot_public_key: PlotPublicKey,
        file_size: u64,
        file_modified_seconds: i64,
    ) -> Self {
        Self {
            prover,
            pool_public_key,
            pool_contract_puzzle_hash,
            plot_public_key,
            file_size,
            file_modified_seconds,
        }
    }
}
