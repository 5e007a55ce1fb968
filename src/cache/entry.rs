use std::sync::Arc;

use crate::keys::{FarmerPublicKey, PlotPublicKey, PoolContractPuzzleHash, PoolPublicKey};
use crate::prover::{PlotHeader, Prover};

/// One cache entry, keyed externally by absolute path. Holds a `Prover` handle
/// that is "live" (backed by an open file descriptor) if it was just parsed this
/// cycle, or a plain `PlotHeader` if it was reconstructed from disk — either way
/// it satisfies the `Prover` trait, so callers don't need to care which.
#[derive(Clone)]
pub struct CacheEntry {
    pub prover: Arc<dyn Prover>,
    pub farmer_public_key: FarmerPublicKey,
    pub pool_public_key: Option<PoolPublicKey>,
    pub pool_contract_puzzle_hash: Option<PoolContractPuzzleHash>,
    pub plot_public_key: PlotPublicKey,
    pub last_use_seconds: u64,
}

impl CacheEntry {
    pub fn from_prover(prover: Arc<dyn Prover>, now_seconds: u64) -> Self {
        Self {
            farmer_public_key: prover.farmer_public_key(),
            pool_public_key: prover.pool_public_key(),
            pool_contract_puzzle_hash: prover.pool_contract_puzzle_hash(),
            plot_public_key: prover.plot_public_key(),
            prover,
            last_use_seconds: now_seconds,
        }
    }

    pub fn bump_last_use(&mut self, now_seconds: u64) {
        self.last_use_seconds = now_seconds;
    }

    pub fn expired(&self, expiry_seconds: u64, now_seconds: u64) -> bool {
        now_seconds.saturating_sub(self.last_use_seconds) > expiry_seconds
    }
}

pub fn plot_header_from_prover(prover: &dyn Prover) -> PlotHeader {
    PlotHeader::new(
        prover.filename().to_path_buf(),
        prover.size(),
        prover.farmer_public_key(),
        prover.pool_public_key(),
        prover.pool_contract_puzzle_hash(),
        prover.plot_public_key(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_uses_saturating_duration() {
        let header = PlotHeader::new(
            "/tmp/a.plot".into(),
            32,
            FarmerPublicKey([1u8; 48]),
            None,
            None,
            PlotPublicKey([2u8; 48]),
        );
        let entry = CacheEntry::from_prover(Arc::new(header), 100);
        assert!(!entry.expired(50, 120));
        assert!(entry.expired(10, 200));
        // now before last_use: never treat as expired
        assert!(!entry.expired(10, 50));
    }
}
