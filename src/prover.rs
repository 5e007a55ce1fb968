//! The file-format parser ("prover") is an external collaborator per the scope of
//! this crate: real plot files are opened by a proof-of-space implementation this
//! crate does not contain. `Prover` and `ProverAdapter` are the seam that
//! implementation is plugged in through; `HeaderFileProverAdapter` is a minimal,
//! self-contained stand-in so the crate is testable on its own.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::keys::{FarmerPublicKey, PlotPublicKey, PoolContractPuzzleHash, PoolPublicKey};

/// Filesystem metadata captured at open time, independent of the `Prover` itself
/// so it can be refreshed cheaply without reopening the file.
#[derive(Debug, Clone, Copy)]
pub struct PlotStat {
    pub size: u64,
    pub mtime_seconds: i64,
}

/// A stateful handle exposing a plot's header metadata. Only header access is
/// used here; proof queries are out of scope.
pub trait Prover: Send + Sync {
    fn size(&self) -> u32;
    fn filename(&self) -> &Path;
    fn farmer_public_key(&self) -> FarmerPublicKey;
    fn pool_public_key(&self) -> Option<PoolPublicKey>;
    fn pool_contract_puzzle_hash(&self) -> Option<PoolContractPuzzleHash>;
    fn plot_public_key(&self) -> PlotPublicKey;
}

/// Opens a plot file and returns its stat plus a live `Prover`, or fails. The
/// specific I/O or parse error is intentionally not exposed further than this
/// call: callers only record "failed at time T" (see `batch::process_file`).
pub trait ProverAdapter: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<(PlotStat, Arc<dyn Prover>)>;
}

/// Plain-old-data `Prover` implementation, also directly serializable so a cache
/// entry loaded from disk reconstructs a usable `Prover` without touching the
/// filesystem (see `cache::entry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotHeader {
    filename: PathBuf,
    size: u32,
    farmer_public_key: FarmerPublicKey,
    pool_public_key: Option<PoolPublicKey>,
    pool_contract_puzzle_hash: Option<PoolContractPuzzleHash>,
    plot_public_key: PlotPublicKey,
}

impl PlotHeader {
    pub fn new(
        filename: PathBuf,
        size: u32,
        farmer_public_key: FarmerPublicKey,
        pool_public_key: Option<PoolPublicKey>,
        pool_contract_puzzle_hash: Option<PoolContractPuzzleHash>,
        plot_public_key: PlotPublicKey,
    ) -> Self {
        Self {
            filename,
            size,
            farmer_public_key,
            pool_public_key,
            pool_contract_puzzle_hash,
            plot_public_key,
        }
    }
}

impl Prover for PlotHeader {
    fn size(&self) -> u32 {
        self.size
    }

    fn filename(&self) -> &Path {
        &self.filename
    }

    fn farmer_public_key(&self) -> FarmerPublicKey {
        self.farmer_public_key
    }

    fn pool_public_key(&self) -> Option<PoolPublicKey> {
        self.pool_public_key
    }

    fn pool_contract_puzzle_hash(&self) -> Option<PoolContractPuzzleHash> {
        self.pool_contract_puzzle_hash
    }

    fn plot_public_key(&self) -> PlotPublicKey {
        self.plot_public_key
    }
}

const HEADER_MAGIC: &[u8; 4] = b"PLOT";

/// Reads a small fixed-layout header from the start of the file: a magic tag, the
/// k-size, a farmer key, a plot key, and optional pool key / pool contract hash
/// each gated by a presence byte. This is a deliberately minimal stand-in for the
/// real proof-of-space header parser, which is out of scope for this crate.
#[derive(Debug, Default)]
pub struct HeaderFileProverAdapter;

impl HeaderFileProverAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProverAdapter for HeaderFileProverAdapter {
    fn open(&self, path: &Path) -> io::Result<(PlotStat, Arc<dyn Prover>)> {
        use io::Read;

        let metadata = fs::metadata(path)?;
        let mut file = fs::File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != HEADER_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad plot header magic"));
        }

        let mut size_buf = [0u8; 1];
        file.read_exact(&mut size_buf)?;
        let size = size_buf[0] as u32;

        let mut farmer_key = [0u8; 48];
        file.read_exact(&mut farmer_key)?;

        let mut plot_key = [0u8; 48];
        file.read_exact(&mut plot_key)?;

        let mut pool_present = [0u8; 1];
        file.read_exact(&mut pool_present)?;
        let pool_public_key = if pool_present[0] != 0 {
            let mut pool_key = [0u8; 48];
            file.read_exact(&mut pool_key)?;
            Some(PoolPublicKey(pool_key))
        } else {
            None
        };

        let mut contract_present = [0u8; 1];
        file.read_exact(&mut contract_present)?;
        let pool_contract_puzzle_hash = if contract_present[0] != 0 {
            let mut hash = [0u8; 32];
            file.read_exact(&mut hash)?;
            Some(PoolContractPuzzleHash(hash))
        } else {
            None
        };

        let stat = PlotStat {
            size: metadata.len(),
            mtime_seconds: mtime_seconds(&metadata),
        };

        let header = PlotHeader::new(
            path.to_path_buf(),
            size,
            FarmerPublicKey(farmer_key),
            pool_public_key,
            pool_contract_puzzle_hash,
            PlotPublicKey(plot_key),
        );

        Ok((stat, Arc::new(header)))
    }
}

fn mtime_seconds(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_header(
        file: &mut fs::File,
        size: u8,
        farmer: [u8; 48],
        plot: [u8; 48],
        pool: Option<[u8; 48]>,
        contract: Option<[u8; 32]>,
    ) {
        file.write_all(HEADER_MAGIC).unwrap();
        file.write_all(&[size]).unwrap();
        file.write_all(&farmer).unwrap();
        file.write_all(&plot).unwrap();
        match pool {
            Some(key) => {
                file.write_all(&[1]).unwrap();
                file.write_all(&key).unwrap();
            }
            None => file.write_all(&[0]).unwrap(),
        }
        match contract {
            Some(hash) => {
                file.write_all(&[1]).unwrap();
                file.write_all(&hash).unwrap();
            }
            None => file.write_all(&[0]).unwrap(),
        }
        // padding so the file is nontrivially sized
        file.write_all(&[0u8; 64]).unwrap();
    }

    #[test]
    fn opens_well_formed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.plot");
        let mut file = fs::File::create(&path).unwrap();
        write_header(&mut file, 32, [1u8; 48], [2u8; 48], Some([3u8; 48]), None);
        drop(file);

        let adapter = HeaderFileProverAdapter::new();
        let (stat, prover) = adapter.open(&path).unwrap();
        assert_eq!(prover.size(), 32);
        assert_eq!(prover.farmer_public_key(), FarmerPublicKey([1u8; 48]));
        assert_eq!(prover.pool_public_key(), Some(PoolPublicKey([3u8; 48])));
        assert!(prover.pool_contract_puzzle_hash().is_none());
        assert!(stat.size > 0);
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.plot");
        fs::write(&path, b"NOPE____________").unwrap();

        let adapter = HeaderFileProverAdapter::new();
        assert!(adapter.open(&path).is_err());
    }
}
