//! Persistent path→`CacheEntry` store (component B: the Cache Store).
//!
//! Wire format is postcard-encoded, zstd-compressed, written to a temp sibling
//! and renamed into place for atomicity — the same approach the teacher's index
//! cache uses for its own on-disk snapshot.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::entry::{plot_header_from_prover, CacheEntry};
use crate::prover::PlotHeader;

const CACHE_MAGIC: u32 = 0x504C_4F54; // "PLOT"
const CACHE_FORMAT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct CacheFileEntry {
    path: PathBuf,
    last_use_seconds: u64,
    header: PlotHeader,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    magic: u32,
    version: u16,
    entries: Vec<CacheFileEntry>,
}

/// Persistent key-value store keyed by absolute plot path. All mutations are
/// expected to happen while the manager's big lock is held; this type has no
/// internal locking of its own.
pub struct CacheStore {
    path: PathBuf,
    entries: HashMap<PathBuf, CacheEntry>,
    dirty: bool,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
            dirty: false,
        }
    }

    /// Reads from the configured cache file. Absence or corruption is tolerated
    /// by starting empty; the dirty bit is cleared either way.
    pub fn load(&mut self) {
        match self.try_load() {
            Ok(entries) => {
                log::debug!("cache loaded: {} entries", entries.len());
                self.entries = entries;
            }
            Err(err) => {
                log::warn!("cache load failed, starting empty: {}", err);
                self.entries = HashMap::new();
            }
        }
        self.dirty = false;
    }

    fn try_load(&self) -> io::Result<HashMap<PathBuf, CacheEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(HashMap::new());
            }
            Err(err) => return Err(err),
        };

        let decoder = zstd::Decoder::new(BufReader::new(file))?;
        let mut scratch = [0u8; 1024];
        let cache_file: CacheFile = postcard::from_io((decoder, &mut scratch))
            .map(|(value, _)| value)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        if cache_file.magic != CACHE_MAGIC || cache_file.version != CACHE_FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unknown cache file magic or version",
            ));
        }

        let mut entries = HashMap::with_capacity(cache_file.entries.len());
        for file_entry in cache_file.entries {
            let prover: Arc<crate::prover::PlotHeader> = Arc::new(file_entry.header);
            let entry = CacheEntry::from_prover(prover, file_entry.last_use_seconds);
            entries.insert(file_entry.path, entry);
        }
        Ok(entries)
    }

    /// Atomically persists the current map to disk and clears the dirty bit.
    pub fn save(&mut self) -> crate::error::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let cache_file = CacheFile {
            magic: CACHE_MAGIC,
            version: CACHE_FORMAT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(path, entry)| CacheFileEntry {
                    path: path.clone(),
                    last_use_seconds: entry.last_use_seconds,
                    header: plot_header_from_prover(entry.prover.as_ref()),
                })
                .collect(),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|err| crate::error::PlotManagerError::Cache(err.to_string()))?;
        {
            let threads = std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1);
            let mut encoder = zstd::Encoder::new(BufWriter::new(tmp.as_file_mut()), 6)
                .map_err(|err| crate::error::PlotManagerError::Cache(err.to_string()))?;
            encoder
                .multithread(threads)
                .map_err(|err| crate::error::PlotManagerError::Cache(err.to_string()))?;
            postcard::to_io(&cache_file, &mut encoder)
                .map_err(|err| crate::error::PlotManagerError::Cache(err.to_string()))?;
            let mut writer = encoder
                .finish()
                .map_err(|err| crate::error::PlotManagerError::Cache(err.to_string()))?;
            io::Write::flush(&mut writer)
                .map_err(|err| crate::error::PlotManagerError::Cache(err.to_string()))?;
        }
        tmp.persist(&self.path)
            .map_err(|err| crate::error::PlotManagerError::Cache(err.to_string()))?;

        self.dirty = false;
        log::debug!("cache saved: {} entries", self.entries.len());
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut CacheEntry> {
        self.entries.get_mut(path)
    }

    pub fn update(&mut self, path: PathBuf, entry: CacheEntry) {
        self.entries.insert(path, entry);
        self.dirty = true;
    }

    /// Bulk delete; sets the dirty bit only if a deletion actually happened.
    pub fn remove(&mut self, paths: &[PathBuf]) {
        let mut removed_any = false;
        for path in paths {
            if self.entries.remove(path).is_some() {
                removed_any = true;
            }
        }
        if removed_any {
            self.dirty = true;
        }
    }

    pub fn items(&self) -> impl Iterator<Item = (&PathBuf, &CacheEntry)> {
        self.entries.iter()
    }

    pub fn changed(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{FarmerPublicKey, PlotPublicKey};
    use crate::prover::PlotHeader;

    fn sample_entry(now: u64) -> CacheEntry {
        let header = PlotHeader::new(
            "/plots/a.plot".into(),
            32,
            FarmerPublicKey([7u8; 48]),
            None,
            None,
            PlotPublicKey([8u8; 48]),
        );
        CacheEntry::from_prover(Arc::new(header), now)
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CacheStore::new(dir.path().join("cache").join("plot_manager.dat"));
        store.load();
        assert_eq!(store.len(), 0);
        assert!(!store.changed());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("plot_manager.dat");
        fs::write(&cache_path, b"not a valid cache file").unwrap();
        let mut store = CacheStore::new(&cache_path);
        store.load();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache").join("plot_manager.dat");

        let mut store = CacheStore::new(&cache_path);
        store.update(PathBuf::from("/plots/a.plot"), sample_entry(1_000));
        store.save().unwrap();
        assert!(!store.changed());

        let mut reloaded = CacheStore::new(&cache_path);
        reloaded.load();
        assert_eq!(reloaded.len(), 1);
        let entry = reloaded.get(Path::new("/plots/a.plot")).unwrap();
        assert_eq!(entry.farmer_public_key, FarmerPublicKey([7u8; 48]));
        assert_eq!(entry.last_use_seconds, 1_000);
    }

    #[test]
    fn remove_sets_dirty_only_on_actual_removal() {
        let mut store = CacheStore::new("/tmp/unused_plot_manager.dat");
        store.update(PathBuf::from("/plots/a.plot"), sample_entry(1));
        store.dirty = false;
        store.remove(&[PathBuf::from("/plots/does-not-exist.plot")]);
        assert!(!store.changed());
        store.remove(&[PathBuf::from("/plots/a.plot")]);
        assert!(store.changed());
    }
}
