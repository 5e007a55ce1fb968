//! Per-basename primary/duplicate tracking (component D: the Deduplication
//! Index). Guarded by its own lock, separate from the manager's big lock, so
//! batch workers can register results in parallel without contending with big
//! lock readers. See the crate's concurrency notes for lock ordering.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Outcome of registering a path with the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Admitted,
    Duplicate,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    primary_parent: PathBuf,
    duplicate_parents: HashSet<PathBuf>,
}

/// Maps basename -> `(primary_parent_dir, duplicate_parent_dirs)`. The first
/// parent directory observed to host a basename during the index's lifetime is
/// primary; it never changes until the whole entry is dropped.
#[derive(Debug, Default)]
pub struct DeduplicationIndex {
    entries: HashMap<String, Entry>,
}

impl DeduplicationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &Path) -> Registration {
        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

        match self.entries.get_mut(&basename) {
            None => {
                self.entries.insert(
                    basename,
                    Entry {
                        primary_parent: parent,
                        duplicate_parents: HashSet::new(),
                    },
                );
                Registration::Admitted
            }
            Some(entry) => {
                if entry.primary_parent == parent || entry.duplicate_parents.contains(&parent) {
                    Registration::Duplicate
                } else {
                    entry.duplicate_parents.insert(parent);
                    Registration::Duplicate
                }
            }
        }
    }

    /// Returns true if `basename` is already known under a parent other than
    /// `parent` (used by the batch admission gate to pre-filter without
    /// mutating the index).
    pub fn is_known_under_other_parent(&self, basename: &str, parent: &Path) -> bool {
        match self.entries.get(basename) {
            Some(entry) => entry.primary_parent != parent && !entry.duplicate_parents.contains(parent),
            None => false,
        }
    }

    /// Forgets a single registered path so it can be freshly re-registered on a
    /// later cycle. If `path` is the primary for its basename, the whole entry
    /// is dropped (matching `drop_missing`'s "primary gone" rule); if it is a
    /// duplicate parent, only that parent is pruned. Used when a path is
    /// evicted from the live set for a reason other than disappearing from the
    /// filesystem (e.g. a key no longer on the allow-list), where `register`
    /// would otherwise keep reporting it as `Duplicate` of itself forever.
    pub fn forget(&mut self, path: &Path) {
        let basename = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return,
        };
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

        if let Some(entry) = self.entries.get_mut(&basename) {
            if entry.primary_parent == parent {
                self.entries.remove(&basename);
            } else {
                entry.duplicate_parents.remove(&parent);
            }
        }
    }

    /// Removes basenames whose primary path is no longer in `live_paths`, and
    /// prunes duplicate parents whose composed path is no longer present.
    /// Returns the full set of paths that were dropped, for the caller to fold
    /// into its `removed` accounting.
    pub fn drop_missing(&mut self, live_paths: &HashSet<PathBuf>) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        let mut basenames_to_remove = Vec::new();

        for (basename, entry) in self.entries.iter_mut() {
            let primary_path = entry.primary_parent.join(basename);
            if !live_paths.contains(&primary_path) {
                basenames_to_remove.push(basename.clone());
                removed.push(primary_path);
                continue;
            }

            let mut parents_to_drop = Vec::new();
            for parent in entry.duplicate_parents.iter() {
                let duplicate_path = parent.join(basename);
                if !live_paths.contains(&duplicate_path) {
                    parents_to_drop.push(parent.clone());
                    removed.push(duplicate_path);
                }
            }
            for parent in parents_to_drop {
                entry.duplicate_parents.remove(&parent);
            }
        }

        for basename in basenames_to_remove {
            self.entries.remove(&basename);
        }

        removed
    }

    /// `parent/basename` for every parent in every basename's duplicate set.
    pub fn list_duplicates(&self) -> Vec<PathBuf> {
        let mut result = Vec::new();
        for (basename, entry) in self.entries.iter() {
            for parent in entry.duplicate_parents.iter() {
                result.push(parent.join(basename));
            }
        }
        result
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_parent_wins() {
        let mut index = DeduplicationIndex::new();
        assert_eq!(
            index.register(Path::new("/d1/a.plot")),
            Registration::Admitted
        );
        assert_eq!(
            index.register(Path::new("/d2/a.plot")),
            Registration::Duplicate
        );
        // re-registering the primary again is still reported as duplicate of itself
        // (registration is idempotent admission, not re-assertion of primacy)
        assert_eq!(
            index.register(Path::new("/d1/a.plot")),
            Registration::Duplicate
        );
        assert_eq!(index.list_duplicates(), vec![PathBuf::from("/d2/a.plot")]);
    }

    #[test]
    fn forget_primary_allows_fresh_registration() {
        let mut index = DeduplicationIndex::new();
        index.register(Path::new("/d1/a.plot"));

        index.forget(Path::new("/d1/a.plot"));

        assert_eq!(
            index.register(Path::new("/d2/a.plot")),
            Registration::Admitted
        );
    }

    #[test]
    fn forget_duplicate_only_prunes_that_parent() {
        let mut index = DeduplicationIndex::new();
        index.register(Path::new("/d1/a.plot"));
        index.register(Path::new("/d2/a.plot"));

        index.forget(Path::new("/d2/a.plot"));

        assert!(index.list_duplicates().is_empty());
        assert_eq!(
            index.register(Path::new("/d1/a.plot")),
            Registration::Duplicate
        );
    }

    #[test]
    fn drop_missing_removes_whole_entry_when_primary_gone() {
        let mut index = DeduplicationIndex::new();
        index.register(Path::new("/d1/a.plot"));
        index.register(Path::new("/d2/a.plot"));

        let live: HashSet<PathBuf> = [PathBuf::from("/d2/a.plot")].into_iter().collect();
        let removed = index.drop_missing(&live);
        assert_eq!(removed, vec![PathBuf::from("/d1/a.plot")]);
        assert!(index.list_duplicates().is_empty());
    }

    #[test]
    fn drop_missing_prunes_only_absent_duplicates() {
        let mut index = DeduplicationIndex::new();
        index.register(Path::new("/d1/a.plot"));
        index.register(Path::new("/d2/a.plot"));
        index.register(Path::new("/d3/a.plot"));

        let live: HashSet<PathBuf> = [PathBuf::from("/d1/a.plot"), PathBuf::from("/d3/a.plot")]
            .into_iter()
            .collect();
        let removed = index.drop_missing(&live);
        assert_eq!(removed, vec![PathBuf::from("/d2/a.plot")]);
        assert_eq!(index.list_duplicates(), vec![PathBuf::from("/d3/a.plot")]);
    }
}
