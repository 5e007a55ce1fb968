//! Candidate path enumeration (component C of the manager: the Path Enumerator).
//!
//! The list of directories to scan is itself sourced from a configuration file
//! this crate does not read (an external collaborator, see the crate's top-level
//! docs) — `PlotFilenameSource` is the seam that layer is plugged in through.
//! `FilesystemPlotSource` is the concrete, in-scope directory walker.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::Result;

/// One configured root: a directory to scan and whether to recurse into it.
#[derive(Debug, Clone)]
pub struct PlotDirectory {
    pub path: PathBuf,
    pub recursive: bool,
}

impl PlotDirectory {
    pub fn new(path: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            path: path.into(),
            recursive,
        }
    }
}

/// Yields candidate plot paths grouped by the configured directory that produced
/// them. Pure relative to the filesystem snapshot taken at call time.
pub trait PlotFilenameSource: Send + Sync {
    fn get_plot_filenames(&self) -> Result<Vec<(PathBuf, Vec<PathBuf>)>>;
}

/// Walks a fixed list of configured directories, following symlinks, skipping
/// (and logging) directories that do not exist. Matches on a fixed file
/// extension rather than attempting to sniff plot headers, since header
/// inspection belongs to the Prover Adapter, not the enumerator.
pub struct FilesystemPlotSource {
    directories: Vec<PlotDirectory>,
    extension: &'static str,
}

impl FilesystemPlotSource {
    pub fn new(directories: Vec<PlotDirectory>) -> Self {
        Self {
            directories,
            extension: "plot",
        }
    }

    fn walk_one(&self, dir: &PlotDirectory) -> Vec<PathBuf> {
        let mut found = Vec::new();
        walk_dir(&dir.path, dir.recursive, self.extension, &mut found);
        found
    }
}

impl PlotFilenameSource for FilesystemPlotSource {
    fn get_plot_filenames(&self) -> Result<Vec<(PathBuf, Vec<PathBuf>)>> {
        let results: Vec<(PathBuf, Vec<PathBuf>)> = self
            .directories
            .par_iter()
            .map(|dir| (dir.path.clone(), self.walk_one(dir)))
            .collect();
        Ok(results)
    }
}

fn walk_dir(dir: &Path, recursive: bool, extension: &str, found: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("skipping plot directory {}: {}", dir.display(), err);
            return;
        }
    };

    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        let is_dir = if file_type.is_symlink() {
            std::fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false)
        } else {
            file_type.is_dir()
        };

        if is_dir {
            if recursive {
                subdirs.push(path);
            }
            continue;
        }

        if path.extension().and_then(|ext| ext.to_str()) == Some(extension) {
            found.push(path);
        }
    }

    if !subdirs.is_empty() {
        let nested: Vec<Vec<PathBuf>> = subdirs
            .par_iter()
            .map(|sub| {
                let mut nested_found = Vec::new();
                walk_dir(sub, recursive, extension, &mut nested_found);
                nested_found
            })
            .collect();
        for batch in nested {
            found.extend(batch);
        }
    }
}
