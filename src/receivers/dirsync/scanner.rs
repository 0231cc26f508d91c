// SPDX-License-Identifier: Apache-2.0

use glob::{Pattern, glob};
use std::path::{Path, PathBuf};
use std::vec;

use tracing::{debug, warn};

use super::checkpoint::with_suffix;
use super::config::MarkerSuffixes;
use super::error::{Error, Result};

/// DirectoryScanner walks a directory tree in snapshot passes ("generations")
/// and yields the source files that still need reading.
///
/// Eligibility is decided once, when the snapshot is taken. Files created
/// during a generation are only seen once it is exhausted and the next
/// scan runs.
#[derive(Debug)]
pub struct DirectoryScanner {
    root: PathBuf,
    suffixes: MarkerSuffixes,
    generation: Option<vec::IntoIter<PathBuf>>,
}

impl DirectoryScanner {
    pub fn new(root: impl Into<PathBuf>, suffixes: MarkerSuffixes) -> Self {
        Self {
            root: root.into(),
            suffixes,
            generation: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take one snapshot of all eligible files under the root, in walk order.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/**/*",
            Pattern::escape(&self.root.to_string_lossy())
        );
        let matches = glob(&pattern).map_err(|e| Error::InvalidGlob(e.to_string()))?;

        let mut paths = Vec::new();
        for entry in matches {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = ?e.path(), error = %e.error(), "Skipping unreadable entry");
                    continue;
                }
            };

            if self.is_eligible(&path) {
                paths.push(path);
            }
        }

        debug!(root = ?self.root, count = paths.len(), "Scanned directory");
        Ok(paths)
    }

    /// Next path of the current generation. Once a generation is exhausted
    /// `None` is returned and the following call starts a fresh scan.
    pub fn next_path(&mut self) -> Result<Option<PathBuf>> {
        if self.generation.is_none() {
            self.generation = Some(self.scan()?.into_iter());
        }

        let next = self.generation.as_mut().and_then(|generation| generation.next());
        if next.is_none() {
            self.generation = None;
        }
        Ok(next)
    }

    fn is_eligible(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }

        let Some(name) = path.file_name() else {
            return false;
        };
        if self.suffixes.is_marker(&name.to_string_lossy()) {
            return false;
        }

        !with_suffix(path, &self.suffixes.finished).exists()
    }
}
