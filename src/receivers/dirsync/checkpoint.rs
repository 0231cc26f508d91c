// SPDX-License-Identifier: Apache-2.0

//! Checkpoint and finished-marker files.
//!
//! Each source file `<path>` owns a checkpoint file `<path><stats suffix>`
//! holding the committed byte offset as a single decimal line. Once the
//! source is fully drained the checkpoint is renamed to
//! `<path><finished suffix>`, after which the source is never read again.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::config::MarkerSuffixes;
use super::error::Result;

/// Append `suffix` to the full file name of `path`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Bookkeeping paths that belong to one source file
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    pub stats: PathBuf,
    pub finished: PathBuf,
    stats_suffix: String,
}

/// What the bookkeeping files say about a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// A finished marker exists
    Finished,
    /// Resume from a committed offset
    Resume(u64),
    /// No checkpoint yet, start from the beginning
    Fresh,
    /// The checkpoint exists but does not hold an offset
    Damaged(String),
}

impl CheckpointPaths {
    pub fn new(source: &Path, suffixes: &MarkerSuffixes) -> Self {
        Self {
            stats: with_suffix(source, &suffixes.stats),
            finished: with_suffix(source, &suffixes.finished),
            stats_suffix: suffixes.stats.clone(),
        }
    }

    /// Inspect the bookkeeping files. The finished marker wins over a
    /// leftover checkpoint.
    pub fn load(&self) -> Result<Checkpoint> {
        if self.finished.exists() {
            return Ok(Checkpoint::Finished);
        }

        let content = match fs::read_to_string(&self.stats) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Checkpoint::Fresh),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Ok(Checkpoint::Damaged(String::new()));
            }
            Err(e) => return Err(e.into()),
        };

        match parse_offset(&content) {
            Some(offset) => Ok(Checkpoint::Resume(offset)),
            None => Ok(Checkpoint::Damaged(content)),
        }
    }

    /// Durably replace the checkpoint with `offset`.
    ///
    /// The value is written to a unique temp file next to the checkpoint,
    /// synced, then renamed over it. The temp name keeps the stats suffix so
    /// a concurrent scan never mistakes it for a source file.
    pub fn store(&self, offset: u64) -> Result<()> {
        use portable_atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let mut temp_name = self.stats.as_os_str().to_owned();
        temp_name.push(format!(
            ".{}-{}.tmp{}",
            std::process::id(),
            unique_id,
            self.stats_suffix
        ));
        let temp_path = PathBuf::from(temp_name);

        let written =
            write_synced(&temp_path, offset).and_then(|_| fs::rename(&temp_path, &self.stats));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!(path = ?self.stats, offset, "Checkpoint written");
        Ok(())
    }

    /// Atomically turn the checkpoint into the finished marker.
    pub fn seal(&self) -> Result<()> {
        fs::rename(&self.stats, &self.finished)?;
        Ok(())
    }
}

/// A checkpoint holds exactly one unsigned decimal number, optionally
/// followed by a single newline.
fn parse_offset(content: &str) -> Option<u64> {
    let digits = content.strip_suffix('\n').unwrap_or(content);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn write_synced(path: &Path, offset: u64) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{}", offset)?;
    file.sync_all()
}
