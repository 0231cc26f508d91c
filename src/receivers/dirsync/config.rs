// SPDX-License-Identifier: Apache-2.0

//! Configuration for the directory sync receiver.

use std::path::PathBuf;
use std::time::Duration;

/// Suffix of the file whose existence marks a source file as complete
pub const DEFAULT_END_FILE_SUFFIX: &str = ".done";

/// Suffix of the in-progress checkpoint file
pub const DEFAULT_STATS_FILE_SUFFIX: &str = ".FLUME-INCOMPLETE";

/// Suffix of the sealed checkpoint file
pub const DEFAULT_FINISHED_FILE_SUFFIX: &str = ".FLUME-COMPLETED";

/// Default maximum number of lines per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default delay between polls of the directory (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default maximum line size in bytes, longer lines are truncated
pub const DEFAULT_MAX_LINE_SIZE: usize = 1024 * 1024;

/// File name suffixes that mark bookkeeping files next to each source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSuffixes {
    /// Existence of `<file><end>` means the source will not grow any more
    pub end: String,
    /// `<file><stats>` holds the committed byte offset
    pub stats: String,
    /// `<file><finished>` means the source is fully drained
    pub finished: String,
}

impl Default for MarkerSuffixes {
    fn default() -> Self {
        Self {
            end: DEFAULT_END_FILE_SUFFIX.to_string(),
            stats: DEFAULT_STATS_FILE_SUFFIX.to_string(),
            finished: DEFAULT_FINISHED_FILE_SUFFIX.to_string(),
        }
    }
}

impl MarkerSuffixes {
    pub fn new(
        end: impl Into<String>,
        stats: impl Into<String>,
        finished: impl Into<String>,
    ) -> Self {
        Self {
            end: end.into(),
            stats: stats.into(),
            finished: finished.into(),
        }
    }

    /// Whether a file name belongs to a bookkeeping file rather than a source.
    pub fn is_marker(&self, file_name: &str) -> bool {
        file_name.ends_with(&self.end)
            || file_name.ends_with(&self.stats)
            || file_name.ends_with(&self.finished)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, suffix) in [
            ("end file", &self.end),
            ("stats file", &self.stats),
            ("finished file", &self.finished),
        ] {
            if suffix.is_empty() {
                return Err(format!("{} suffix must not be empty", name));
            }
        }

        if self.end == self.stats || self.end == self.finished || self.stats == self.finished {
            return Err(format!(
                "end, stats and finished suffixes must be distinct, got {:?}, {:?}, {:?}",
                self.end, self.stats, self.finished
            ));
        }

        Ok(())
    }
}

/// Configuration for the directory sync receiver
#[derive(Debug, Clone)]
pub struct DirSyncConfig {
    /// Root of the watched directory tree
    pub directory: PathBuf,
    /// Bookkeeping file suffixes
    pub suffixes: MarkerSuffixes,
    /// Maximum number of lines handed downstream per batch
    pub batch_size: usize,
    /// Delay between the end of one drain cycle and the start of the next
    pub poll_interval: Duration,
    /// Maximum line size in bytes
    pub max_line_size: usize,
}

impl DirSyncConfig {
    /// Create a config for `directory` with default settings
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            suffixes: MarkerSuffixes::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_line_size: DEFAULT_MAX_LINE_SIZE,
        }
    }

    pub fn with_suffixes(mut self, suffixes: MarkerSuffixes) -> Self {
        self.suffixes = suffixes;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_line_size(mut self, max_line_size: usize) -> Self {
        self.max_line_size = max_line_size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.directory.as_os_str().is_empty() {
            return Err("a directory to sync must be specified".to_string());
        }

        if !self.directory.exists() {
            return Err(format!(
                "Directory does not exist: {}",
                self.directory.display()
            ));
        }

        if !self.directory.is_dir() {
            return Err(format!(
                "Path is not a directory: {}",
                self.directory.display()
            ));
        }

        self.suffixes.validate()?;

        if self.batch_size == 0 {
            return Err("Batch size must be at least 1, got 0".to_string());
        }

        if self.max_line_size == 0 {
            return Err("max_line_size must be positive".to_string());
        }

        Ok(())
    }
}
