// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::receivers::dirsync::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_END_FILE_SUFFIX, DEFAULT_FINISHED_FILE_SUFFIX,
    DEFAULT_MAX_LINE_SIZE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STATS_FILE_SUFFIX,
};
use crate::receivers::dirsync::{DirSyncConfig, MarkerSuffixes};

#[derive(Debug, Args, Clone)]
pub struct DirSyncReceiverArgs {
    /// Directory to sync, scanned recursively
    #[arg(long, env = "DIRSYNC_DIRECTORY")]
    pub dirsync_directory: PathBuf,

    /// Suffix of the marker file that signals a file will not grow any more
    #[arg(long, env = "DIRSYNC_END_FILE_SUFFIX", default_value = DEFAULT_END_FILE_SUFFIX)]
    pub dirsync_end_file_suffix: String,

    /// Suffix of the per-file checkpoint holding the committed offset
    #[arg(long, env = "DIRSYNC_STATS_FILE_SUFFIX", default_value = DEFAULT_STATS_FILE_SUFFIX)]
    pub dirsync_stats_file_suffix: String,

    /// Suffix the checkpoint is renamed to once a file is fully consumed
    #[arg(
        long,
        env = "DIRSYNC_FINISHED_FILE_SUFFIX",
        default_value = DEFAULT_FINISHED_FILE_SUFFIX
    )]
    pub dirsync_finished_file_suffix: String,

    /// Maximum number of lines per batch
    #[arg(long, env = "DIRSYNC_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub dirsync_batch_size: usize,

    /// Delay between directory polls in milliseconds
    #[arg(long, env = "DIRSYNC_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub dirsync_poll_interval_ms: u64,

    /// Lines longer than this many bytes are truncated
    #[arg(long, env = "DIRSYNC_MAX_LINE_SIZE", default_value_t = DEFAULT_MAX_LINE_SIZE)]
    pub dirsync_max_line_size: usize,
}

impl DirSyncReceiverArgs {
    pub fn build_config(&self) -> DirSyncConfig {
        DirSyncConfig::new(&self.dirsync_directory)
            .with_suffixes(MarkerSuffixes::new(
                &self.dirsync_end_file_suffix,
                &self.dirsync_stats_file_suffix,
                &self.dirsync_finished_file_suffix,
            ))
            .with_batch_size(self.dirsync_batch_size)
            .with_poll_interval(Duration::from_millis(self.dirsync_poll_interval_ms))
            .with_max_line_size(self.dirsync_max_line_size)
    }
}
