// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("Failed to open file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint file {path:?} is damaged (content: {content:?})")]
    DamagedCheckpoint { path: PathBuf, content: String },

    #[error("File {path:?} is not valid UTF-8: malformed sequence of {len} byte(s) at offset {offset}")]
    Malformed {
        path: PathBuf,
        offset: u64,
        len: usize,
    },

    #[error("Reader has been disabled")]
    Disabled,

    #[error("Commit attempted with no open file")]
    NoOpenFile,
}

pub type Result<T> = std::result::Result<T, Error>;
