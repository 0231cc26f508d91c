// SPDX-License-Identifier: Apache-2.0

//! Directory sync receiver.
//!
//! Tails every file dropped into a directory tree, line by line, while
//! keeping a byte-exact checkpoint next to each file so reading resumes
//! where it left off after a restart. A file is sealed with a finished
//! marker once it has been drained and an end marker says it will not grow.

pub mod checkpoint;
pub mod config;
pub mod decoder;
pub mod error;
pub mod line_reader;
pub mod reader;
pub mod receiver;
pub mod scanner;

pub use config::{DirSyncConfig, MarkerSuffixes};
pub use error::{Error, Result};
pub use line_reader::DirectoryLineReader;
pub use reader::ResumableFileReader;
pub use receiver::{DirSyncReceiver, LineBatch};
pub use scanner::DirectoryScanner;
