// SPDX-License-Identifier: Apache-2.0

//! Directory level line reader.
//!
//! Walks the files of a directory one at a time and hands out lines in
//! batches. Every batch must be confirmed with `commit` before the next call
//! to `read_lines` makes progress; an unconfirmed batch is rewound and
//! returned again.

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use super::checkpoint::with_suffix;
use super::config::{DirSyncConfig, MarkerSuffixes};
use super::error::{Error, Result};
use super::reader::ResumableFileReader;
use super::scanner::DirectoryScanner;

enum ReaderState {
    /// No batch outstanding
    Idle {
        current: Option<ResumableFileReader>,
    },
    /// A batch was returned and awaits `commit`
    BatchPending { current: ResumableFileReader },
    /// A fatal error happened, every call fails from now on
    Disabled,
}

pub struct DirectoryLineReader {
    scanner: DirectoryScanner,
    suffixes: MarkerSuffixes,
    max_line_size: usize,
    state: ReaderState,
    last_file_read: Option<PathBuf>,
}

impl DirectoryLineReader {
    /// Create a reader for the configured directory. Fails when the
    /// configuration is invalid or checkpoints cannot be written there.
    pub fn new(config: &DirSyncConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let canary = config
            .directory
            .join(format!(".dirsync-canary{}", config.suffixes.stats));
        fs::write(&canary, b"canary")
            .and_then(|_| fs::remove_file(&canary))
            .map_err(|e| {
                Error::Config(format!(
                    "Unable to write checkpoints to {}: {}",
                    config.directory.display(),
                    e
                ))
            })?;

        Ok(Self {
            scanner: DirectoryScanner::new(&config.directory, config.suffixes.clone()),
            suffixes: config.suffixes.clone(),
            max_line_size: config.max_line_size,
            state: ReaderState::Idle { current: None },
            last_file_read: None,
        })
    }

    /// Read up to `n` lines from the current file.
    ///
    /// An empty result means there is nothing to read right now. A
    /// non-empty result must be followed by `commit`, otherwise the next
    /// call rewinds and returns the same lines again.
    pub fn read_lines(&mut self, n: usize) -> Result<Vec<String>> {
        let current = match mem::replace(&mut self.state, ReaderState::Disabled) {
            ReaderState::Disabled => return Err(Error::Disabled),
            ReaderState::Idle { current } => current,
            ReaderState::BatchPending { mut current } => {
                info!(
                    path = ?current.path(),
                    offset = current.committed_position(),
                    "Previous batch was not committed, rewinding"
                );
                if let Err(e) = current.reset() {
                    return Err(self.disable(e));
                }
                Some(current)
            }
        };

        if n == 0 {
            self.state = ReaderState::Idle { current };
            return Ok(Vec::new());
        }

        let mut current = match current {
            Some(current) => current,
            None => match self.next_file() {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.state = ReaderState::Idle { current: None };
                    return Ok(Vec::new());
                }
                Err(e) => return Err(self.disable(e)),
            },
        };

        // Find a file with at least one line, retiring drained ones
        let first = loop {
            match current.read_line() {
                Ok(Some(line)) => break line,
                Ok(None) => {}
                Err(e) => return Err(self.disable(e)),
            }

            if let Err(e) = retire(&mut current) {
                return Err(self.disable(e));
            }
            current = match self.next_file() {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.state = ReaderState::Idle { current: None };
                    return Ok(Vec::new());
                }
                Err(e) => return Err(self.disable(e)),
            };
        };

        let mut lines = Vec::with_capacity(n.min(1024));
        lines.push(first);
        while lines.len() < n {
            match current.read_line() {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => break,
                Err(e) => return Err(self.disable(e)),
            }
        }

        self.last_file_read = Some(current.path().to_path_buf());
        self.state = ReaderState::BatchPending { current };
        Ok(lines)
    }

    /// Read a single line. Same contract as `read_lines(1)`.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.read_lines(1)?.into_iter().next())
    }

    /// Confirm the last batch, persisting the position of the current file.
    pub fn commit(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, ReaderState::Disabled) {
            ReaderState::Disabled => Err(Error::Disabled),
            ReaderState::Idle { current: None } => {
                self.state = ReaderState::Idle { current: None };
                Err(Error::NoOpenFile)
            }
            ReaderState::Idle {
                current: Some(mut current),
            }
            | ReaderState::BatchPending { mut current } => {
                if let Err(e) = current.commit() {
                    return Err(self.disable(e));
                }
                self.state = ReaderState::Idle {
                    current: Some(current),
                };
                Ok(())
            }
        }
    }

    /// Path of the file the last batch was read from
    pub fn last_file_read(&self) -> Option<&Path> {
        self.last_file_read.as_deref()
    }

    /// Close the current file. An outstanding batch is dropped without
    /// being committed.
    pub fn close(&mut self) {
        match mem::replace(&mut self.state, ReaderState::Disabled) {
            ReaderState::Disabled => {}
            ReaderState::Idle { current } => {
                if let Some(mut current) = current {
                    current.close();
                }
                self.state = ReaderState::Idle { current: None };
            }
            ReaderState::BatchPending { mut current } => {
                current.close();
                self.state = ReaderState::Idle { current: None };
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.state, ReaderState::Disabled)
    }

    pub fn has_pending_batch(&self) -> bool {
        matches!(self.state, ReaderState::BatchPending { .. })
    }

    pub fn root(&self) -> &Path {
        self.scanner.root()
    }

    fn next_file(&mut self) -> Result<Option<ResumableFileReader>> {
        let Some(path) = self.scanner.next_path()? else {
            return Ok(None);
        };

        let file_ended = with_suffix(&path, &self.suffixes.end).exists();
        let reader =
            ResumableFileReader::open(&path, &self.suffixes, file_ended, self.max_line_size)?;

        if let Some(content) = reader.damaged() {
            return Err(Error::DamagedCheckpoint {
                path: reader.checkpoint_path().to_path_buf(),
                content: content.to_string(),
            });
        }

        debug!(
            path = ?path,
            file_ended,
            offset = reader.committed_position(),
            "Opened file"
        );
        Ok(Some(reader))
    }

    fn disable(&mut self, e: Error) -> Error {
        error!(error = %e, "Directory reader disabled");
        self.state = ReaderState::Disabled;
        e
    }
}

/// Commit and close a file that returned no more lines.
fn retire(reader: &mut ResumableFileReader) -> Result<()> {
    reader.commit()?;
    reader.close();
    info!(
        path = ?reader.path(),
        offset = reader.committed_position(),
        sealed = reader.is_finished(),
        "Done with file"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn line_reader(dir: &TempDir) -> DirectoryLineReader {
        DirectoryLineReader::new(&DirSyncConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn test_new_rejects_missing_directory() {
        let dir = TempDir::new().unwrap();
        let config = DirSyncConfig::new(dir.path().join("missing"));
        assert!(matches!(
            DirectoryLineReader::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_new_leaves_no_canary_behind() {
        let dir = TempDir::new().unwrap();
        let _reader = line_reader(&dir);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_idle_directory() {
        let dir = TempDir::new().unwrap();
        let mut reader = line_reader(&dir);
        assert!(reader.read_lines(10).unwrap().is_empty());
        assert!(!reader.has_pending_batch());
        assert_eq!(reader.last_file_read(), None);
    }

    #[test]
    fn test_batches_stop_at_end_of_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "1\n2\n3\n").unwrap();

        let mut reader = line_reader(&dir);
        assert_eq!(reader.read_lines(2).unwrap(), ["1", "2"]);
        assert!(reader.has_pending_batch());
        reader.commit().unwrap();

        assert_eq!(reader.read_lines(2).unwrap(), ["3"]);
        reader.commit().unwrap();
        assert_eq!(reader.last_file_read(), Some(dir.path().join("app.log").as_path()));

        assert!(reader.read_lines(2).unwrap().is_empty());
    }

    #[test]
    fn test_uncommitted_batch_is_returned_again() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "1\n2\n3\n4\n").unwrap();

        let mut reader = line_reader(&dir);
        assert_eq!(reader.read_lines(2).unwrap(), ["1", "2"]);
        reader.commit().unwrap();

        let batch = reader.read_lines(2).unwrap();
        assert_eq!(batch, ["3", "4"]);
        assert_eq!(reader.read_lines(2).unwrap(), batch);
        assert_eq!(reader.read_lines(2).unwrap(), batch);
        reader.commit().unwrap();

        assert!(reader.read_lines(2).unwrap().is_empty());
    }

    #[test]
    fn test_zero_lines_requested() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "1\n").unwrap();

        let mut reader = line_reader(&dir);
        assert!(reader.read_lines(0).unwrap().is_empty());
        assert_eq!(reader.read_lines(1).unwrap(), ["1"]);

        // Still rewinds the outstanding batch
        assert!(reader.read_lines(0).unwrap().is_empty());
        assert_eq!(reader.read_lines(1).unwrap(), ["1"]);
    }

    #[test]
    fn test_commit_without_open_file() {
        let dir = TempDir::new().unwrap();
        let mut reader = line_reader(&dir);
        assert!(matches!(reader.commit(), Err(Error::NoOpenFile)));
        assert!(!reader.is_disabled());
    }

    #[test]
    fn test_damaged_checkpoint_disables() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "1\n").unwrap();
        fs::write(dir.path().join("app.log.FLUME-INCOMPLETE"), "").unwrap();

        let mut reader = line_reader(&dir);
        assert!(matches!(
            reader.read_lines(1),
            Err(Error::DamagedCheckpoint { .. })
        ));
        assert!(reader.is_disabled());
        assert!(matches!(reader.read_lines(1), Err(Error::Disabled)));
        assert!(matches!(reader.commit(), Err(Error::Disabled)));
    }

    #[test]
    fn test_open_failure_on_rollover_disables() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.log"), "a\n").unwrap();
        fs::write(dir.path().join("b.log"), "b\n").unwrap();

        let mut reader = line_reader(&dir);
        assert_eq!(reader.read_lines(10).unwrap().len(), 1);
        reader.commit().unwrap();

        // The other file of this generation vanishes before it is opened
        let read = reader.last_file_read().unwrap().to_path_buf();
        let other = if read.ends_with("a.log") {
            dir.path().join("b.log")
        } else {
            dir.path().join("a.log")
        };
        fs::remove_file(&other).unwrap();

        match reader.read_lines(10) {
            Err(Error::Open { path, .. }) => assert_eq!(path, other),
            result => panic!("unexpected result: {:?}", result),
        }
        assert!(reader.is_disabled());
        assert!(matches!(reader.read_lines(10), Err(Error::Disabled)));
    }

    #[test]
    fn test_idle_polls_do_not_write_checkpoints() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "1\n").unwrap();
        fs::write(dir.path().join("empty.log"), "").unwrap();
        let stats = dir.path().join("app.log.FLUME-INCOMPLETE");

        let mut reader = line_reader(&dir);
        assert_eq!(reader.read_lines(10).unwrap(), ["1"]);
        reader.commit().unwrap();
        assert!(reader.read_lines(10).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&stats).unwrap(), "2\n");

        // Later generations retire both files again without writing
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        File::options()
            .write(true)
            .open(&stats)
            .unwrap()
            .set_modified(stamp)
            .unwrap();
        for _ in 0..3 {
            assert!(reader.read_lines(10).unwrap().is_empty());
        }
        assert_eq!(fs::metadata(&stats).unwrap().modified().unwrap(), stamp);
        assert!(!dir.path().join("empty.log.FLUME-INCOMPLETE").exists());
    }

    #[test]
    fn test_malformed_file_disables() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), b"ok\n\xc0\x80\n").unwrap();

        let mut reader = line_reader(&dir);
        assert!(matches!(
            reader.read_lines(5),
            Err(Error::Malformed { offset: 3, .. })
        ));
        assert!(reader.is_disabled());
        assert!(matches!(reader.read_line(), Err(Error::Disabled)));
    }

    #[test]
    fn test_end_marker_seals_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "1\n").unwrap();
        fs::write(dir.path().join("app.log.done"), "").unwrap();

        let mut reader = line_reader(&dir);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("1"));
        reader.commit().unwrap();
        assert_eq!(reader.read_line().unwrap(), None);

        assert!(dir.path().join("app.log.FLUME-COMPLETED").exists());
        assert!(!dir.path().join("app.log.FLUME-INCOMPLETE").exists());
    }

    #[test]
    fn test_close_drops_pending_batch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "1\n2\n").unwrap();

        let mut reader = line_reader(&dir);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("1"));
        reader.commit().unwrap();
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("2"));
        reader.close();
        reader.close();

        let mut reader = line_reader(&dir);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("2"));
    }
}
