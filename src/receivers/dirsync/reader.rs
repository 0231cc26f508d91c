// SPDX-License-Identifier: Apache-2.0

//! Resumable, checkpointed line reader for a single file.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::checkpoint::{Checkpoint, CheckpointPaths};
use super::config::MarkerSuffixes;
use super::decoder::{DecoderState, Outcome, decode_step};
use super::error::{Error, Result};

/// Size of the raw read buffer
pub const READ_BUF_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Active,
    /// True end of file was observed. Cleared by `reset`.
    EndOfStream,
    /// The finished marker exists, nothing more will be read
    Finished,
    /// The checkpoint could not be parsed
    Damaged(String),
    /// A malformed byte sequence was found
    Unreadable,
}

/// Reads lines from one file while tracking the exact byte offset of what
/// has been returned (`read_position`) and what has been committed
/// (`committed_position`).
///
/// `committed_position <= read_position` holds at all times. Lines are only
/// made durable by `commit`, and `reset` rewinds to the last commit.
pub struct ResumableFileReader {
    path: PathBuf,
    file: Option<File>,
    checkpoint: CheckpointPaths,
    file_ended: bool,
    max_line_size: usize,

    buf: Box<[u8]>,
    start: usize,
    end: usize,
    line: String,
    truncated: bool,
    decoder: DecoderState,

    read_position: u64,
    committed_position: u64,
    /// The checkpoint file holds `committed_position`
    checkpoint_stored: bool,
    status: Status,
}

impl ResumableFileReader {
    /// Open `path` and position it at its checkpoint.
    ///
    /// `file_ended` is the external hint that the file will not grow any
    /// more; only then is the file sealed with a finished marker once it has
    /// been read to the end and committed.
    pub fn open(
        path: &Path,
        suffixes: &MarkerSuffixes,
        file_ended: bool,
        max_line_size: usize,
    ) -> Result<Self> {
        let open_err = |source: io::Error| Error::Open {
            path: path.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(path).map_err(open_err)?;
        if metadata.is_dir() {
            return Err(open_err(io::Error::other("path is a directory")));
        }
        let file = File::open(path).map_err(open_err)?;

        let mut reader = Self {
            path: path.to_path_buf(),
            file: Some(file),
            checkpoint: CheckpointPaths::new(path, suffixes),
            file_ended,
            max_line_size,
            buf: vec![0u8; READ_BUF_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            line: String::new(),
            truncated: false,
            decoder: DecoderState::default(),
            read_position: 0,
            committed_position: 0,
            checkpoint_stored: false,
            status: Status::Active,
        };

        match reader.checkpoint.load()? {
            Checkpoint::Finished => {
                debug!(path = ?reader.path, "Finished marker present, file will not be read");
                reader.file = None;
                reader.status = Status::Finished;
            }
            Checkpoint::Damaged(content) => {
                reader.file = None;
                reader.status = Status::Damaged(content);
            }
            Checkpoint::Fresh => {
                debug!(path = ?reader.path, "No checkpoint, reading from start");
            }
            Checkpoint::Resume(offset) => {
                if offset > metadata.len() {
                    warn!(
                        path = ?reader.path,
                        offset,
                        len = metadata.len(),
                        "Checkpoint is beyond the end of the file, waiting for it to grow"
                    );
                }
                debug!(path = ?reader.path, offset, "Resuming from checkpoint");
                reader.rewind_to(offset)?;
                reader.committed_position = offset;
                reader.checkpoint_stored = true;
            }
        }

        Ok(reader)
    }

    /// Return the next line, or `None` when no line is available.
    ///
    /// `None` is returned for a sealed, damaged or unreadable file, and once
    /// end of file has been observed until the next `reset`. A malformed
    /// byte sequence yields an error and leaves the file unreadable.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        if self.status != Status::Active || self.file.is_none() {
            return Ok(None);
        }

        loop {
            let step = decode_step(self.decoder, &self.buf[self.start..self.end], &mut self.line);
            let step = match step {
                Ok(step) => step,
                Err(e) => {
                    let offset = self.read_position + e.offset as u64;
                    return Err(self.unreadable(offset, e.len));
                }
            };

            self.start += step.consumed;
            self.read_position += step.consumed as u64;
            self.decoder = step.state;
            self.enforce_line_limit();

            if step.outcome == Outcome::Line {
                return Ok(Some(self.take_line()));
            }

            if self.fill()? == 0 {
                return self.end_of_stream();
            }
        }
    }

    /// Persist the current read position. Seals the file when it carries
    /// the end hint and end of file has been reached.
    ///
    /// Nothing is written when the position has not moved since the last
    /// commit, unless the file is about to be sealed and has no checkpoint
    /// yet.
    pub fn commit(&mut self) -> Result<()> {
        match self.status {
            Status::Finished | Status::Damaged(_) | Status::Unreadable => return Ok(()),
            Status::Active | Status::EndOfStream => {}
        }

        let sealing = self.file_ended && self.status == Status::EndOfStream;
        let moved = self.read_position != self.committed_position;
        if moved || (sealing && !self.checkpoint_stored) {
            self.checkpoint.store(self.read_position)?;
            self.committed_position = self.read_position;
            self.checkpoint_stored = true;
        }

        if sealing {
            self.checkpoint.seal()?;
            self.status = Status::Finished;
            info!(
                path = ?self.path,
                offset = self.committed_position,
                "File fully consumed, finished marker written"
            );
        }

        Ok(())
    }

    /// Rewind to the last committed position, discarding everything read
    /// since.
    pub fn reset(&mut self) -> Result<()> {
        match self.status {
            Status::Finished | Status::Damaged(_) | Status::Unreadable => return Ok(()),
            Status::Active | Status::EndOfStream => {}
        }
        if self.file.is_none() {
            return Ok(());
        }

        self.rewind_to(self.committed_position)?;
        self.status = Status::Active;
        Ok(())
    }

    /// Release the file handle. Safe to call more than once.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = ?self.path, "Closed file");
        }
        self.start = 0;
        self.end = 0;
        self.line.clear();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_position(&self) -> u64 {
        self.read_position
    }

    pub fn committed_position(&self) -> u64 {
        self.committed_position
    }

    pub fn is_finished(&self) -> bool {
        self.status == Status::Finished
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.status == Status::EndOfStream
    }

    /// Raw content of a damaged checkpoint, if the checkpoint was damaged
    pub fn damaged(&self) -> Option<&str> {
        match &self.status {
            Status::Damaged(content) => Some(content),
            _ => None,
        }
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint.stats
    }

    /// Position the file at `offset` with empty buffers, restoring the
    /// decoder state from the byte that precedes it.
    fn rewind_to(&mut self, offset: u64) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        self.decoder = DecoderState::default();
        if offset > 0 {
            file.seek(SeekFrom::Start(offset - 1))?;
            let mut prev = [0u8; 1];
            if read_retrying(file, &mut prev)? == 1 {
                self.decoder = DecoderState::after_byte(prev[0]);
            }
        }
        file.seek(SeekFrom::Start(offset))?;

        self.start = 0;
        self.end = 0;
        self.line.clear();
        self.truncated = false;
        self.read_position = offset;
        Ok(())
    }

    /// Read more input behind the unconsumed bytes. Returns the number of
    /// new bytes, zero at end of file.
    fn fill(&mut self) -> Result<usize> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        let n = read_retrying(file, &mut self.buf[self.end..])?;
        self.end += n;
        Ok(n)
    }

    fn end_of_stream(&mut self) -> Result<Option<String>> {
        let pending = self.end - self.start;
        if pending > 0 {
            if self.file_ended {
                return Err(self.unreadable(self.read_position, pending));
            }
            warn!(
                path = ?self.path,
                offset = self.read_position,
                pending,
                "Incomplete UTF-8 sequence at end of file, leaving it for the next read"
            );
        }

        self.status = Status::EndOfStream;
        if self.line.is_empty() && !self.truncated {
            return Ok(None);
        }
        Ok(Some(self.take_line()))
    }

    fn unreadable(&mut self, offset: u64, len: usize) -> Error {
        self.status = Status::Unreadable;
        self.line.clear();
        Error::Malformed {
            path: self.path.clone(),
            offset,
            len,
        }
    }

    fn enforce_line_limit(&mut self) {
        if self.line.len() <= self.max_line_size {
            return;
        }
        let mut cut = self.max_line_size;
        while !self.line.is_char_boundary(cut) {
            cut -= 1;
        }
        self.line.truncate(cut);
        self.truncated = true;
    }

    fn take_line(&mut self) -> String {
        if self.truncated {
            warn!(
                path = ?self.path,
                offset = self.read_position,
                max_line_size = self.max_line_size,
                "Line exceeded the maximum size and was truncated"
            );
            self.truncated = false;
        }
        std::mem::take(&mut self.line)
    }
}

fn read_retrying(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SCENARIO: &[u8] = b"line1\nline_2\r\nline__3\rline__4\r\nline_5\rline6";
    const SCENARIO_LINES: [&str; 6] = ["line1", "line_2", "line__3", "line__4", "line_5", "line6"];

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn open(path: &Path, file_ended: bool) -> ResumableFileReader {
        ResumableFileReader::open(path, &MarkerSuffixes::default(), file_ended, 1024 * 1024)
            .unwrap()
    }

    fn read_all(reader: &mut ResumableFileReader) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", SCENARIO);

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), SCENARIO_LINES);
        assert!(reader.is_end_of_stream());
        assert_eq!(reader.read_position(), SCENARIO.len() as u64);
        assert_eq!(reader.committed_position(), 0);

        // Stays at end of file
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_empty_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"a\n\n\r\n\rb\n");

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["a", "", "", "", "b"]);
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"");

        let mut reader = open(&path, false);
        assert_eq!(reader.read_line().unwrap(), None);
        assert!(reader.is_end_of_stream());
    }

    #[test]
    fn test_resume_after_every_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", SCENARIO);
        let stats = dir.path().join("app.log.FLUME-INCOMPLETE");

        for k in 0..=SCENARIO_LINES.len() {
            let _ = fs::remove_file(&stats);

            let mut reader = open(&path, false);
            for expected in &SCENARIO_LINES[..k] {
                assert_eq!(reader.read_line().unwrap().as_deref(), Some(*expected));
            }
            reader.commit().unwrap();
            reader.close();
            drop(reader);

            let mut reader = open(&path, false);
            assert_eq!(read_all(&mut reader), SCENARIO_LINES[k..], "resumed after {} lines", k);
        }
    }

    #[test]
    fn test_checkpoint_between_cr_and_lf() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"a\r\nb\n");

        let mut reader = open(&path, false);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("a"));
        reader.commit().unwrap();
        assert_eq!(
            fs::read_to_string(reader.checkpoint_path()).unwrap(),
            "2\n"
        );
        drop(reader);

        let mut reader = open(&path, false);
        assert_eq!(reader.read_position(), 2);
        assert_eq!(read_all(&mut reader), ["b"]);
    }

    #[test]
    fn test_reset_rereads_identical_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", SCENARIO);

        let mut reader = open(&path, false);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("line1"));
        reader.commit().unwrap();

        let first: Vec<_> = (0..3).map(|_| reader.read_line().unwrap().unwrap()).collect();
        reader.reset().unwrap();
        assert_eq!(reader.read_position(), reader.committed_position());
        let second: Vec<_> = (0..3).map(|_| reader.read_line().unwrap().unwrap()).collect();
        assert_eq!(first, second);
        assert_eq!(first, ["line_2", "line__3", "line__4"]);
    }

    #[test]
    fn test_reset_after_end_of_stream_sees_appended_data() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"one\n");

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["one"]);
        reader.commit().unwrap();

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"two\nthree\n").unwrap();
        drop(file);

        // End of stream is sticky until reset
        assert_eq!(reader.read_line().unwrap(), None);
        reader.reset().unwrap();
        assert_eq!(read_all(&mut reader), ["two", "three"]);
    }

    #[test]
    fn test_resume_after_append() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"one\ntwo\n");

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["one", "two"]);
        reader.commit().unwrap();
        drop(reader);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"three\n").unwrap();
        drop(file);

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["three"]);
    }

    #[test]
    fn test_seal_requires_end_hint() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"one\n");
        let finished = dir.path().join("app.log.FLUME-COMPLETED");

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["one"]);
        reader.commit().unwrap();
        assert!(!reader.is_finished());
        assert!(!finished.exists());
        drop(reader);

        let mut reader = open(&path, true);
        // Not at end of stream yet
        reader.commit().unwrap();
        assert!(!finished.exists());

        assert_eq!(reader.read_line().unwrap(), None);
        reader.commit().unwrap();
        assert!(reader.is_finished());
        assert!(finished.exists());
        assert!(!dir.path().join("app.log.FLUME-INCOMPLETE").exists());

        // Commit and reset are no-ops now
        reader.commit().unwrap();
        reader.reset().unwrap();
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_unmoved_position_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"one\n");

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["one"]);
        reader.commit().unwrap();
        assert_eq!(fs::read_to_string(reader.checkpoint_path()).unwrap(), "4\n");

        // A second commit at the same position does not touch the disk
        fs::remove_file(reader.checkpoint_path()).unwrap();
        reader.commit().unwrap();
        assert!(!reader.checkpoint_path().exists());
    }

    #[test]
    fn test_untouched_empty_file_gets_no_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"");

        let mut reader = open(&path, false);
        assert_eq!(reader.read_line().unwrap(), None);
        reader.commit().unwrap();
        assert!(!reader.checkpoint_path().exists());
        assert_eq!(reader.committed_position(), 0);
    }

    #[test]
    fn test_empty_file_with_end_hint_is_sealed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"");

        let mut reader = open(&path, true);
        assert_eq!(reader.read_line().unwrap(), None);
        reader.commit().unwrap();
        assert!(reader.is_finished());
        assert!(dir.path().join("app.log.FLUME-COMPLETED").exists());
        assert!(!dir.path().join("app.log.FLUME-INCOMPLETE").exists());
    }

    #[test]
    fn test_sealed_file_is_never_read_again() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", SCENARIO);

        let mut reader = open(&path, true);
        assert_eq!(read_all(&mut reader), SCENARIO_LINES);
        reader.commit().unwrap();
        drop(reader);

        let mut reader = open(&path, true);
        assert!(reader.is_finished());
        assert_eq!(reader.read_line().unwrap(), None);
        reader.reset().unwrap();
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_damaged_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"one\n");

        for content in ["", "not a number\n"] {
            fs::write(dir.path().join("app.log.FLUME-INCOMPLETE"), content).unwrap();

            let mut reader = open(&path, false);
            assert_eq!(reader.damaged(), Some(content));
            assert_eq!(reader.read_line().unwrap(), None);
            reader.commit().unwrap();
            reader.reset().unwrap();
            reader.close();

            // Commit did not touch the checkpoint
            assert_eq!(
                fs::read_to_string(dir.path().join("app.log.FLUME-INCOMPLETE")).unwrap(),
                content
            );
        }
    }

    #[test]
    fn test_malformed_sequence_makes_file_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"ok\n\xffbad\nmore\n");

        let mut reader = open(&path, false);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("ok"));

        let err = reader.read_line().unwrap_err();
        assert!(matches!(err, Error::Malformed { offset: 3, len: 1, .. }));

        assert_eq!(reader.read_line().unwrap(), None);
        reader.commit().unwrap();
        assert!(!dir.path().join("app.log.FLUME-INCOMPLETE").exists());
    }

    #[test]
    fn test_trailing_incomplete_sequence() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"ab\n\xe2\x82");

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["ab"]);
        assert_eq!(reader.read_position(), 3);
        reader.commit().unwrap();
        drop(reader);

        // The writer completes the sequence
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\xac\n").unwrap();
        drop(file);

        let mut reader = open(&path, false);
        assert_eq!(read_all(&mut reader), ["€"]);
    }

    #[test]
    fn test_trailing_incomplete_sequence_with_end_hint() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"ab\n\xe2\x82");

        let mut reader = open(&path, true);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("ab"));
        let err = reader.read_line().unwrap_err();
        assert!(matches!(err, Error::Malformed { offset: 3, len: 2, .. }));
    }

    #[test]
    fn test_multibyte_across_buffer_boundary() {
        let dir = TempDir::new().unwrap();
        // 3-byte characters never align with the buffer size
        let long: String = "€".repeat(READ_BUF_SIZE / 3 + 10);
        let mut content = long.clone().into_bytes();
        content.extend_from_slice("\n😀 tail\n".as_bytes());
        let path = write_file(&dir, "app.log", &content);

        let mut reader = open(&path, false);
        assert_eq!(reader.read_line().unwrap(), Some(long.clone()));
        assert_eq!(reader.read_position(), long.len() as u64 + 1);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("😀 tail"));
        assert_eq!(reader.read_line().unwrap(), None);
        assert_eq!(reader.read_position(), content.len() as u64);
    }

    #[test]
    fn test_long_lines_are_truncated() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", "abcdefgh\néééx\nok\n".as_bytes());

        let mut reader =
            ResumableFileReader::open(&path, &MarkerSuffixes::default(), false, 5).unwrap();
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("abcde"));
        assert_eq!(reader.read_position(), 9);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("éé"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_checkpoint_beyond_end_of_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"one\n");
        fs::write(dir.path().join("app.log.FLUME-INCOMPLETE"), "10\n").unwrap();

        let mut reader = open(&path, false);
        assert_eq!(reader.read_position(), 10);
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_open_directory_fails() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("nested");
        fs::create_dir(&sub).unwrap();

        let result = ResumableFileReader::open(&sub, &MarkerSuffixes::default(), false, 1024);
        assert!(matches!(result, Err(Error::Open { .. })));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.log", b"one\n");

        let mut reader = open(&path, false);
        reader.close();
        reader.close();
        assert_eq!(reader.read_line().unwrap(), None);
    }
}
