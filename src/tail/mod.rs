//! Incremental tailing of the server log.
//!
//! [`TailReader`] keeps a byte offset into a growing file and hands out the
//! lines appended since the last read, one at a time. Uses synchronous
//! `std::fs` reads since these are quick local operations.

pub mod observer;

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, error, warn};

/// Lines longer than this are skipped (the offset still advances past them).
const MAX_LINE_LEN: usize = 1_048_576;

/// Errors raised when attaching to a log file.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// The monitored file did not exist when tailing began.
    #[error("log file not found: {}", path.display())]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },
    /// The file exists but its metadata could not be read.
    #[error("failed to inspect log file {}: {source}", path.display())]
    Io {
        /// Path that was inspected.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// A pull-based supply of raw log lines.
///
/// `None` means "nothing new right now", never end-of-stream.
pub trait LineSource {
    /// Return the next unread line without blocking.
    fn next_line(&mut self) -> Option<String>;
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn next_line(&mut self) -> Option<String> {
        (**self).next_line()
    }
}

/// Tails one file by byte offset, surviving truncation and rotation.
#[derive(Debug)]
pub struct TailReader {
    path: PathBuf,
    offset: u64,
    cached_mtime: Option<SystemTime>,
    cached_len: Option<u64>,
    pending: VecDeque<String>,
}

impl TailReader {
    /// Attach to `path`, positioned at its current end.
    ///
    /// Content already in the file is not replayed.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::FileNotFound`] if the file does not exist, or
    /// [`TailError::Io`] if its metadata cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TailError> {
        let path = path.into();
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TailError::FileNotFound { path });
            }
            Err(source) => return Err(TailError::Io { path, source }),
        };

        let len = metadata.len();
        debug!(path = %path.display(), offset = len, "attached to log file");

        Ok(Self {
            path,
            offset: len,
            cached_mtime: metadata.modified().ok(),
            cached_len: Some(len),
            pending: VecDeque::new(),
        })
    }

    /// Path of the monitored file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first unread byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of lines read from disk but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Force the read position, e.g. `0` to replay the whole file.
    ///
    /// Lines buffered from the old position are dropped.
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
        self.pending.clear();
    }

    /// Forget the cached modification stamp so the next poll reads the file
    /// even if nothing changed on disk.
    pub fn reset_mtime_cache(&mut self) {
        self.cached_mtime = None;
        self.cached_len = None;
    }

    /// Check whether the file changed since the last check.
    ///
    /// On change, updates the cached stamp and resets the offset to 0 if the
    /// file shrank below it (truncation or rotation).
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the file cannot be stat'ed.
    pub fn is_modified(&mut self) -> io::Result<bool> {
        let metadata = fs::metadata(&self.path)?;
        let mtime = metadata.modified()?;
        let len = metadata.len();

        if self.cached_mtime == Some(mtime) && self.cached_len == Some(len) {
            return Ok(false);
        }

        self.cached_mtime = Some(mtime);
        self.cached_len = Some(len);

        if len < self.offset {
            warn!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "log file shrank, reading from the start"
            );
            self.offset = 0;
        }

        Ok(true)
    }

    /// Poll the file once and buffer any new complete lines.
    ///
    /// Returns the number of lines buffered. I/O failures are logged and
    /// count as "nothing new"; the next poll retries.
    pub fn poll(&mut self) -> usize {
        match self.is_modified() {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to stat log file");
                return 0;
            }
        }

        match self.read_new_lines() {
            Ok(count) => count,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read log lines");
                self.reset_mtime_cache();
                0
            }
        }
    }

    /// Read complete lines from the current offset to end of file.
    ///
    /// A trailing line without `\n` is left unread so it is delivered whole
    /// once the writer finishes it.
    fn read_new_lines(&mut self) -> io::Result<usize> {
        let file = fs::File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.offset))?;

        let mut count: usize = 0;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf)?;
            if bytes_read == 0 || buf.last() != Some(&b'\n') {
                break;
            }

            let advance = u64::try_from(bytes_read).unwrap_or(u64::MAX);
            self.offset = self.offset.saturating_add(advance);

            if bytes_read > MAX_LINE_LEN {
                warn!(len = bytes_read, "skipping oversized log line");
                continue;
            }

            let line = String::from_utf8_lossy(&buf);
            self.pending
                .push_back(line.trim_end_matches(['\n', '\r']).to_owned());
            count = count.saturating_add(1);
        }

        Ok(count)
    }
}

impl LineSource for TailReader {
    /// Hand out a buffered line, polling the file once when the buffer is
    /// empty.
    fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.pending.pop_front() {
            return Some(line);
        }
        self.poll();
        self.pending.pop_front()
    }
}
