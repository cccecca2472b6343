//! File-backed, append-only frame log.
//!
//! Every append opens the file, writes the whole frame and closes it again,
//! so a read issued right after an append always observes the new bytes.
//! Nothing is locked: sessions are served one at a time, which makes the
//! serving thread the only writer and reader.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Default chunk size for replaying the log.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Errors touching the backing file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write '{}': {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read '{}': {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure while streaming the log to a peer.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("send error: {0}")]
    Send(#[source] io::Error),
}

/// Append-only log backed by a single file.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
    chunk_size: usize,
}

impl LogStore {
    /// Create a store at `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use `chunk_size` bytes per read when replaying.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `bytes` to the end of the log.
    pub fn append(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o644)
            .open(&self.path)
            .map_err(|e| self.write_error(e))?;

        // write_all reports a short write as WriteZero
        file.write_all(bytes).map_err(|e| self.write_error(e))?;

        trace!(bytes = bytes.len(), path = %self.path.display(), "appended");
        Ok(())
    }

    /// Read the whole log. A log that was never written is empty.
    pub fn read_all(&self) -> Result<Vec<u8>, StoreError> {
        let mut out = Vec::new();
        let Some(mut file) = self.open_for_read()? else {
            return Ok(out);
        };
        file.read_to_end(&mut out).map_err(|e| self.read_error(e))?;
        Ok(out)
    }

    /// Stream the whole log to `out` in chunks. Returns the number of bytes
    /// sent.
    pub fn replay_to<W: Write>(&self, out: &mut W) -> Result<u64, ReplayError> {
        let Some(mut file) = self.open_for_read()? else {
            return Ok(0);
        };

        let mut chunk = vec![0u8; self.chunk_size];
        let mut sent = 0u64;
        loop {
            let n = match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.read_error(e).into()),
            };
            out.write_all(&chunk[..n]).map_err(ReplayError::Send)?;
            sent += n as u64;
        }
        out.flush().map_err(ReplayError::Send)?;

        debug!(bytes = sent, "replayed log");
        Ok(sent)
    }

    /// Delete the backing file. Returns whether a file was removed.
    pub fn remove(&self) -> io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn open_for_read(&self) -> Result<Option<File>, StoreError> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.read_error(e)),
        }
    }

    fn write_error(&self, source: io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn read_error(&self, source: io::Error) -> StoreError {
        StoreError::Read {
            path: self.path.clone(),
            source,
        }
    }
}
