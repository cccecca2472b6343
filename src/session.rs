//! Connection session handler.
//!
//! A session drives one accepted connection through
//! `Accepted -> Receiving -> Persisting -> Replaying -> Closed`. No state is
//! retried; any error ends the session and is handed back to the caller,
//! which decides whether it is fatal for the whole server. A failed session
//! keeps the state it failed in.

use crate::runtime::{BufferError, FrameEnd, ReceiveBuffer};
use crate::storage::{LogStore, ReplayError, StoreError};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("send error: {0}")]
    Send(#[source] io::Error),
}

impl From<ReplayError> for SessionError {
    fn from(e: ReplayError) -> Self {
        match e {
            ReplayError::Store(e) => SessionError::Store(e),
            ReplayError::Send(e) => SessionError::Send(e),
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Receiving,
    Persisting,
    Replaying,
    Closed,
}

/// What a completed session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Bytes appended to the log.
    pub frame_len: usize,
    /// Whether the frame ended with a delimiter (false if the peer closed).
    pub delimited: bool,
    /// Bytes received after the delimiter and dropped.
    pub discarded: usize,
    /// Bytes of log sent back.
    pub replayed: u64,
}

/// One accepted connection.
pub struct Session<'a, S> {
    stream: S,
    peer: SocketAddr,
    buffer: &'a mut ReceiveBuffer,
    store: &'a LogStore,
    state: SessionState,
}

impl<'a, S: Read + Write> Session<'a, S> {
    /// Start a session. `buffer` is cleared before use.
    pub fn new(
        stream: S,
        peer: SocketAddr,
        buffer: &'a mut ReceiveBuffer,
        store: &'a LogStore,
    ) -> Self {
        buffer.clear();
        Self {
            stream,
            peer,
            buffer,
            store,
            state: SessionState::Accepted,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Receive one frame, persist it, and replay the log.
    ///
    /// On success the state is `Closed`. On failure it stays at the stage
    /// that failed. Either way the connection stays open until `close`.
    pub fn run(&mut self) -> Result<SessionReport, SessionError> {
        let report = self.drive()?;
        self.state = SessionState::Closed;
        Ok(report)
    }

    /// Drop the stream, closing the connection.
    pub fn close(self) {
        let ip = self.peer.ip();
        drop(self.stream);
        info!(peer = %ip, "Closed connection");
    }

    fn drive(&mut self) -> Result<SessionReport, SessionError> {
        self.state = SessionState::Receiving;
        let end = self.buffer.fill_frame(&mut self.stream)?;

        self.state = SessionState::Persisting;
        let frame = self.buffer.frame();
        let discarded = self.buffer.len() - frame.len();
        if discarded > 0 {
            debug!(
                peer = %self.peer,
                bytes = discarded,
                "dropping bytes received after delimiter"
            );
        }
        self.store.append(frame)?;
        let frame_len = frame.len();

        self.state = SessionState::Replaying;
        let replayed = self.store.replay_to(&mut self.stream)?;

        let report = SessionReport {
            frame_len,
            delimited: matches!(end, FrameEnd::Delimited { .. }),
            discarded,
            replayed,
        };
        debug!(
            peer = %self.peer,
            frame_len = report.frame_len,
            delimited = report.delimited,
            replayed = report.replayed,
            "session complete"
        );
        Ok(report)
    }
}
