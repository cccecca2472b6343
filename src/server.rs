//! Listener lifecycle: setup, the serial accept loop, and graceful shutdown.
//!
//! Connections are served strictly one at a time. The next accept is only
//! issued after the previous session has persisted its frame, replayed the
//! log and closed, so the log store and receive buffer never need locking.

use crate::config::{Config, SessionFailurePolicy};
use crate::error::ServerError;
use crate::runtime::{
    detach, register_signals, Accepted, BoundSocket, Listener, ReceiveBuffer, ShutdownHandle,
};
use crate::session::{Session, SessionReport};
use crate::storage::LogStore;
use std::io::{Read, Write};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Server instance
pub struct Server {
    listener: Listener,
    store: LogStore,
    buffer: ReceiveBuffer,
    policy: SessionFailurePolicy,
    sessions: u64,
}

impl Server {
    /// Create a server around an already listening socket.
    pub fn new(
        listener: Listener,
        store: LogStore,
        initial_buffer_size: usize,
        policy: SessionFailurePolicy,
    ) -> Self {
        Server {
            listener,
            store,
            buffer: ReceiveBuffer::new(initial_buffer_size),
            policy,
            sessions: 0,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.listener.shutdown_handle()
    }

    /// Number of sessions that completed successfully.
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    /// Accept and serve connections until shutdown is requested.
    ///
    /// Returns `Ok` on a requested shutdown. Accept failures are always
    /// fatal; session failures are fatal only under
    /// `SessionFailurePolicy::Exit`.
    pub fn serve(&mut self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept()? {
                Accepted::Connection(stream, peer) => {
                    info!(peer = %peer.ip(), "Accepted connection");
                    self.handle(stream, peer)?;
                }
                Accepted::Shutdown => {
                    info!(sessions = self.sessions, "Shutdown requested, accept loop stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Serve one connection and apply the session failure policy.
    pub fn handle<S: Read + Write>(
        &mut self,
        stream: S,
        peer: SocketAddr,
    ) -> Result<Option<SessionReport>, ServerError> {
        let mut session = Session::new(stream, peer, &mut self.buffer, &self.store);
        let result = session.run();
        let state = session.state();
        session.close();

        match result {
            Ok(report) => {
                self.sessions += 1;
                Ok(Some(report))
            }
            Err(e) => match self.policy {
                SessionFailurePolicy::Isolate => {
                    warn!(
                        peer = %peer,
                        state = ?state,
                        error = %e,
                        "Session failed, connection dropped"
                    );
                    Ok(None)
                }
                SessionFailurePolicy::Exit => Err(e.into()),
            },
        }
    }

    /// Close the listening socket and delete the log file.
    pub fn shutdown(self) {
        let Server {
            listener, store, ..
        } = self;
        drop(listener);

        match store.remove() {
            Ok(true) => info!(path = %store.path().display(), "Removed data file"),
            Ok(false) => {}
            Err(e) => warn!(path = %store.path().display(), error = %e, "Failed to remove data file"),
        }
    }
}

/// Run the server described by `config` until a signal requests shutdown.
///
/// Fatal errors are returned to the caller, which logs them once.
pub fn run(config: Config) -> Result<(), ServerError> {
    // handlers go in before anything else so a signal during setup or
    // detach is queued rather than killing the process
    let signals = register_signals()?;

    let bound = BoundSocket::bind(&config.listen)?;

    if config.daemon {
        detach()?;
    }

    let listener = bound.listen(config.backlog)?;
    info!(address = %listener.local_addr(), backlog = config.backlog, "Server listening");

    let _signals = signals.start(listener.shutdown_handle())?;

    let store = LogStore::new(&config.data_file).with_chunk_size(config.initial_buffer_size);
    let mut server = Server::new(
        listener,
        store,
        config.initial_buffer_size,
        config.session_failures,
    );

    server.serve()?;
    server.shutdown();
    Ok(())
}
