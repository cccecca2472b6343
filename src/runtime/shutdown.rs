//! Cooperative shutdown.
//!
//! `ShutdownHandle` is the cancellation signal for the accept loop: a shared
//! flag plus a mio waker that interrupts a blocked `poll`. SIGINT and SIGTERM
//! handlers are registered first, before any detach, and a dedicated thread
//! started later drains them through signal-hook and requests shutdown
//! through the handle. The serving thread only observes the flag
//! between sessions or while waiting for a connection, so a session in
//! progress always finishes.

use crate::error::ServerError;
use mio::Waker;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Shared shutdown request flag with a waker for the accept loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub(crate) fn new(waker: Arc<Waker>) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    /// Request shutdown and wake the accept loop. Idempotent.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake accept loop");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// SIGINT/SIGTERM handlers installed, but not yet routed anywhere.
///
/// Signals that arrive before `start` are queued and delivered once the
/// listener thread runs.
pub struct SignalRegistration {
    signals: Signals,
}

/// Install handlers for SIGINT and SIGTERM.
///
/// Installs no thread, so it is safe to call before a background detach.
pub fn register_signals() -> Result<SignalRegistration, ServerError> {
    let signals = Signals::new([SIGINT, SIGTERM]).map_err(ServerError::Signals)?;
    Ok(SignalRegistration { signals })
}

impl SignalRegistration {
    /// Spawn the thread that turns queued and future signals into shutdown
    /// requests. Must run after any detach: threads do not survive a fork.
    pub fn start(self, shutdown: ShutdownHandle) -> Result<SignalListener, ServerError> {
        let mut signals = self.signals;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(signal, "Caught signal, exiting");
                    shutdown.request();
                }
            })
            .map_err(ServerError::Signals)?;

        Ok(SignalListener {
            handle,
            thread: Some(thread),
        })
    }
}

/// Background thread turning SIGINT/SIGTERM into shutdown requests.
///
/// Dropping it stops the thread.
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Serializes tests that raise process-wide signals.
#[cfg(test)]
pub(crate) static SIGNAL_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
