//! Blocking runtime for the serial accept loop.
//!
//! - `ReceiveBuffer`: growable per-session receive buffer
//! - `Listener`: bind/listen setup and a cancellable accept
//! - `ShutdownHandle`: cooperative cancellation, fed by SIGINT/SIGTERM
//! - `detach`: optional background mode

mod buffer;
mod daemon;
mod listener;
mod shutdown;

pub use buffer::{BufferError, FrameEnd, ReadOutcome, ReceiveBuffer, DELIMITER};
pub use daemon::detach;
pub use listener::{resolve, Accepted, BoundSocket, Listener};
pub use shutdown::{register_signals, ShutdownHandle, SignalListener, SignalRegistration};

#[cfg(test)]
pub(crate) use shutdown::SIGNAL_TEST_LOCK;
