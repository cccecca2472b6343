//! Error types and process exit statuses.
//!
//! Every fatal condition maps to a stable exit status so operators and
//! supervisors can tell failure classes apart without parsing logs.

use crate::config::ConfigError;
use crate::runtime::BufferError;
use crate::session::SessionError;
use crate::storage::StoreError;
use std::io;
use thiserror::Error;

/// Exit status for a graceful, signal-initiated shutdown.
pub const EXIT_OK: i32 = 0;

/// Top-level server error. Each variant carries a distinct exit status.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to resolve listen address '{addr}': {reason}")]
    AddressResolution { addr: String, reason: String },

    #[error("socket error: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("bind error: {0}")]
    Bind(#[source] io::Error),

    #[error("listen error: {0}")]
    Listen(#[source] io::Error),

    #[error("accept error: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to detach from controlling terminal: {0}")]
    Detach(#[source] io::Error),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ServerError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::Config(_) => 1,
            ServerError::AddressResolution { .. } => 2,
            ServerError::SocketCreate(_) => 3,
            ServerError::Bind(_) => 4,
            ServerError::Listen(_) => 5,
            ServerError::Accept(_) => 6,
            ServerError::Detach(_) => 10,
            ServerError::Signals(_) => 13,
            ServerError::Session(e) => match e {
                SessionError::Buffer(BufferError::Receive(_)) => 7,
                SessionError::Buffer(BufferError::Growth { .. }) => 8,
                SessionError::Store(StoreError::Read { .. }) => 9,
                SessionError::Store(StoreError::Write { .. }) => 11,
                SessionError::Send(_) => 12,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "boom")
    }

    #[test]
    fn test_setup_exit_codes() {
        let resolve = ServerError::AddressResolution {
            addr: "nowhere:9000".to_string(),
            reason: "no addresses".to_string(),
        };
        assert_eq!(resolve.exit_code(), 2);
        assert_eq!(ServerError::SocketCreate(io_err()).exit_code(), 3);
        assert_eq!(ServerError::Bind(io_err()).exit_code(), 4);
        assert_eq!(ServerError::Listen(io_err()).exit_code(), 5);
        assert_eq!(ServerError::Accept(io_err()).exit_code(), 6);
        assert_eq!(ServerError::Detach(io_err()).exit_code(), 10);
        assert_eq!(ServerError::Signals(io_err()).exit_code(), 13);
    }

    #[test]
    fn test_session_exit_codes() {
        let receive: ServerError = SessionError::Buffer(BufferError::Receive(io_err())).into();
        assert_eq!(receive.exit_code(), 7);

        let growth: ServerError =
            SessionError::Buffer(BufferError::Growth { capacity: usize::MAX }).into();
        assert_eq!(growth.exit_code(), 8);

        let read: ServerError = SessionError::Store(StoreError::Read {
            path: "/tmp/x".into(),
            source: io_err(),
        })
        .into();
        assert_eq!(read.exit_code(), 9);

        let write: ServerError = SessionError::Store(StoreError::Write {
            path: "/tmp/x".into(),
            source: io_err(),
        })
        .into();
        assert_eq!(write.exit_code(), 11);

        let send: ServerError = SessionError::Send(io_err()).into();
        assert_eq!(send.exit_code(), 12);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = vec![
            ServerError::Config(ConfigError::Invalid("backlog must be > 0".into())),
            ServerError::AddressResolution {
                addr: String::new(),
                reason: String::new(),
            },
            ServerError::SocketCreate(io_err()),
            ServerError::Bind(io_err()),
            ServerError::Listen(io_err()),
            ServerError::Accept(io_err()),
            ServerError::Detach(io_err()),
            ServerError::Signals(io_err()),
            SessionError::Buffer(BufferError::Receive(io_err())).into(),
            SessionError::Buffer(BufferError::Growth { capacity: 0 }).into(),
            SessionError::Send(io_err()).into(),
        ];

        let mut codes: Vec<i32> = errors.iter().map(ServerError::exit_code).collect();
        assert!(codes.iter().all(|&c| c != EXIT_OK));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
