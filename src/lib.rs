//! Serial TCP server that logs newline-delimited frames to an append-only
//! file and replays the whole file to each client.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod server;
pub mod session;
pub mod storage;
