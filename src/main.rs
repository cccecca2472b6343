//! framelog: a TCP data-logging echo server
//!
//! Each client sends one newline-terminated frame. The server appends it to
//! an append-only data file and replies with the whole file, then closes the
//! connection. Connections are served one at a time.
//!
//! Features:
//! - Frames of any length, assembled in a growable receive buffer
//! - Optional background mode (`-d`)
//! - Graceful shutdown on SIGINT/SIGTERM, removing the data file
//! - Configuration via CLI arguments or TOML file

use framelog::config::Config;
use framelog::error::{ServerError, EXIT_OK};
use framelog::{logging, server};
use std::process;
use tracing::{error, info};

fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(ServerError::from(e).exit_code());
        }
    };

    // Initialize logging
    if let Err(e) = logging::init(&config) {
        eprintln!("{e}");
        process::exit(ServerError::from(e).exit_code());
    }

    info!(
        listen = %config.listen,
        data_file = %config.data_file.display(),
        daemon = config.daemon,
        log = ?config.log_target(),
        session_failures = ?config.session_failures,
        "Starting framelog server"
    );

    match server::run(config) {
        Ok(()) => {
            info!("Shutdown complete");
            process::exit(EXIT_OK);
        }
        Err(e) => {
            let code = e.exit_code();
            error!(error = %e, exit_code = code, "Fatal error");
            process::exit(code);
        }
    }
}
