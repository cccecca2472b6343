//! Background detach.

use crate::error::ServerError;
use std::io;
use tracing::info;

/// Detach from the controlling terminal and continue in the background.
///
/// The calling process exits with status 0 and a child in a new session
/// carries on. The working directory and standard streams are left alone so
/// relative paths and log output behave the same as in the foreground.
///
/// Call before spawning any threads.
pub fn detach() -> Result<(), ServerError> {
    // SAFETY: daemon(3) forks; the process is still single-threaded here.
    let rc = unsafe { libc::daemon(1, 1) };
    if rc == -1 {
        return Err(ServerError::Detach(io::Error::last_os_error()));
    }

    info!(pid = std::process::id(), "Detached into background");
    Ok(())
}
