//! Termination signal interception.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::tui::ScreenGuard;

/// Installs the SIGINT/SIGTERM/SIGHUP handler.
///
/// The handler stores `shutdown` and releases the terminal mode; the
/// controller notices the flag at the next cycle boundary and does the rest
/// of the cleanup.
pub fn install_signal_handler(
    shutdown: Arc<AtomicBool>,
    guard: Arc<ScreenGuard>,
) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
        guard.release();
    })?;
    info!("signal handler installed");
    Ok(())
}
