//! Terminal mode ownership.
//!
//! [`ScreenGuard`] is the single choke point for leaving raw mode and the
//! alternate screen. It is shared (`Arc`) between the controller, the
//! signal handler and the panic hook; whichever calls
//! [`ScreenGuard::release`] first restores the terminal, later calls are
//! no-ops.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use tracing::{debug, warn};

/// Terminal mode switch.
pub trait Screen: Send + Sync {
    fn enter(&self) -> io::Result<()>;
    fn leave(&self) -> io::Result<()>;
}

/// Raw mode plus alternate screen on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermScreen;

impl Screen for CrosstermScreen {
    fn enter(&self) -> io::Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Hide)
    }

    fn leave(&self) -> io::Result<()> {
        // Both steps run even if the first one fails.
        let screen = execute!(io::stdout(), LeaveAlternateScreen, Show);
        let raw = disable_raw_mode();
        screen.and(raw)
    }
}

/// Tracks whether the terminal mode is held.
pub struct ScreenGuard {
    screen: Box<dyn Screen>,
    active: AtomicBool,
}

impl ScreenGuard {
    pub fn new(screen: impl Screen + 'static) -> Self {
        Self {
            screen: Box::new(screen),
            active: AtomicBool::new(false),
        }
    }

    /// Enters terminal mode unless already held.
    pub fn acquire(&self) -> io::Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.screen.enter() {
            // Undo whatever part of the switch succeeded.
            self.release();
            return Err(e);
        }
        debug!("terminal mode acquired");
        Ok(())
    }

    /// Leaves terminal mode if held. Returns `true` if this call released
    /// it. Safe to call from any thread, any number of times.
    pub fn release(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Err(e) = self.screen.leave() {
            warn!("failed to restore terminal: {}", e);
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        self.release();
    }
}
