//! Keyboard input.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};

/// Source of key presses.
pub trait InputSource {
    /// Waits up to `timeout` for a key press.
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>>;
}

/// Reads key presses from the terminal.
#[derive(Debug, Default)]
pub struct CrosstermInput;

impl InputSource for CrosstermInput {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            // Windows reports releases too.
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
            // Resizes are picked up by the renderer's size check.
            _ => Ok(None),
        }
    }
}
