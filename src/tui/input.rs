//! Keybindings.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::mode::Mode;

/// Result of handling a key event.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Unbound key.
    None,
    /// Quit the application.
    Quit,
    /// Show another data view.
    SwitchMode(Mode),
    /// Stop or resume polling.
    TogglePause,
    /// Lengthen the refresh delay.
    SlowDown,
    /// Shorten the refresh delay.
    SpeedUp,
}

/// Maps a key press to an action.
pub fn handle_key(key: KeyEvent) -> KeyAction {
    match key.code {
        // Raw mode delivers Ctrl-C as a key, not as SIGINT.
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyAction::Quit,

        KeyCode::F(1) | KeyCode::Char('1') => KeyAction::SwitchMode(Mode::Activities),
        KeyCode::F(2) | KeyCode::Char('2') => KeyAction::SwitchMode(Mode::Waiting),
        KeyCode::F(3) | KeyCode::Char('3') => KeyAction::SwitchMode(Mode::Blocking),

        KeyCode::Char(' ') | KeyCode::Char('p') => KeyAction::TogglePause,
        KeyCode::Char('+') => KeyAction::SlowDown,
        KeyCode::Char('-') => KeyAction::SpeedUp,

        _ => KeyAction::None,
    }
}
