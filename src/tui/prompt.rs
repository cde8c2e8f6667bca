//! Interactive password prompt.

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::config::ConnectionParams;
use crate::session::PasswordPrompt;

/// Reads a password from the terminal without echo.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

/// What a key does to the password being typed.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
    Cancelled,
}

fn apply_key(password: &mut String, key: KeyEvent) -> Step {
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('d')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Step::Cancelled
        }
        KeyCode::Esc => Step::Cancelled,
        KeyCode::Enter => Step::Done,
        KeyCode::Backspace => {
            password.pop();
            Step::Continue
        }
        KeyCode::Char(c) => {
            password.push(c);
            Step::Continue
        }
        _ => Step::Continue,
    }
}

fn read_password() -> io::Result<String> {
    let mut password = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match apply_key(&mut password, key) {
            Step::Continue => {}
            Step::Done => return Ok(password),
            Step::Cancelled => {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "password prompt cancelled",
                ));
            }
        }
    }
}

impl PasswordPrompt for TerminalPrompt {
    fn prompt(&mut self, params: &ConnectionParams) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "Password for {}: ", params.identity())?;
        stderr.flush()?;

        enable_raw_mode()?;
        let result = read_password();
        let restored = disable_raw_mode();
        writeln!(stderr)?;

        let password = result?;
        restored?;
        Ok(password)
    }
}
