//! Terminal user interface: renderer, key bindings, terminal mode and the
//! password prompt.

pub mod event;
mod format;
pub mod input;
pub mod prompt;
pub mod render;
pub mod screen;
mod style;

use std::io;

use crate::model::RenderBuffer;

pub use event::{CrosstermInput, InputSource};
pub use input::{KeyAction, handle_key};
pub use prompt::TerminalPrompt;
pub use render::TuiRenderer;
pub use screen::{CrosstermScreen, Screen, ScreenGuard};

/// Draws render buffers.
pub trait Renderer {
    fn render(&mut self, buffer: &RenderBuffer) -> io::Result<()>;

    /// Returns `true` if the terminal size changed since the last render.
    fn check_resized(&mut self) -> io::Result<bool>;

    /// Forces a full redraw on the next render, after the terminal mode was
    /// re-entered.
    fn clear(&mut self) -> io::Result<()> {
        Ok(())
    }
}
