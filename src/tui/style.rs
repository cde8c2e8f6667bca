//! Color scheme and styles.

use ratatui::style::{Color, Modifier, Style};

/// Color palette.
pub struct Theme;

impl Theme {
    pub const BG: Color = Color::Reset;
    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;

    pub const HEADER_BG: Color = Color::Blue;
    pub const HEADER_FG: Color = Color::White;

    pub const TAB_ACTIVE: Color = Color::Cyan;
    pub const TAB_INACTIVE: Color = Color::DarkGray;

    pub const WARNING: Color = Color::Yellow;
    pub const CRITICAL: Color = Color::Red;
    pub const OK: Color = Color::Green;

    pub const CPU_COLOR: Color = Color::Cyan;
    pub const MEM_COLOR: Color = Color::Magenta;
    pub const DISK_COLOR: Color = Color::Yellow;
}

/// Pre-defined styles.
pub struct Styles;

impl Styles {
    /// Default text style.
    pub fn default() -> Style {
        Style::default().fg(Theme::FG).bg(Theme::BG)
    }

    /// Table header style.
    pub fn table_header() -> Style {
        Style::default()
            .fg(Theme::HEADER_FG)
            .bg(Theme::HEADER_BG)
            .add_modifier(Modifier::BOLD)
    }

    pub fn tab_active() -> Style {
        Style::default()
            .fg(Theme::TAB_ACTIVE)
            .add_modifier(Modifier::BOLD)
    }

    pub fn tab_inactive() -> Style {
        Style::default().fg(Theme::TAB_INACTIVE)
    }

    /// Dimmed text style.
    pub fn dim() -> Style {
        Style::default().fg(Theme::FG_DIM)
    }

    /// Header labels.
    pub fn label() -> Style {
        Style::default().add_modifier(Modifier::BOLD)
    }

    pub fn cpu() -> Style {
        Style::default().fg(Theme::CPU_COLOR)
    }

    pub fn mem() -> Style {
        Style::default().fg(Theme::MEM_COLOR)
    }

    pub fn disk() -> Style {
        Style::default().fg(Theme::DISK_COLOR)
    }

    /// Backend state: green when active, yellow when idle in transaction,
    /// red when aborted.
    pub fn state(state: &str) -> Style {
        match state {
            "active" => Style::default().fg(Theme::OK),
            "idle in transaction" => Style::default().fg(Theme::WARNING),
            "idle in transaction (aborted)" => Style::default()
                .fg(Theme::CRITICAL)
                .add_modifier(Modifier::BOLD),
            _ => Self::default(),
        }
    }

    /// Query duration: yellow past 1s, red past 5s.
    pub fn duration(seconds: f64) -> Style {
        if seconds >= 5.0 {
            Style::default().fg(Theme::CRITICAL)
        } else if seconds >= 1.0 {
            Style::default().fg(Theme::WARNING)
        } else {
            Style::default().fg(Theme::OK)
        }
    }

    /// Flag cells (`W`, `IOW`).
    pub fn flag(on: bool) -> Style {
        if on {
            Style::default()
                .fg(Theme::CRITICAL)
                .add_modifier(Modifier::BOLD)
        } else {
            Self::dim()
        }
    }
}
