//! ratatui renderer.

use std::io::{self, Stdout};

use chrono::Local;
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect, Size};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use crate::layout::Column;
use crate::mode::Mode;
use crate::model::{ProcessRow, RenderBuffer};

use super::Renderer;
use super::format::{format_bytes, format_bytes_rate, format_duration, normalize_query, truncate};
use super::style::Styles;

/// Draws on stdout; the terminal mode itself is owned by `ScreenGuard`.
pub struct TuiRenderer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    last_size: Option<Size>,
}

impl TuiRenderer {
    pub fn new() -> io::Result<Self> {
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok(Self {
            terminal,
            last_size: None,
        })
    }
}

impl Renderer for TuiRenderer {
    fn render(&mut self, buffer: &RenderBuffer) -> io::Result<()> {
        self.last_size = Some(self.terminal.size()?);
        self.terminal.draw(|frame| draw(frame, buffer))?;
        Ok(())
    }

    fn check_resized(&mut self) -> io::Result<bool> {
        let size = self.terminal.size()?;
        Ok(self.last_size.is_some_and(|last| last != size))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.last_size = None;
        self.terminal.clear()
    }
}

/// Draws one buffer into `frame`.
pub fn draw(frame: &mut Frame, buffer: &RenderBuffer) {
    let header = header_lines(buffer);
    let chunks = Layout::vertical([
        Constraint::Length(header.len() as u16),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(frame.area());

    frame.render_widget(Paragraph::new(header), chunks[0]);
    frame.render_widget(Paragraph::new(tabs_line(buffer.mode)), chunks[1]);
    render_table(frame, chunks[2], buffer);
}

fn header_lines(buffer: &RenderBuffer) -> Vec<Line<'static>> {
    let extras = &buffer.extras;
    let db = &buffer.db_info;

    let mut lines = vec![Line::from(vec![
        Span::styled(extras.server_identity.clone(), Styles::label()),
        Span::raw(" - "),
        Span::raw(extras.connection_identity.clone()),
        Span::raw(" - "),
        Span::styled(Local::now().format("%H:%M:%S").to_string(), Styles::dim()),
    ])];

    if let Some(host) = &extras.remote_host {
        lines.push(Line::from(vec![
            Span::styled("Remote host: ", Styles::label()),
            Span::raw(host.clone()),
            Span::styled(" (no OS statistics)", Styles::dim()),
        ]));
    }

    lines.push(Line::from(vec![
        Span::styled(" Size: ", Styles::label()),
        Span::raw(format_bytes(db.total_size)),
        Span::raw(format!(" - {}/s", format_bytes(db.size_evolution as i64))),
        Span::styled(" | TPS: ", Styles::label()),
        Span::raw(format!("{:.0}", db.tps)),
        Span::styled(" | Active connections: ", Styles::label()),
        Span::raw(buffer.active_connections.to_string()),
    ]));

    if extras.remote_host.is_none() {
        let (read, write) = match buffer.io {
            Some(io) => (
                format_bytes_rate(io.read_per_sec),
                format_bytes_rate(io.write_per_sec),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        lines.push(Line::from(vec![
            Span::styled(" Read: ", Styles::label()),
            Span::styled(read, Styles::disk()),
            Span::styled(" | Write: ", Styles::label()),
            Span::styled(write, Styles::disk()),
        ]));
    }

    lines
}

fn tabs_line(active: Mode) -> Line<'static> {
    let spans = Mode::all().iter().flat_map(|mode| {
        let style = if *mode == active {
            Styles::tab_active()
        } else {
            Styles::tab_inactive()
        };
        [
            Span::styled(format!("F{} {}", mode.key(), mode.name()), style),
            Span::raw("  "),
        ]
    });
    Line::from(spans.collect::<Vec<_>>())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Y" } else { "N" }
}

/// Text of one cell; OS columns show `-` when the row has no statistics.
pub fn cell_text(column: Column, width: u16, row: &ProcessRow) -> String {
    let b = &row.backend;
    let os = row.os.as_ref();
    let lock = b.lock.as_ref();
    let dash = || "-".to_string();

    let text = match column {
        Column::Pid => b.pid.to_string(),
        Column::Database => b.database.clone(),
        Column::AppName => b.application_name.clone(),
        Column::User => b.user.clone(),
        Column::Client => b.client.clone(),
        Column::Cpu => os.map_or_else(dash, |o| format!("{:.1}", o.cpu_percent)),
        Column::Mem => os.map_or_else(dash, |o| format!("{:.1}", o.mem_percent)),
        Column::Read => os.map_or_else(dash, |o| format_bytes_rate(o.read_per_sec)),
        Column::Write => os.map_or_else(dash, |o| format_bytes_rate(o.write_per_sec)),
        Column::Relation => lock.map_or_else(dash, |l| l.relation.clone()),
        Column::LockType => lock.map_or_else(dash, |l| l.lock_type.clone()),
        Column::LockMode => lock.map_or_else(dash, |l| l.mode.clone()),
        Column::Time => format_duration(b.duration),
        Column::Wait => yes_no(b.wait).to_string(),
        Column::IoWait => os.map_or_else(dash, |o| yes_no(o.io_wait).to_string()),
        Column::State => b.state.clone(),
        Column::Query => return normalize_query(&b.query),
    };
    truncate(&text, width as usize)
}

fn cell_style(column: Column, row: &ProcessRow) -> ratatui::style::Style {
    match column {
        Column::Cpu => Styles::cpu(),
        Column::Mem => Styles::mem(),
        Column::Read | Column::Write => Styles::disk(),
        Column::Time => Styles::duration(row.backend.duration),
        Column::Wait => Styles::flag(row.backend.wait),
        Column::IoWait => Styles::flag(row.os.is_some_and(|o| o.io_wait)),
        Column::State => Styles::state(&row.backend.state),
        _ => Styles::default(),
    }
}

fn render_table(frame: &mut Frame, area: Rect, buffer: &RenderBuffer) {
    let columns = &buffer.indent.columns;

    let header = Row::new(
        columns
            .iter()
            .map(|(c, _)| c.title())
            .chain(std::iter::once(Column::Query.title()))
            .map(|title| Cell::from(title).style(Styles::table_header())),
    )
    .style(Styles::table_header())
    .height(1);

    let rows: Vec<Row> = buffer
        .procs
        .iter()
        .map(|row| {
            let cells = columns
                .iter()
                .map(|&(c, w)| Cell::from(cell_text(c, w, row)).style(cell_style(c, row)))
                .chain(std::iter::once(Cell::from(cell_text(
                    Column::Query,
                    0,
                    row,
                ))));
            Row::new(cells).height(1)
        })
        .collect();

    let mut widths: Vec<Constraint> = columns
        .iter()
        .map(|&(_, w)| Constraint::Length(w))
        .collect();
    widths.push(Constraint::Fill(1));

    let title = format!(" {} ({}) ", buffer.mode.name(), buffer.procs.len());
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::TOP)
                .style(Styles::default()),
        );
    frame.render_widget(table, area);
}
