//! Column layout ("indentation") of the process table.
//!
//! The layout depends on the mode, the display flags, whether OS statistics
//! are available and the longest database name. The poll cycle recomputes
//! it after a mode switch or a terminal resize; the renderer only reads it.

use crate::config::DisplayFlags;
use crate::mode::Mode;

const DATABASE_MIN_WIDTH: usize = 8;
const DATABASE_MAX_WIDTH: usize = 16;

/// Table column. `Query` always comes last and takes the remaining width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Pid,
    Database,
    AppName,
    User,
    Client,
    Cpu,
    Mem,
    Read,
    Write,
    Relation,
    LockType,
    LockMode,
    Time,
    Wait,
    IoWait,
    State,
    Query,
}

impl Column {
    pub fn title(&self) -> &'static str {
        match self {
            Column::Pid => "PID",
            Column::Database => "DATABASE",
            Column::AppName => "APP",
            Column::User => "USER",
            Column::Client => "CLIENT",
            Column::Cpu => "CPU%",
            Column::Mem => "MEM%",
            Column::Read => "READ/s",
            Column::Write => "WRITE/s",
            Column::Relation => "RELATION",
            Column::LockType => "TYPE",
            Column::LockMode => "MODE",
            Column::Time => "TIME+",
            Column::Wait => "W",
            Column::IoWait => "IOW",
            Column::State => "STATE",
            Column::Query => "QUERY",
        }
    }

    fn width(&self) -> u16 {
        match self {
            Column::Pid => 7,
            Column::Database => DATABASE_MIN_WIDTH as u16,
            Column::AppName => 16,
            Column::User => 16,
            Column::Client => 16,
            Column::Cpu | Column::Mem => 6,
            Column::Read | Column::Write => 9,
            Column::Relation => 9,
            Column::LockType => 16,
            Column::LockMode => 16,
            Column::Time => 9,
            Column::Wait => 2,
            Column::IoWait => 4,
            Column::State => 19,
            Column::Query => 0,
        }
    }
}

/// Computed column layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indent {
    /// Fixed-width columns in display order; `Query` follows them.
    pub columns: Vec<(Column, u16)>,
}

impl Indent {
    pub fn compute(
        mode: Mode,
        flags: &DisplayFlags,
        local_access: bool,
        max_name_length: usize,
    ) -> Self {
        let mut columns = vec![Column::Pid];

        let identity = [
            (flags.database, Column::Database),
            (flags.app_name, Column::AppName),
            (flags.user, Column::User),
            (flags.client, Column::Client),
        ];
        columns.extend(identity.iter().filter(|(on, _)| *on).map(|(_, c)| *c));

        match mode {
            Mode::Activities => {
                if local_access {
                    let os = [
                        (flags.cpu, Column::Cpu),
                        (flags.mem, Column::Mem),
                        (flags.read, Column::Read),
                        (flags.write, Column::Write),
                    ];
                    columns.extend(os.iter().filter(|(on, _)| *on).map(|(_, c)| *c));
                }
                if flags.time {
                    columns.push(Column::Time);
                }
                if flags.wait {
                    columns.push(Column::Wait);
                }
                if local_access {
                    columns.push(Column::IoWait);
                }
            }
            Mode::Waiting | Mode::Blocking => {
                columns.extend([Column::Relation, Column::LockType, Column::LockMode]);
                if flags.time {
                    columns.push(Column::Time);
                }
            }
        }
        columns.push(Column::State);

        let database_width = max_name_length.clamp(DATABASE_MIN_WIDTH, DATABASE_MAX_WIDTH) as u16;
        let columns = columns
            .into_iter()
            .map(|c| match c {
                Column::Database => (c, database_width),
                _ => (c, c.width()),
            })
            .collect();

        Self { columns }
    }

    /// Returns `true` if `column` is part of the layout.
    pub fn has(&self, column: Column) -> bool {
        column == Column::Query || self.columns.iter().any(|(c, _)| *c == column)
    }
}
