//! JSON-lines snapshot export.
//!
//! Every completed cycle appends one object per displayed row:
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00+02:00","mode":"activities","pid":4242,...,"os":{...}}
//! ```

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::Local;
use serde::Serialize;

use crate::mode::Mode;
use crate::model::{ProcessRow, RenderBuffer};

#[derive(Serialize)]
struct Record<'a> {
    timestamp: &'a str,
    mode: Mode,
    #[serde(flatten)]
    row: &'a ProcessRow,
}

/// Appends snapshots to a writer.
pub struct Exporter {
    out: Box<dyn Write>,
}

impl Exporter {
    /// Opens `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(out: impl Write + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    /// Writes the rows of one completed cycle and flushes.
    pub fn write_snapshot(&mut self, buffer: &RenderBuffer) -> io::Result<()> {
        let timestamp = Local::now().to_rfc3339();
        for row in &buffer.procs {
            let record = Record {
                timestamp: &timestamp,
                mode: buffer.mode,
                row,
            };
            serde_json::to_writer(&mut self.out, &record)?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()
    }
}
