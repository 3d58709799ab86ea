//! NDJSON (newline-delimited JSON) stream sink.
//!
//! Each row is serialized straight into the buffered writer, no intermediate
//! `String`.
//!
//! ```ignore
//! let mut sink = JsonStreamSink::stdout();
//! sink.write_report(&report)?;
//! sink.finish()?;
//! ```

use crate::reporter::Report;
use serde::Serialize;
use std::io::{self, BufWriter, Write};

pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
    rows_written: usize,
}

impl JsonStreamSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonStreamSink<W> {
    /// Create a sink wrapping any writer (file, Vec<u8>, etc.).
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows_written: 0,
        }
    }

    pub fn write_row<T: Serialize>(&mut self, row: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_rows<T: Serialize>(&mut self, rows: &[T]) -> io::Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Summary row first, then farm rows, then transaction rows.
    pub fn write_report(&mut self, report: &Report) -> io::Result<()> {
        self.write_row(&report.summary_row())?;
        self.write_rows(&report.farm_rows())?;
        self.write_rows(&report.transaction_rows())
    }

    /// Flush and return how many rows were written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}
