//! Snapshot output
//!
//! Append-only JSON Lines logging of exported population tables. Each line is
//! one agent row tagged with the step it was taken at.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

use colony_table::{Record, Table, TableError, Value};

/// Writes population snapshots to a JSONL file
pub struct TableLogger {
    writer: Option<BufWriter<File>>,
    rows_written: u64,
    snapshots: u64,
}

impl TableLogger {
    /// Create a logger writing to `path`, truncating any previous run.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            rows_written: 0,
            snapshots: 0,
        })
    }

    /// Create a logger that discards rows (for testing)
    pub fn null() -> Self {
        Self {
            writer: None,
            rows_written: 0,
            snapshots: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    /// Append every row of `table`, prefixed with a `step` column.
    pub fn log_snapshot(&mut self, step: u64, table: &Table) -> Result<(), TableError> {
        self.snapshots += 1;
        for row in table.rows() {
            self.rows_written += 1;
            if let Some(ref mut writer) = self.writer {
                let mut record = Record::with_capacity(table.columns().len() + 1);
                record.insert("step".to_string(), Value::from(step as i64));
                for (column, value) in row.iter() {
                    record.insert(column.to_string(), value.clone());
                }
                let json = serde_json::to_string(&record)?;
                writeln!(writer, "{}", json)?;
            }
        }
        Ok(())
    }

    /// Flush the buffer to disk
    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for TableLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush snapshot log");
        }
    }
}
