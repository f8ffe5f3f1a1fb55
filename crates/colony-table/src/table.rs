//! Row-oriented tables.
//!
//! A `Table` is a list of named columns and a list of rows, one row per agent.
//! It is what bulk loads consume and what exports produce. On disk a table is
//! JSON Lines: one object per row, keys in column order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::Value;

/// A single row keyed by column name, in column order.
pub type Record = IndexMap<String, Value>;

/// Errors raised while building or reading tables.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("row has {actual} values but the table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },
    #[error("record is missing column '{0}'")]
    MissingColumn(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named columns plus row-major values.
///
/// Every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "TableData")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Unchecked serde shape of a [`Table`]
#[derive(Deserialize)]
struct TableData {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<TableData> for Table {
    type Error = TableError;

    fn try_from(data: TableData) -> Result<Self, Self::Error> {
        let mut table = Table::new(data.columns)?;
        for row in data.rows {
            table.push_row(row)?;
        }
        Ok(table)
    }
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if names.contains(&column) {
                return Err(TableError::DuplicateColumn(column));
            }
            names.push(column);
        }
        Ok(Self {
            columns: names,
            rows: Vec::new(),
        })
    }

    /// Build a table from records. Columns are taken from the first record;
    /// every later record must carry the same keys (in any order).
    pub fn from_records<I>(records: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut records = records.into_iter();
        let Some(first) = records.next() else {
            return Ok(Self::default());
        };
        let mut table = Self::new(first.keys().cloned())?;
        table.push_record(&first)?;
        for record in records {
            table.push_record(&record)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row given in column order.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a row given by name. Extra keys are rejected.
    pub fn push_record(&mut self, record: &Record) -> Result<(), TableError> {
        if let Some(extra) = record.keys().find(|k| !self.has_column(k)) {
            return Err(TableError::UnknownColumn(extra.clone()));
        }
        let row = self
            .columns
            .iter()
            .map(|c| {
                record
                    .get(c)
                    .cloned()
                    .ok_or_else(|| TableError::MissingColumn(c.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, index: usize) -> Option<RowView<'_>> {
        self.rows.get(index).map(|values| RowView {
            columns: &self.columns,
            values,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(move |values| RowView {
            columns: &self.columns,
            values,
        })
    }

    /// Cell at (`row`, `column`)
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, TableError> {
        let col = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        Ok(self.rows.iter().filter_map(|r| r.get(col)).collect())
    }

    /// Rows whose `column` equals `value`, e.g. the rows of one scenario in a
    /// table shared by several scenarios.
    pub fn filter_eq(&self, column: &str, value: &Value) -> Result<Table, TableError> {
        let col = self
            .column_index(column)
            .ok_or_else(|| TableError::UnknownColumn(column.to_string()))?;
        Ok(Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.get(col) == Some(value))
                .cloned()
                .collect(),
        })
    }

    /// Append all rows of `other`, which must have identical columns.
    pub fn extend(&mut self, other: Table) -> Result<(), TableError> {
        if let Some(missing) = other.columns.iter().find(|c| !self.has_column(c)) {
            return Err(TableError::UnknownColumn(missing.clone()));
        }
        for row in other.rows() {
            self.push_record(&row.to_record())?;
        }
        Ok(())
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows().map(|r| r.to_record()).collect()
    }

    /// Serialize as JSON Lines.
    pub fn to_jsonl(&self) -> Result<String, TableError> {
        let mut out = String::new();
        for row in self.rows() {
            out.push_str(&serde_json::to_string(&row.to_record())?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse JSON Lines. Blank lines are skipped.
    pub fn from_jsonl(content: &str) -> Result<Table, TableError> {
        let records = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<Record>(line).map_err(|source| TableError::Json {
                    line: i + 1,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Table::from_records(records)
    }

    /// Write the table to `path` as JSON Lines, replacing any existing file.
    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        for row in self.rows() {
            serde_json::to_writer(&mut writer, &row.to_record())?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a JSON Lines file.
    pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Table, TableError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<Record>(&line).map_err(|source| {
                TableError::Json {
                    line: i + 1,
                    source,
                }
            })?;
            records.push(record);
        }
        Table::from_records(records)
    }
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// `(column, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn to_record(&self) -> Record {
        self.iter()
            .map(|(c, v)| (c.to_string(), v.clone()))
            .collect()
    }
}
