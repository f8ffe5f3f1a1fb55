//! Tabular data types shared by the colony workspace.
//!
//! This crate contains pure data structures with no simulation logic:
//! the scalar [`Value`] held by agent attributes and table cells, and the
//! row-oriented [`Table`] used for bulk loading and exporting agents.

pub mod table;
pub mod value;

#[cfg(feature = "test-fixtures")]
pub mod fixtures;

pub use table::{Record, RowView, Table, TableError};
pub use value::{FromValue, Value};
