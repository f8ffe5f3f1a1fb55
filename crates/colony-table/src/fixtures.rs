//! Sample data fixtures for testing.
//!
//! Enable the `test-fixtures` feature to access these helpers.
//!
//! ```ignore
//! // [dev-dependencies]
//! // colony-table = { path = "../colony-table", features = ["test-fixtures"] }
//!
//! use colony_table::fixtures;
//!
//! let table = fixtures::trader_params();
//! ```

use crate::{Table, Value};

/// Initial trader parameters for two scenarios.
///
/// Contains 8 rows: scenario 0 has ids 0..=4, scenario 1 has ids 0..=2.
/// Columns: `id_scenario`, `id`, `account`, `productivity`.
pub fn trader_params() -> Table {
    let jsonl = include_str!("../tests/fixtures/trader_params.jsonl");
    Table::from_jsonl(jsonl)
        .unwrap_or_else(|e| panic!("Failed to parse trader_params.jsonl: {}", e))
}

/// Rows of [`trader_params`] belonging to one scenario.
pub fn trader_params_for(scenario: i64) -> Table {
    trader_params()
        .filter_eq("id_scenario", &Value::Int(scenario))
        .unwrap_or_else(|e| panic!("Failed to filter trader_params: {}", e))
}
