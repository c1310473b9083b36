//! Tabular input and output
//!
//! - `rows` - CSV rows into `RowContext`s
//! - `report` - Batch results into CSV and JSON reports

pub mod report;
pub mod rows;

pub use report::{write_csv, write_csv_report, write_json_report, ReportError};
pub use rows::{parse_rows, read_rows, RowsError};
