//! Row input from CSV files
//!
//! The first line is the header; every following record becomes one
//! [`RowContext`] with the columns in header order. All values are kept as
//! strings, exactly as written.

use std::io::Read;
use std::path::Path;

use crate::workflow::RowContext;

#[derive(Debug, thiserror::Error)]
pub enum RowsError {
    #[error("Failed to read rows from {file}: {error}")]
    Csv { file: String, error: csv::Error },

    #[error("{file} has no header row")]
    MissingHeader { file: String },
}

/// Read every row of a CSV file
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<RowContext>, RowsError> {
    let path = path.as_ref();
    let file = path.display().to_string();
    let reader = std::fs::File::open(path).map_err(|e| RowsError::Csv {
        file: file.clone(),
        error: e.into(),
    })?;
    parse_rows(reader, &file)
}

/// Parse CSV rows from any reader; `source` names it in errors
pub fn parse_rows<R: Read>(reader: R, source: &str) -> Result<Vec<RowContext>, RowsError> {
    let csv_err = |error: csv::Error| RowsError::Csv {
        file: source.to_string(),
        error,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader.headers().map_err(csv_err)?.clone();
    if headers.is_empty() {
        return Err(RowsError::MissingHeader {
            file: source.to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .collect::<RowContext>(),
        );
    }
    Ok(rows)
}
