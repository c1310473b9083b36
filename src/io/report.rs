//! Batch reports
//!
//! CSV report: one record per row with the columns
//! `row_index, status, input_<column>..., error, result, steps`.
//! Input columns are taken from the first row. JSON report: the whole
//! [`BatchResult`], every step outcome included.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::engine::{BatchResult, RowResult};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.<extension>`
pub fn report_path(prefix: &str, extension: &str, at: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.{}",
        prefix,
        at.format("%Y%m%d_%H%M%S"),
        extension
    ))
}

fn ensure_parent(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write the CSV report next to `prefix` and return its path
pub fn write_csv_report(results: &[RowResult], prefix: &str) -> Result<PathBuf, ReportError> {
    let path = report_path(prefix, "csv", Local::now());
    ensure_parent(&path)?;
    let file = std::fs::File::create(&path)?;
    write_csv(file, results)?;
    Ok(path)
}

/// Write the JSON report next to `prefix` and return its path
pub fn write_json_report(batch: &BatchResult, prefix: &str) -> Result<PathBuf, ReportError> {
    let path = report_path(prefix, "json", Local::now());
    ensure_parent(&path)?;
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, batch)?;
    Ok(path)
}

/// Serialize rows as CSV into any writer
pub fn write_csv<W: Write>(writer: W, results: &[RowResult]) -> Result<(), ReportError> {
    let input_columns: Vec<String> = results
        .first()
        .map(|r| r.input_data.keys().map(str::to_string).collect())
        .unwrap_or_default();

    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["row_index".to_string(), "status".to_string()];
    header.extend(input_columns.iter().map(|c| format!("input_{}", c)));
    header.extend(["error", "result", "steps"].map(String::from));
    wtr.write_record(&header)?;

    for row in results {
        let mut record = vec![row.row_index.to_string(), row.status.as_str().to_string()];
        record.extend(
            input_columns
                .iter()
                .map(|c| row.input_data.get(c).unwrap_or_default().to_string()),
        );
        if row.is_success() {
            record.push(String::new());
            record.push(row.summary());
        } else {
            record.push(row.error_message.clone().unwrap_or_default());
            record.push(String::new());
        }
        record.push(row.step_fates());
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
