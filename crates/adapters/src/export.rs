use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Number, Value};
use sqlpad_core::fixtures::{CellValue, ResultSet};
use thiserror::Error;

const DEFAULT_EXPORT_STEM: &str = "query-results";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export: the result set has no rows")]
    EmptyResult,
    #[error("unknown export format '{0}', expected csv or json")]
    UnknownFormat(String),
    #[error("failed to write export file at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize JSON export: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(ExportError::UnknownFormat(raw.to_string())),
        }
    }
}

#[must_use]
pub fn suggested_file_name(tab_name: &str, format: ExportFormat) -> PathBuf {
    let stem = tab_name.trim();
    let stem = if stem.is_empty() {
        DEFAULT_EXPORT_STEM
    } else {
        stem
    };
    PathBuf::from(format!("{stem}.{}", format.extension()))
}

/// Writes a result set to `path`; returns the number of rows written.
pub fn export_result(
    path: &Path,
    format: ExportFormat,
    rows: &ResultSet,
) -> Result<usize, ExportError> {
    if rows.is_empty() {
        return Err(ExportError::EmptyResult);
    }

    let content = match format {
        ExportFormat::Csv => render_csv(rows),
        ExportFormat::Json => render_json(rows)?,
    };
    fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })?;

    tracing::info!(
        path = %path.display(),
        format = %format,
        rows = rows.len(),
        "exported result set"
    );
    Ok(rows.len())
}

#[must_use]
pub fn render_csv(rows: &ResultSet) -> String {
    let mut content = String::new();
    content.push_str(
        &rows
            .columns()
            .iter()
            .map(|header| csv_escape(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    content.push('\n');

    for row in rows.rows() {
        let values = row
            .iter()
            .map(|value| match value {
                CellValue::Null => String::new(),
                other => csv_escape(&other.to_string()),
            })
            .collect::<Vec<_>>();
        content.push_str(&values.join(","));
        content.push('\n');
    }
    content
}

pub fn render_json(rows: &ResultSet) -> Result<String, ExportError> {
    let records = rows
        .records()
        .map(|record| {
            let mut object = Map::with_capacity(rows.columns().len());
            for (column, value) in record.iter() {
                object.insert(column.to_string(), json_value(value));
            }
            Value::Object(object)
        })
        .collect::<Vec<_>>();
    Ok(serde_json::to_string_pretty(&records)?)
}

#[allow(clippy::cast_possible_truncation)]
fn json_value(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Bool(flag) => Value::Bool(*flag),
        CellValue::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
            Value::Number(Number::from(*number as i64))
        }
        CellValue::Number(number) => Number::from_f64(*number).map_or(Value::Null, Value::Number),
        CellValue::Text(text) => Value::String(text.clone()),
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
