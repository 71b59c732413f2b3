//! Whole-file tabular reads.
//!
//! Delimited text (`.csv`, `.tsv`, `.txt`, optionally gzipped) goes through
//! `csv`; workbooks (`.xlsx`, `.xlsm`, `.xls`, `.ods`) through `calamine`.
//! Every cell ends up as an optional trimmed string; blanks and the usual
//! missing tokens (`NA`, `NaN`, `#N/A`) become `None`.

use calamine::{open_workbook_auto, DataType, Reader};
use chrono::{Duration, NaiveDate};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::pipeline::reader::{inner_extension, open_text_reader};

const MISSING_TOKENS: [&str; 6] = ["na", "nan", "#n/a", "n/a", "null", "-"];

/// A rectangular table of optional string cells with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            // Fully blank rows are spreadsheet padding.
            .filter(|row| row.iter().any(Option::is_some))
            .collect();
        Self { headers, rows }
    }

    /// Index of a column by case-insensitive header name.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.find_column(name).ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "column '{}' not found (available: {})",
                name,
                self.headers.join(", ")
            ))
        })
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read a table, choosing the parser from the file extension.
pub fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<Sheet> {
    let ext = inner_extension(path).unwrap_or_default();
    let table = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path, sheet)?,
        "tsv" | "txt" | "tab" => read_delimited(path, b'\t')?,
        "csv" => read_delimited(path, b',')?,
        other => {
            return Err(PipelineError::InvalidInput(format!(
                "unsupported table format '{}' for {}",
                other,
                path.display()
            )))
        }
    };

    if table.headers.is_empty() {
        return Err(PipelineError::InvalidInput(format!(
            "{} has no header row",
            path.display()
        )));
    }

    log::debug!(
        "Read {} rows x {} columns from {}",
        table.len(),
        table.headers.len(),
        path.display()
    );
    Ok(table)
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Sheet> {
    let reader = open_text_reader(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(normalize_cell).collect());
    }

    Ok(Sheet::new(headers, rows))
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<Sheet> {
    let mut wb = open_workbook_auto(path)
        .map_err(|e| PipelineError::Spreadsheet(format!("{}: {}", path.display(), e)))?;

    let range = match sheet {
        Some(name) => wb.worksheet_range(name),
        None => wb.worksheet_range_at(0),
    }
    .ok_or_else(|| {
        PipelineError::Spreadsheet(format!(
            "worksheet {} missing in {}",
            sheet.unwrap_or("#0"),
            path.display()
        ))
    })?
    .map_err(|e| PipelineError::Spreadsheet(format!("{}: {}", path.display(), e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| PipelineError::Spreadsheet(format!("empty sheet in {}", path.display())))?
        .iter()
        .map(|c| cell_to_string(c).unwrap_or_default())
        .collect();

    let body = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Ok(Sheet::new(headers, body))
}

fn cell_to_string(cell: &DataType) -> Option<String> {
    match cell {
        DataType::String(s) => normalize_cell(s),
        DataType::Float(f) => Some(format_number(*f)),
        DataType::Int(i) => Some(i.to_string()),
        DataType::Bool(b) => Some(b.to_string()),
        DataType::DateTime(serial) => Some(excel_serial_to_date(*serial)),
        DataType::DateTimeIso(s) => normalize_cell(s),
        _ => None,
    }
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || MISSING_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Integral floats print without a fractional part so numeric ids survive.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Excel day serials count from 1899-12-30.
fn excel_serial_to_date(serial: f64) -> String {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(serial.floor() as i64)))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format_number(serial))
}
