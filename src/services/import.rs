use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read spreadsheet: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("could not read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("the file contains no sheets")]
    NoSheet,

    #[error("the file has no data rows")]
    Empty,
}

/// One spreadsheet row keyed by its header cell.
#[derive(Debug, Clone, Default)]
pub struct ImportRow(HashMap<String, String>);

impl ImportRow {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Trimmed cell value; blank cells read as absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

fn zip_row(headers: &[String], cells: impl Iterator<Item = String>) -> ImportRow {
    ImportRow(
        headers
            .iter()
            .cloned()
            .zip(cells)
            .filter(|(h, _)| !h.is_empty())
            .collect(),
    )
}

/// Parses an uploaded `.xlsx`/`.xls`/`.ods` workbook (first sheet) or a CSV
/// file. The first row holds the column names.
pub fn parse_rows(file_name: &str, bytes: Vec<u8>) -> Result<Vec<ImportRow>, ImportError> {
    let rows = if file_name.to_lowercase().ends_with(".csv") {
        parse_csv(&bytes)?
    } else {
        parse_workbook(bytes)?
    };
    if rows.is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(rows)
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(zip_row(&headers, record.iter().map(str::to_string)));
    }
    Ok(rows)
}

fn parse_workbook(bytes: Vec<u8>) -> Result<Vec<ImportRow>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(ImportError::NoSheet)??;

    let mut lines = range.rows();
    let Some(header_row) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row.iter().map(|c| cell_text(c).trim().to_string()).collect();

    Ok(lines
        .map(|cells| zip_row(&headers, cells.iter().map(cell_text)))
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Phone numbers typed into Excel come back as floats.
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}
