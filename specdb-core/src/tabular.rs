//! CSV and XLSX tables
//!
//! Imports and exports move data as a header row plus text cells. Reading
//! uses `csv` and `calamine`; writing XLSX uses `rust_xlsxwriter`.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use calamine::{DataType, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Errors reading or writing tables.
#[derive(Debug, thiserror::Error)]
pub enum TabularError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read Excel file: {0}")]
    XlsxRead(String),

    #[error("failed to write Excel file: {0}")]
    XlsxWrite(#[from] XlsxError),

    #[error("workbook has no worksheets")]
    NoWorksheet,

    #[error("file has no header row")]
    Empty,

    #[error("unsupported file type '{0}' (expected .csv or .xlsx)")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// File formats for import and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    Csv,
    Xlsx,
}

impl TabularFormat {
    /// Guess from a file name's extension.
    pub fn from_filename(name: &str) -> Result<Self, TabularError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        ext.parse()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl FromStr for TabularFormat {
    type Err = TabularError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(TabularError::UnsupportedFormat(other.to_owned())),
        }
    }
}

impl fmt::Display for TabularFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Header row plus text cells. Every row has one cell per header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column(column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Overwrite one cell, adding the column if it doesn't exist yet.
    /// Returns `false` when `row` is out of range.
    pub fn set_cell(&mut self, row: usize, column: &str, value: impl Into<String>) -> bool {
        if row >= self.rows.len() {
            return false;
        }
        let col = match self.column(column) {
            Some(col) => col,
            None => {
                self.headers.push(column.to_owned());
                for r in &mut self.rows {
                    r.push(String::new());
                }
                self.headers.len() - 1
            }
        };
        self.rows[row][col] = value.into();
        true
    }

    /// Row `index` as a record. Blank cells are omitted.
    pub fn record(&self, index: usize) -> Option<Record> {
        let row = self.rows.get(index)?;
        Some(
            self.headers
                .iter()
                .zip(row)
                .map(|(h, v)| (h.as_str(), v.trim()))
                .collect(),
        )
    }

    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.rows.len()).filter_map(|i| self.record(i))
    }

    /// Build a table with `headers` from records; missing fields are blank.
    pub fn from_records<'a>(headers: Vec<String>, records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut table = Self::new(headers);
        for record in records {
            let row = table
                .headers
                .iter()
                .map(|h| record.get(h).unwrap_or_default().to_owned())
                .collect();
            table.rows.push(row);
        }
        table
    }

    /// Parse `bytes` in `format`.
    pub fn read(bytes: &[u8], format: TabularFormat) -> Result<Self, TabularError> {
        match format {
            TabularFormat::Csv => Self::read_csv(bytes),
            TabularFormat::Xlsx => Self::read_xlsx(bytes),
        }
    }

    pub fn read_csv(bytes: &[u8]) -> Result<Self, TabularError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(TabularError::Empty);
        }

        let mut table = Self::new(headers);
        for result in reader.records() {
            let record = result?;
            let row: Vec<String> = record.iter().map(str::to_owned).collect();
            if row.iter().any(|c| !c.is_empty()) {
                table.push_row(row);
            }
        }
        Ok(table)
    }

    /// Read the first worksheet.
    pub fn read_xlsx(bytes: &[u8]) -> Result<Self, TabularError> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
            .map_err(|e| TabularError::XlsxRead(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(TabularError::NoWorksheet)?
            .map_err(|e| TabularError::XlsxRead(e.to_string()))?;

        let mut rows = range.rows().map(|row| {
            row.iter()
                .map(|cell| {
                    cell.as_string()
                        .unwrap_or_else(|| cell.to_string())
                        .trim()
                        .to_owned()
                })
                .collect::<Vec<String>>()
        });

        let headers = rows.next().ok_or(TabularError::Empty)?;
        let mut table = Self::new(headers);
        for row in rows {
            if row.iter().any(|c| !c.is_empty()) {
                table.push_row(row);
            }
        }
        Ok(table)
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, TabularError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| TabularError::Io(e.into_error()))
    }

    /// One worksheet named `sheet`, bold header row.
    pub fn to_xlsx(&self, sheet: &str) -> Result<Vec<u8>, TabularError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet)?;

        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &bold)?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    worksheet.write_string(i as u32 + 1, col as u16, value)?;
                }
            }
        }
        Ok(workbook.save_to_buffer()?)
    }

    /// Serialize in `format`.
    pub fn to_bytes(&self, format: TabularFormat, sheet: &str) -> Result<Vec<u8>, TabularError> {
        match format {
            TabularFormat::Csv => self.to_csv(),
            TabularFormat::Xlsx => self.to_xlsx(sheet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_csv_with_bom_and_ragged_rows() {
        let data = "\u{feff}year,locality,specimenNumber\n2023, KL ,1\n2024,FLP\n,,\n";
        let table = Table::read_csv(data.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["year", "locality", "specimenNumber"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "locality"), Some("KL"));
        assert_eq!(table.cell(1, "specimenNumber"), Some(""));
    }

    #[test]
    fn xlsx_round_trip_keeps_text() {
        let mut table = Table::new(vec!["catalogNumber".into(), "specimenNumber".into()]);
        table.push_row(vec!["2023-KL-0001".into(), "0001".into()]);
        table.push_row(vec!["2023-KL-0002".into(), String::new()]);

        let bytes = table.to_xlsx("Specimens").unwrap();
        let back = Table::read_xlsx(&bytes).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn csv_output_quotes_separators() {
        let mut table = Table::new(vec!["modified".into()]);
        table.push_row(vec!["01-05-2023, AB, created".into()]);
        let out = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert_eq!(out, "modified\n\"01-05-2023, AB, created\"\n");
    }

    #[test]
    fn set_cell_adds_columns() {
        let mut table = Table::new(vec!["year".into()]);
        table.push_row(vec!["2023".into()]);
        assert!(table.set_cell(0, "sex", "male"));
        assert_eq!(table.headers.len(), 2);
        assert_eq!(table.record(0).unwrap().get("sex"), Some("male"));
        assert!(!table.set_cell(5, "year", "2020"));
    }

    #[test]
    fn format_from_filename() {
        assert_eq!(TabularFormat::from_filename("upload.XLSX").unwrap(), TabularFormat::Xlsx);
        assert!(TabularFormat::from_filename("notes.txt").is_err());

        // Legacy BIFF workbooks are not zip archives.
        let err = TabularFormat::from_filename("old.xls").unwrap_err();
        assert!(matches!(err, TabularError::UnsupportedFormat(ref ext) if ext == "xls"));
    }
}
