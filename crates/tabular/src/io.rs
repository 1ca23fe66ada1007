//! Reading and writing datasets (delimited text and spreadsheets).

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::Workbook;

use crate::{Dataset, TabularError};

/// File extensions accepted for tabular uploads.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

fn is_spreadsheet(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xlsx") || lower.ends_with(".xls")
}

/// Read a dataset from raw bytes, dispatching on the file name's extension.
pub fn read_dataset_bytes(name: &str, bytes: &[u8]) -> Result<Dataset, TabularError> {
    if is_spreadsheet(name) {
        read_spreadsheet_bytes(bytes)
    } else {
        read_csv_bytes(bytes)
    }
}

/// Read a dataset from a file on disk.
pub fn read_dataset_path(path: &Path) -> Result<Dataset, TabularError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    read_dataset_bytes(&name, &bytes)
}

/// Parse delimited text into a dataset. The first record is the header.
///
/// Cells are decoded as UTF-8 with lossy replacement, which covers the
/// Latin-1-style exports that strict decoding would reject.
pub fn read_csv_bytes(bytes: &[u8]) -> Result<Dataset, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|cell| String::from_utf8_lossy(cell).trim_start_matches('\u{feff}').to_string())
        .collect();
    if columns.is_empty() {
        return Err(TabularError::Empty);
    }

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        );
    }

    Ok(Dataset::new(columns, rows))
}

/// Parse delimited text into raw rows with no header interpretation;
/// the caller decides whether the first row is one.
pub fn read_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        );
    }
    Ok(rows)
}

/// Parse the first worksheet of a spreadsheet into a dataset.
/// The first row is the header; every cell is rendered to text.
pub fn read_spreadsheet_bytes(bytes: &[u8]) -> Result<Dataset, TabularError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| TabularError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TabularError::Spreadsheet("workbook has no sheets".to_string()))?
        .map_err(|e| TabularError::Spreadsheet(e.to_string()))?;

    let mut iter = range.rows();
    let columns: Vec<String> = iter
        .next()
        .ok_or(TabularError::Empty)?
        .iter()
        .map(render_cell)
        .collect();

    let rows: Vec<Vec<String>> = iter
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    Ok(Dataset::new(columns, rows))
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Serialize a dataset to CSV bytes (header + rows).
pub fn to_csv_bytes(dataset: &Dataset) -> Result<Vec<u8>, TabularError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.columns())?;
    for row in dataset.rows() {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| TabularError::Io(std::io::Error::other(e.to_string())))
}

/// Serialize a dataset to a single-sheet `.xlsx` workbook.
pub fn to_xlsx_bytes(dataset: &Dataset, sheet_name: &str) -> Result<Vec<u8>, TabularError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .map_err(|e| TabularError::Spreadsheet(e.to_string()))?;

    for (col, name) in dataset.columns().iter().enumerate() {
        worksheet
            .write_string(0, col as u16, name)
            .map_err(|e| TabularError::Spreadsheet(e.to_string()))?;
    }
    for (r, row) in dataset.rows().iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            worksheet
                .write_string(r as u32 + 1, c as u16, cell)
                .map_err(|e| TabularError::Spreadsheet(e.to_string()))?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| TabularError::Spreadsheet(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_roundtrip() {
        let input = b"id,name\n1,alice\n2,bob\n";
        let ds = read_csv_bytes(input).unwrap();
        assert_eq!(ds.columns(), ["id", "name"]);
        assert_eq!(ds.row_count(), 2);

        let out = to_csv_bytes(&ds).unwrap();
        let again = read_csv_bytes(&out).unwrap();
        assert_eq!(ds, again);
    }

    #[test]
    fn raw_rows_keep_the_first_record() {
        let rows = read_csv_rows(b"acme.com\nother.io\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ["acme.com"]);
    }

    #[test]
    fn csv_with_bom_header() {
        let input = "\u{feff}id,name\n1,alice\n".as_bytes();
        let ds = read_csv_bytes(input).unwrap();
        assert_eq!(ds.columns()[0], "id");
    }

    #[test]
    fn csv_tolerates_invalid_utf8_cells() {
        let mut input: Vec<u8> = b"name\n".to_vec();
        input.extend_from_slice(&[0xE9, b'\n']); // lone Latin-1 'é'
        let ds = read_csv_bytes(&input).unwrap();
        assert_eq!(ds.row_count(), 1);
        assert!(!ds.rows()[0][0].is_empty());
    }

    #[test]
    fn csv_tolerates_ragged_rows() {
        let input = b"a,b,c\n1,2\n1,2,3,4\n";
        let ds = read_csv_bytes(input).unwrap();
        assert!(ds.rows().iter().all(|r| r.len() == 3));
    }

    #[test]
    fn xlsx_roundtrip() {
        let ds = Dataset::new(
            vec!["id".into(), "name".into()],
            vec![vec!["1".into(), "alice".into()]],
        );
        let bytes = to_xlsx_bytes(&ds, "Merged Data").unwrap();
        let again = read_spreadsheet_bytes(&bytes).unwrap();
        assert_eq!(again.columns(), ["id", "name"]);
        assert_eq!(again.rows()[0], ["1", "alice"]);
    }

    #[test]
    fn dispatch_by_extension() {
        let err = read_dataset_bytes("data.xlsx", b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, TabularError::Spreadsheet(_)));

        let ds = read_dataset_bytes("data.csv", b"a\n1\n").unwrap();
        assert_eq!(ds.row_count(), 1);
    }
}
