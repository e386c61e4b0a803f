//! Reads the first worksheet of an uploaded workbook into memory.

use std::{fmt::Display, io::Cursor};

use calamine::{Data, Range, Reader, Xls, Xlsx};

use crate::normalize::FileError;

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
const XLS_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// A single spreadsheet value, reduced to what the row transformer needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value, an error value, or whitespace only.
    Empty,
    /// A text value.
    Text(String),
    /// Any numeric value, including dates stored as serial numbers.
    Number(f64),
    /// A boolean value.
    Bool(bool),
}

/// The header row and data rows of a worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    /// The values of the first row, as text.
    pub headers: Vec<String>,
    /// Every following row.
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WorkbookFormat {
    Xlsx,
    Xls,
}

fn detect_format(bytes: &[u8]) -> Option<WorkbookFormat> {
    if bytes.starts_with(XLSX_MAGIC) {
        Some(WorkbookFormat::Xlsx)
    } else if bytes.starts_with(XLS_MAGIC) {
        Some(WorkbookFormat::Xls)
    } else {
        None
    }
}

/// Parse the first worksheet of an `.xlsx` or `.xls` workbook.
///
/// The format is detected from the file contents, not its name. The first row
/// of the sheet is taken as the header row.
///
/// # Errors
///
/// - [FileError::UnsupportedFormat] if `bytes` is not a workbook.
/// - [FileError::Unreadable] if the workbook is corrupt.
/// - [FileError::EmptySheet] if the first worksheet has no data rows.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Sheet, FileError> {
    let range = match detect_format(bytes).ok_or(FileError::UnsupportedFormat)? {
        WorkbookFormat::Xlsx => {
            let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
                .map_err(|error| FileError::Unreadable(error.to_string()))?;
            first_range(&mut workbook)?
        }
        WorkbookFormat::Xls => {
            let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes))
                .map_err(|error| FileError::Unreadable(error.to_string()))?;
            first_range(&mut workbook)?
        }
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(header_text).collect(),
        None => return Err(FileError::EmptySheet),
    };
    let rows: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(to_cell).collect())
        .collect();

    if rows.is_empty() {
        return Err(FileError::EmptySheet);
    }

    Ok(Sheet { headers, rows })
}

fn first_range<RS, R>(workbook: &mut R) -> Result<Range<Data>, FileError>
where
    RS: std::io::Read + std::io::Seek,
    R: Reader<RS>,
    R::Error: Display,
{
    workbook
        .worksheet_range_at(0)
        .ok_or(FileError::EmptySheet)?
        .map_err(|error| FileError::Unreadable(error.to_string()))
}

fn header_text(data: &Data) -> String {
    match to_cell(data) {
        Cell::Empty => String::new(),
        Cell::Text(text) => text,
        Cell::Number(number) => format_number(number),
        Cell::Bool(value) => value.to_string(),
    }
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(text) if text.trim().is_empty() => Cell::Empty,
        Data::String(text) => Cell::Text(text.clone()),
        Data::Float(number) => Cell::Number(*number),
        Data::Int(number) => Cell::Number(*number as f64),
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(date_time) => Cell::Number(date_time.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => Cell::Text(text.clone()),
    }
}

/// Format a number the way a spreadsheet user would type it: whole numbers
/// without a decimal point, everything else unchanged.
pub(super) fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}
