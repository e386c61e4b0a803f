//! Writes a combined canonical table to its spreadsheet and text artifacts.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    calendar::{format_compact_timestamp, format_iso_date, format_underscored_date},
    normalize::{CanonicalRow, FieldValue},
    scheme::Scheme,
};

/// The separator between fields in the text artifact.
pub const TEXT_FIELD_SEPARATOR: &str = "#~#";

const MAX_FOLDER_NAME_LENGTH: usize = 100;

/// Make a client supplied folder label safe to use in a file name.
///
/// Spaces become underscores and the result is cut to 100 characters. Characters
/// that are not allowed in file names on common platforms are removed, as are
/// commas, since the stored form joins both artifact paths with one.
pub fn sanitize_folder_name(folder_name: &str) -> String {
    folder_name
        .replace(' ', "_")
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' | ','))
        .take(MAX_FOLDER_NAME_LENGTH)
        .collect()
}

/// Where the two artifacts of one batch are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// The `.xlsx` artifact.
    pub spreadsheet: PathBuf,
    /// The `#~#` delimited `.txt` artifact.
    pub text: PathBuf,
}

impl ArtifactPaths {
    /// The paths for a batch processed at `timestamp`:
    /// `{root}/{scheme dir}/{upload month}/{timestamp}/{label}_{upload month}.{xlsx,txt}`.
    pub fn new(
        root: &Path,
        scheme: Scheme,
        folder_label: &str,
        upload_month: Date,
        timestamp: OffsetDateTime,
    ) -> Self {
        let directory = root
            .join(scheme.output_dir())
            .join(format_iso_date(upload_month))
            .join(format_compact_timestamp(timestamp));
        let stem = format!(
            "{}_{}",
            sanitize_folder_name(folder_label),
            format_underscored_date(upload_month)
        );

        Self {
            spreadsheet: directory.join(format!("{stem}.xlsx")),
            text: directory.join(format!("{stem}.txt")),
        }
    }

    /// The comma-joined form stored in the database.
    pub fn to_db_string(&self) -> String {
        format!("{},{}", self.spreadsheet.display(), self.text.display())
    }

    /// Parse the comma-joined form stored in the database.
    ///
    /// Returns `None` unless `text` holds exactly two non-empty paths.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(',');

        match (parts.next(), parts.next(), parts.next()) {
            (Some(spreadsheet), Some(text), None)
                if !spreadsheet.trim().is_empty() && !text.trim().is_empty() =>
            {
                Some(Self {
                    spreadsheet: PathBuf::from(spreadsheet.trim()),
                    text: PathBuf::from(text.trim()),
                })
            }
            _ => None,
        }
    }

    /// The name of the per-batch timestamp folder both artifacts live in.
    pub fn timestamp_folder(&self) -> Option<String> {
        self.spreadsheet
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// The file name of the spreadsheet artifact.
    pub fn filename(&self) -> String {
        self.spreadsheet
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether both artifacts exist on disk.
    pub fn exist(&self) -> bool {
        self.spreadsheet.is_file() && self.text.is_file()
    }

    fn remove(&self) {
        for path in [&self.spreadsheet, &self.text] {
            if !path.exists() {
                continue;
            }

            if let Err(error) = std::fs::remove_file(path) {
                tracing::warn!("could not remove partial artifact {}: {error}", path.display());
            }
        }
    }
}

/// Write `rows` to both artifacts at `paths`, creating the directory if needed.
///
/// Either both artifacts are written or neither is left on disk.
///
/// # Errors
///
/// Returns [Error::ExportFailure] if either artifact could not be written.
pub fn write_artifacts(paths: &ArtifactPaths, scheme: Scheme, rows: &[CanonicalRow]) -> Result<(), Error> {
    let result = write_both(paths, scheme, rows);

    if let Err(error) = &result {
        tracing::error!("could not write artifacts for {scheme}: {error}");
        paths.remove();
    }

    result
}

fn write_both(paths: &ArtifactPaths, scheme: Scheme, rows: &[CanonicalRow]) -> Result<(), Error> {
    if let Some(directory) = paths.spreadsheet.parent() {
        std::fs::create_dir_all(directory)
            .map_err(|error| Error::ExportFailure(error.to_string()))?;
    }

    write_spreadsheet(&paths.spreadsheet, scheme, rows)
        .map_err(|error| Error::ExportFailure(error.to_string()))?;
    std::fs::write(&paths.text, render_text(scheme, rows))
        .map_err(|error| Error::ExportFailure(error.to_string()))?;

    Ok(())
}

/// Render `rows` in the text artifact format: a header line, then one line per
/// row, fields joined with [TEXT_FIELD_SEPARATOR] and lines with `\n`.
pub fn render_text(scheme: Scheme, rows: &[CanonicalRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(scheme.columns().join(TEXT_FIELD_SEPARATOR));

    for row in rows {
        let fields: Vec<String> = row.values().iter().map(ToString::to_string).collect();
        lines.push(fields.join(TEXT_FIELD_SEPARATOR));
    }

    lines.join("\n")
}

fn write_spreadsheet(path: &Path, scheme: Scheme, rows: &[CanonicalRow]) -> Result<(), XlsxError> {
    let header_format = Format::new().set_bold();
    let integer_format = Format::new().set_num_format("0");
    let columns = scheme.columns();
    let mut widths: Vec<usize> = columns.iter().map(|column| column.chars().count()).collect();

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(scheme.sheet_name())?;

    for (column, header) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, column as u16, *header, &header_format)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let row_number = index as u32 + 1;

        for (column, value) in row.values().into_iter().enumerate() {
            let width = match &value {
                FieldValue::Text(text) => {
                    worksheet.write_string(row_number, column as u16, text)?;
                    text.chars().count()
                }
                FieldValue::Integer(number) => {
                    worksheet.write_number_with_format(
                        row_number,
                        column as u16,
                        *number as f64,
                        &integer_format,
                    )?;
                    number.to_string().len()
                }
            };

            if let Some(max_width) = widths.get_mut(column) {
                *max_width = (*max_width).max(width);
            }
        }
    }

    for (column, width) in widths.into_iter().enumerate() {
        worksheet.set_column_width(column as u16, (width + 2) as f64 * 1.2)?;
    }

    workbook.save(path)
}
