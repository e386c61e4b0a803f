//! Turns uploaded payroll spreadsheets into the canonical record set for a scheme.
//!
//! The pipeline runs leaf-first: [columns] reconciles headers against the synonym
//! table, [rows] validates and transforms each row, [combine] merges the files of
//! one upload, [export] writes the canonical artifacts and [process] ties it all
//! to a persisted [crate::processed_file::ProcessedFile].

mod columns;
mod combine;
mod export;
mod process;
mod rows;
mod sheet;
mod upload;

use std::fmt::Display;

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

pub use columns::{ColumnMapping, FieldSynonyms, SynonymTable, reconcile};
pub use combine::{CombinedBatch, FileResult, SourceFile, combine_files};
pub use export::{ArtifactPaths, render_text, sanitize_folder_name, write_artifacts};
pub use process::{BatchOutcome, ProcessingContext, UploadBatch, process_batch};
pub use rows::{CanonicalRow, FieldValue, custom_round, transform_rows};
pub use sheet::{Cell, Sheet, read_first_sheet};
pub use upload::{ProcessingState, process_folder_endpoint};

#[cfg(test)]
pub(crate) use sheet::test_workbooks;

/// Why a single uploaded file could not be turned into canonical rows.
///
/// These never abort a batch, they are reported in that file's result instead.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FileError {
    /// The upload is neither an `.xlsx` nor an `.xls` workbook.
    #[error("Unsupported or unrecognized Excel file format")]
    UnsupportedFormat,

    /// The workbook could not be parsed.
    #[error("Could not read Excel file: {0}")]
    Unreadable(String),

    /// The first worksheet has no data rows.
    #[error("Excel file is empty")]
    EmptySheet,

    /// One or more logical fields had no matching header. Lists every missing field.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A value in a row could not be coerced to the type its field needs.
    #[error("Invalid value in row {row}: {message}")]
    RowProcessing {
        /// The 1-based spreadsheet row, counting the header as row 1.
        row: usize,
        /// What was wrong with the value.
        message: String,
    },
}

/// The outcome of processing a file or a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Everything was processed and written.
    Success,
    /// At least part of the work failed, see the accompanying message.
    Error,
}

impl Status {
    /// The lowercase string stored in the database and sent to clients.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "success" => Ok(Status::Success),
            "error" => Ok(Status::Error),
            other => Err(FromSqlError::Other(
                format!("unknown status \"{other}\"").into(),
            )),
        }
    }
}
