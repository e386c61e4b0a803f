//! Merges the files of one upload into a single canonical table.

use serde::Serialize;

use crate::{
    normalize::{
        CanonicalRow, FileError, Status, SynonymTable, read_first_sheet, reconcile,
        transform_rows,
    },
    scheme::Scheme,
};

/// An uploaded file, already read into memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// The name the client gave the file.
    pub filename: String,
    /// The raw file contents.
    pub bytes: Vec<u8>,
}

/// How processing a single file went.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub filename: String,
    pub status: Status,
    pub message: String,
}

/// The rows of every file that processed successfully and a result for each file.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedBatch {
    pub rows: Vec<CanonicalRow>,
    pub file_results: Vec<FileResult>,
}

impl CombinedBatch {
    /// Whether every file in the batch processed without error.
    pub fn all_succeeded(&self) -> bool {
        self.file_results
            .iter()
            .all(|result| result.status == Status::Success)
    }

    /// The number of files that processed without error.
    pub fn successful_files(&self) -> usize {
        self.file_results
            .iter()
            .filter(|result| result.status == Status::Success)
            .count()
    }
}

/// Process each file independently and merge the rows of the ones that succeed.
///
/// A file that fails contributes no rows and an `error` result; the remaining
/// files are still processed. Rows keep the order of the files and of the rows
/// within each file.
pub fn combine_files(scheme: Scheme, files: &[SourceFile], synonyms: &SynonymTable) -> CombinedBatch {
    let mut rows = Vec::new();
    let mut file_results = Vec::with_capacity(files.len());

    for file in files {
        match process_file(scheme, file, synonyms) {
            Ok(file_rows) => {
                tracing::debug!(
                    "processed {} rows from {} for {scheme}",
                    file_rows.len(),
                    file.filename
                );
                rows.extend(file_rows);
                file_results.push(FileResult {
                    filename: file.filename.clone(),
                    status: Status::Success,
                    message: "Processed successfully".to_owned(),
                });
            }
            Err(error) => {
                tracing::debug!("could not process {}: {error}", file.filename);
                file_results.push(FileResult {
                    filename: file.filename.clone(),
                    status: Status::Error,
                    message: format!("Error processing file: {error}"),
                });
            }
        }
    }

    CombinedBatch { rows, file_results }
}

fn process_file(
    scheme: Scheme,
    file: &SourceFile,
    synonyms: &SynonymTable,
) -> Result<Vec<CanonicalRow>, FileError> {
    let sheet = read_first_sheet(&file.bytes)?;
    let mapping = reconcile(&sheet.headers, synonyms.for_scheme(scheme))?;

    transform_rows(scheme, &sheet, &mapping)
}
