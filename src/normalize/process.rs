//! Runs one upload batch end to end: combine, export and persist the record.

use rusqlite::Connection;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    auth::Caller,
    calendar::{iso_date, parse_iso_date},
    config::StorageConfig,
    normalize::{
        ArtifactPaths, FileResult, SourceFile, Status, SynonymTable, combine_files,
        write_artifacts,
    },
    processed_file::{NewProcessedFile, ProcessedFileID, insert_processed_file},
    scheme::Scheme,
};

const SPREADSHEET_EXTENSIONS: [&str; 2] = [".xls", ".xlsx"];

/// The files of one upload and what they are for.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    /// Every uploaded file, spreadsheets or not.
    pub files: Vec<SourceFile>,
    /// The client's name for the folder the files came from.
    pub folder_label: String,
    /// The month the payroll is for, `YYYY-MM-DD` as sent by the client.
    pub upload_month: String,
}

/// What a batch needs from the server besides the upload itself.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingContext<'a> {
    /// Where the artifacts are written.
    pub storage: &'a StorageConfig,
    /// The header synonyms used to reconcile the spreadsheets.
    pub synonyms: &'a SynonymTable,
    /// The local time the batch is processed at. Names the timestamp folder.
    pub processed_at: OffsetDateTime,
}

/// The result of a batch, as returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// The ID of the persisted record.
    pub file_id: ProcessedFileID,
    pub status: Status,
    pub message: String,
    #[serde(serialize_with = "iso_date::serialize")]
    pub upload_month: Date,
    /// The spreadsheet artifact, if one was written.
    pub file_path: Option<String>,
    /// One result per spreadsheet file.
    pub processed_files: Vec<FileResult>,
    pub total_files: usize,
    pub successful_files: usize,
}

fn is_spreadsheet(filename: &str) -> bool {
    let filename = filename.to_lowercase();

    SPREADSHEET_EXTENSIONS
        .iter()
        .any(|extension| filename.ends_with(extension))
}

/// Normalize the spreadsheets of `batch` into the canonical artifacts of
/// `scheme` and persist a record of the outcome.
///
/// Files that fail are reported in the outcome and do not stop the batch. The
/// batch is a `success` only if every spreadsheet processed and the artifacts
/// were written. Files without a `.xls` or `.xlsx` extension are ignored.
///
/// # Errors
///
/// - [Error::Forbidden] if the caller is not HR or an admin.
/// - [Error::InvalidInput] if the upload month is not `YYYY-MM-DD`, no files
///   were uploaded or none of them are spreadsheets. Nothing is written.
/// - [Error::PersistenceFailure] if the record could not be saved. Artifacts
///   that were already written are left on disk.
pub fn process_batch(
    scheme: Scheme,
    batch: UploadBatch,
    caller: &Caller,
    context: &ProcessingContext,
    connection: &Connection,
) -> Result<BatchOutcome, Error> {
    caller.require_staff()?;

    let upload_month = parse_iso_date(&batch.upload_month)?;

    if batch.files.is_empty() {
        return Err(Error::InvalidInput("No files uploaded".to_owned()));
    }

    let spreadsheets: Vec<SourceFile> = batch
        .files
        .into_iter()
        .filter(|file| is_spreadsheet(&file.filename))
        .collect();

    if spreadsheets.is_empty() {
        return Err(Error::InvalidInput(
            "No Excel files found in the upload".to_owned(),
        ));
    }

    let combined = combine_files(scheme, &spreadsheets, context.synonyms);
    let paths = ArtifactPaths::new(
        context.storage.root(),
        scheme,
        &batch.folder_label,
        upload_month,
        context.processed_at,
    );

    let (mut status, mut message) = if combined.all_succeeded() {
        (Status::Success, "All files processed successfully.".to_owned())
    } else {
        (Status::Error, "Some files had errors during processing.".to_owned())
    };
    let mut written = false;

    if combined.rows.is_empty() {
        status = Status::Error;
        message = "No valid data to save after processing".to_owned();
    } else {
        match write_artifacts(&paths, scheme, &combined.rows) {
            Ok(()) => written = true,
            Err(error) => {
                status = Status::Error;
                message = error.to_string();
            }
        }
    }

    let successful_files = combined.successful_files();
    let new_record = NewProcessedFile {
        scheme,
        user_id: caller.user_id,
        filename: paths.filename(),
        filepath: if written {
            paths.to_db_string()
        } else {
            String::new()
        },
        status,
        message: message.clone(),
        upload_month,
        upload_date: context.processed_at.date(),
        source_folder: batch.folder_label,
        processed_files_count: spreadsheets.len() as i64,
        success_files_count: successful_files as i64,
        created_at: context.processed_at,
    };

    let record = insert_processed_file(&new_record, connection).map_err(|error| {
        if written {
            tracing::warn!(
                "artifacts {} are orphaned because the record could not be saved",
                paths.to_db_string()
            );
        }
        Error::PersistenceFailure(format!("Error saving record to database: {error}"))
    })?;

    tracing::info!(
        "user {} processed {} {scheme} files ({successful_files} succeeded, {} rows): {status}",
        caller.user_id,
        spreadsheets.len(),
        combined.rows.len()
    );

    Ok(BatchOutcome {
        file_id: record.id,
        status,
        message,
        upload_month,
        file_path: written.then(|| paths.spreadsheet.display().to_string()),
        processed_files: combined.file_results,
        total_files: spreadsheets.len(),
        successful_files,
    })
}
