//! Serves the artifacts of processed files, one at a time or as a zip archive.

use std::{
    collections::BTreeSet,
    io::{Cursor, Write},
    path::{Path as FilePath, PathBuf},
};

use axum::{
    Extension,
    extract::{Path, Query, State},
    http::{
        HeaderName, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Deserialize;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{
    Error,
    auth::Caller,
    calendar::{format_compact_timestamp, format_iso_date, format_underscored_date},
    normalize::{ArtifactPaths, Status},
    processed_file::{ProcessedFile, ProcessedFileID, RecordsState, get_processed_file},
    scheme::Scheme,
    timezone::local_now,
};

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const TEXT_CONTENT_TYPE: &str = "text/plain";
const ZIP_CONTENT_TYPE: &str = "application/zip";

/// The query string of a single artifact download.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    /// "txt" for the text artifact, anything else for the spreadsheet.
    pub file_type: Option<String>,
}

/// The query string of a batch download.
#[derive(Debug, Deserialize)]
pub struct BatchDownloadQuery {
    /// Comma-separated record IDs.
    pub file_ids: String,
}

/// Build an attachment response with `extra_headers`.
pub(crate) fn attachment(
    content_type: &str,
    filename: &str,
    extra_headers: Vec<(HeaderName, String)>,
    bytes: Vec<u8>,
) -> Response {
    let mut response = (
        [
            (CONTENT_TYPE, content_type.to_owned()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response();

    for (name, value) in extra_headers {
        match value.parse::<HeaderValue>() {
            Ok(value) => {
                response.headers_mut().insert(name, value);
            }
            Err(error) => tracing::error!("could not set header {name}: {error}"),
        }
    }

    response
}

/// Read a stored file, mapping a missing file to [Error::NotFound] with `not_found_message`.
pub(crate) async fn read_stored_file(path: &FilePath, not_found_message: String) -> Result<Vec<u8>, Error> {
    tokio::fs::read(path).await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(not_found_message)
        } else {
            Error::StorageError(format!("Could not read {}: {error}", path.display()))
        }
    })
}

/// The name a downloaded artifact is given, e.g. "ESI_2024_05_01_12.xlsx".
fn download_name(record: &ProcessedFile, extension: &str) -> String {
    let month = record.upload_month.unwrap_or(record.created_at.date());

    format!(
        "{}_{}_{}.{extension}",
        record.scheme.label(),
        format_underscored_date(month),
        record.id
    )
}

/// Check `caller` may download the artifacts of `record` and return their paths.
fn downloadable_paths(record: &ProcessedFile, caller: &Caller) -> Result<ArtifactPaths, Error> {
    if !caller.can_download(record.user_id) {
        return Err(Error::Forbidden(
            "You can only download your own files".to_owned(),
        ));
    }

    if record.status != Status::Success {
        return Err(Error::InvalidInput(
            "File cannot be downloaded as processing was not successful".to_owned(),
        ));
    }

    ArtifactPaths::parse(&record.filepath).ok_or_else(|| {
        Error::StorageError("Invalid file path format in database".to_owned())
    })
}

/// A route handler for downloading one artifact of a processed file.
pub async fn get_download_endpoint(
    State(state): State<RecordsState>,
    Path((scheme, file_id)): Path<(Scheme, ProcessedFileID)>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, Error> {
    let record = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;
        get_processed_file(scheme, file_id, &connection)?
    };
    let paths = downloadable_paths(&record, &caller)?;

    let (path, content_type, extension) = match query.file_type.as_deref() {
        Some("txt") => (paths.text, TEXT_CONTENT_TYPE, "txt"),
        _ => (paths.spreadsheet, XLSX_CONTENT_TYPE, "xlsx"),
    };
    let not_found = format!(
        "Requested file not found on server: {}",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let bytes = read_stored_file(&path, not_found).await?;

    tracing::info!("user {} downloaded {scheme} record {file_id}", caller.user_id);

    Ok(attachment(
        content_type,
        &download_name(&record, extension),
        vec![(
            HeaderName::from_static("x-file-month"),
            record.upload_month.map(format_iso_date).unwrap_or_default(),
        )],
        bytes,
    ))
}

/// Parse a comma-separated list of record IDs, ignoring blanks and duplicates.
fn parse_file_ids(text: &str) -> Result<BTreeSet<ProcessedFileID>, Error> {
    text.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .map_err(|_| Error::InvalidInput("Invalid file IDs format".to_owned()))
        })
        .collect()
}

/// One file to add to a batch archive.
#[derive(Debug, Clone, PartialEq)]
struct ArchiveEntry {
    name: String,
    path: PathBuf,
}

/// Choose the artifacts of `file_ids` that `caller` may download.
///
/// Records that do not exist, belong to someone else, did not process
/// successfully or whose artifacts are gone are skipped.
fn collect_archive_entries(
    scheme: Scheme,
    file_ids: &BTreeSet<ProcessedFileID>,
    caller: &Caller,
    connection: &Connection,
) -> Result<Vec<ArchiveEntry>, Error> {
    let mut records = Vec::with_capacity(file_ids.len());
    for &file_id in file_ids {
        match get_processed_file(scheme, file_id, connection) {
            Ok(record) => records.push(record),
            Err(Error::NotFound(_)) => {}
            Err(error) => return Err(error),
        }
    }

    if records.is_empty() {
        return Err(Error::NotFound(
            "No files found with the provided IDs".to_owned(),
        ));
    }

    let mut entries = Vec::new();
    for record in &records {
        let paths = match downloadable_paths(record, caller) {
            Ok(paths) if paths.exist() => paths,
            Ok(_) => {
                tracing::warn!("skipping record {} with missing artifacts", record.id);
                continue;
            }
            Err(error) => {
                tracing::debug!("skipping record {}: {error}", record.id);
                continue;
            }
        };

        let month = record.upload_month.unwrap_or(record.created_at.date());
        let folder = format!("{}_Files/{}", scheme.label(), format_iso_date(month));

        entries.push(ArchiveEntry {
            name: format!("{folder}/{}", download_name(record, "xlsx")),
            path: paths.spreadsheet,
        });
        entries.push(ArchiveEntry {
            name: format!("{folder}/{}", download_name(record, "txt")),
            path: paths.text,
        });
    }

    if entries.is_empty() {
        return Err(Error::NotFound(
            "No valid files available for download".to_owned(),
        ));
    }

    Ok(entries)
}

/// Write `entries` to an in-memory, deflated zip archive.
fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, Error> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));

    for entry in entries {
        let bytes = std::fs::read(&entry.path).map_err(|error| {
            Error::StorageError(format!("Could not read {}: {error}", entry.path.display()))
        })?;

        archive
            .start_file(entry.name.as_str(), options)
            .map_err(|error| Error::ArchiveError(error.to_string()))?;
        archive
            .write_all(&bytes)
            .map_err(|error| Error::ArchiveError(error.to_string()))?;
    }

    let cursor = archive
        .finish()
        .map_err(|error| Error::ArchiveError(error.to_string()))?;

    Ok(cursor.into_inner())
}

/// A route handler for downloading the artifacts of several processed files as a zip archive.
pub async fn get_batch_download_endpoint(
    State(state): State<RecordsState>,
    Path(scheme): Path<Scheme>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<BatchDownloadQuery>,
) -> Result<Response, Error> {
    let file_ids = parse_file_ids(&query.file_ids)?;
    let now = local_now(&state.local_timezone)?;
    let entries = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;
        collect_archive_entries(scheme, &file_ids, &caller, &connection)?
    };

    let archive = tokio::task::spawn_blocking({
        let entries = entries.clone();
        move || build_archive(&entries)
    })
    .await
    .map_err(|error| Error::ArchiveError(error.to_string()))??;

    tracing::info!(
        "user {} downloaded {} {scheme} files as an archive",
        caller.user_id,
        entries.len()
    );

    Ok(attachment(
        ZIP_CONTENT_TYPE,
        &format!("{}_files_{}.zip", scheme.slug(), format_compact_timestamp(now)),
        vec![(
            HeaderName::from_static("x-files-count"),
            entries.len().to_string(),
        )],
        archive,
    ))
}
