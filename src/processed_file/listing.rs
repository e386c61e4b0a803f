//! Lists the processed files of a month, checking their artifacts are still on disk.

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use rusqlite::Connection;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    Error,
    auth::{Caller, Role, Scope, UserID},
    calendar::{month_bounds, parse_iso_date},
    normalize::{ArtifactPaths, Status},
    processed_file::{
        ProcessedFile, RecordsState, get_processed_files_for_month, mark_processed_file_error,
    },
    scheme::Scheme,
    timezone::local_now,
};

const INVALID_PATH_MESSAGE: &str = "Invalid file path format in database";
const MISSING_FILES_MESSAGE: &str = "Output files not found on server";

/// The query string of the processed files listing.
#[derive(Debug, Deserialize)]
pub struct ProcessedFilesQuery {
    /// Any date in the month to list, `YYYY-MM-DD`.
    pub upload_month: String,
    /// Narrow an admin's listing to one user.
    pub user_id: Option<i64>,
}

/// A route handler for listing the processed files of a month.
pub async fn get_processed_files_endpoint(
    State(state): State<RecordsState>,
    Path(scheme): Path<Scheme>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ProcessedFilesQuery>,
) -> Result<Json<Vec<ProcessedFile>>, Error> {
    let query_date = parse_iso_date(&query.upload_month)?;
    let now = local_now(&state.local_timezone)?;
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    list_processed_files(
        scheme,
        query_date,
        &caller,
        query.user_id.map(UserID::new),
        now,
        &connection,
    )
    .map(Json)
}

/// The records of `scheme` uploaded for the calendar month containing `query_date`.
///
/// Admins see every user's records, narrowed to `user_id` if given, and only
/// the latest record per user when it is not. Everyone else sees their own
/// records and `user_id` is ignored.
///
/// Successful records are checked against the disk: a record whose stored
/// paths are malformed or whose artifacts are gone is marked as an error and
/// left out. Of several records sharing a timestamp folder only the newest is
/// kept.
///
/// # Errors
///
/// Returns [Error::SqlError] if the records could not be read or updated.
pub fn list_processed_files(
    scheme: Scheme,
    query_date: time::Date,
    caller: &Caller,
    user_id: Option<UserID>,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Vec<ProcessedFile>, Error> {
    let (start, end) = month_bounds(query_date);
    let owner = match caller.scope() {
        Scope::All => user_id,
        Scope::Own(own_id) => Some(own_id),
    };
    let records = get_processed_files_for_month(scheme, start, end, owner, connection)?;

    let mut seen_folders = HashSet::new();
    let mut listed = Vec::with_capacity(records.len());

    for record in records {
        if record.status != Status::Success {
            listed.push(record);
            continue;
        }

        let Some(paths) = ArtifactPaths::parse(&record.filepath) else {
            tracing::warn!("record {} has a malformed file path", record.id);
            mark_processed_file_error(record.id, INVALID_PATH_MESSAGE, now, connection)?;
            continue;
        };

        if let Some(folder) = paths.timestamp_folder()
            && !seen_folders.insert(folder)
        {
            continue;
        }

        if !paths.exist() {
            tracing::warn!("the artifacts of record {} are missing", record.id);
            mark_processed_file_error(record.id, MISSING_FILES_MESSAGE, now, connection)?;
            continue;
        }

        listed.push(record);
    }

    if caller.role == Role::Admin && user_id.is_none() {
        let mut seen_users = HashSet::new();
        listed.retain(|record| seen_users.insert(record.user_id));
    }

    Ok(listed)
}
