//! The route handler that receives a folder of payroll spreadsheets.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Multipart, Path, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::Caller,
    config::StorageConfig,
    normalize::{BatchOutcome, ProcessingContext, SourceFile, SynonymTable, UploadBatch, process_batch},
    scheme::Scheme,
    timezone::local_now,
};

/// The state needed for processing uploads.
#[derive(Debug, Clone)]
pub struct ProcessingState {
    /// The database connection for saving processed file records.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Where artifacts are written.
    pub storage: StorageConfig,
    /// The header synonyms used to reconcile spreadsheets.
    pub column_synonyms: Arc<SynonymTable>,
    /// The local timezone as a canonical timezone name, e.g. "Asia/Kolkata".
    pub local_timezone: String,
}

impl FromRef<AppState> for ProcessingState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            storage: state.storage.clone(),
            column_synonyms: state.column_synonyms.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadBatch, Error> {
    let mut batch = UploadBatch {
        files: Vec::new(),
        folder_label: String::new(),
        upload_month: String::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| Error::MultipartError(error.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "files" => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| Error::MultipartError(error.to_string()))?;

                tracing::debug!("received file '{filename}' that is {} bytes", bytes.len());
                batch.files.push(SourceFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "folder_name" => {
                batch.folder_label = field
                    .text()
                    .await
                    .map_err(|error| Error::MultipartError(error.to_string()))?;
            }
            "upload_month" => {
                batch.upload_month = field
                    .text()
                    .await
                    .map_err(|error| Error::MultipartError(error.to_string()))?;
            }
            other => tracing::debug!("ignoring unexpected form field '{other}'"),
        }
    }

    Ok(batch)
}

/// A route handler for processing a folder of payroll spreadsheets for `scheme`.
///
/// Expects a multipart form with one or more `files`, a `folder_name` and an
/// `upload_month` (`YYYY-MM-DD`).
pub async fn process_folder_endpoint(
    State(state): State<ProcessingState>,
    Path(scheme): Path<Scheme>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> Result<Json<BatchOutcome>, Error> {
    caller.require_staff()?;

    let batch = read_upload(multipart).await?;
    let processed_at = local_now(&state.local_timezone)?;

    tokio::task::spawn_blocking(move || {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;
        let context = ProcessingContext {
            storage: &state.storage,
            synonyms: &state.column_synonyms,
            processed_at,
        };

        process_batch(scheme, batch, &caller, &context, &connection)
    })
    .await
    .map_err(|error| {
        tracing::error!("the processing task failed: {error}");
        Error::PersistenceFailure(format!("Error processing upload: {error}"))
    })?
    .map(Json)
}
