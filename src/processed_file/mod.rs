//! Processed file records: persistence, listing and artifact downloads.

mod core;
mod download;
mod listing;
mod migration;

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{AppState, config::StorageConfig};

pub use core::{
    NewProcessedFile, ProcessedFile, ProcessedFileID, RemittanceUpdate,
    create_processed_file_table, get_processed_file, get_processed_files_for_month,
    insert_processed_file, mark_processed_file_error, record_remittance,
};
#[cfg(test)]
pub(crate) use core::test_records;
pub(crate) use download::{attachment, read_stored_file};
pub use download::{
    BatchDownloadQuery, DownloadQuery, get_batch_download_endpoint, get_download_endpoint,
};
pub use listing::{ProcessedFilesQuery, get_processed_files_endpoint, list_processed_files};
pub use migration::{normalize_legacy_dates, parse_legacy_date};

/// The state needed to list, download and submit remittances for processed files.
#[derive(Debug, Clone)]
pub struct RecordsState {
    /// The database connection for reading and updating records.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Where artifacts and challans are stored.
    pub storage: StorageConfig,
    /// The local timezone as a canonical timezone name, e.g. "Asia/Kolkata".
    pub local_timezone: String,
}

impl FromRef<AppState> for RecordsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            storage: state.storage.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}
