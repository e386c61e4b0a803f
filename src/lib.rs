//! Payroll remittance is a web service for turning monthly payroll spreadsheets
//! into the upload files of the provident fund (PF) and employee state insurance
//! (ESI) portals, and for tracking the remittances made against them.
//!
//! This library provides a JSON API for uploading spreadsheets, downloading the
//! normalized files, recording remittances and charting them by financial year.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

mod app_state;
mod auth;
mod calendar;
mod config;
mod dashboard;
mod db;
mod endpoints;
mod error;
mod logging;
mod normalize;
mod processed_file;
mod remittance;
mod routing;
mod scheme;
mod timezone;

pub use app_state::{AppState, create_cookie_key};
pub use auth::{
    PasswordHash, Role, User, UserID, ValidatedPassword, create_user, get_user_by_username,
};
pub use config::{AppConfig, DEFAULT_MAX_UPLOAD_BYTES, StorageConfig};
pub use db::initialize as initialize_db;
pub use error::Error;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use normalize::SynonymTable;
pub use routing::build_router;
pub use scheme::Scheme;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
