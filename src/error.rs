//! The application-wide error type and how it is rendered as an HTTP response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The request was malformed, e.g. a bad date, no files or a non-PDF challan.
    ///
    /// The message is shown to the client verbatim.
    #[error("{0}")]
    InvalidInput(String),

    /// The request did not carry a valid session.
    #[error("Could not validate credentials")]
    Unauthorized,

    /// The username and password combination did not match a registered user.
    #[error("Incorrect username or password")]
    InvalidCredentials,

    /// The caller is authenticated but their role does not allow the operation.
    #[error("{0}")]
    Forbidden(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("{0}")]
    NotFound(String),

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// The multipart form could not be parsed.
    #[error("Could not parse multipart form: {0}")]
    MultipartError(String),

    /// The canonical artifacts for a batch could not be written.
    #[error("Error saving combined files: {0}")]
    ExportFailure(String),

    /// A record could not be written to the database after its artifacts were exported.
    #[error("{0}")]
    PersistenceFailure(String),

    /// A file could not be read from or written to the storage root.
    #[error("{0}")]
    StorageError(String),

    /// The zip archive for a batch download could not be built.
    #[error("could not build archive: {0}")]
    ArchiveError(String),

    /// The server configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::NotFound("the requested resource could not be found".to_owned())
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidInput(_) | Error::TooWeak(_) | Error::MultipartError(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::PersistenceFailure(_) | Error::StorageError(_) | Error::ExportFailure(_) => {
                tracing::error!("{self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        detail: "An unexpected error occurred, check the server logs for more details."
                            .to_owned(),
                    }),
                )
                    .into_response();
            }
        };

        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
