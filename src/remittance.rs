//! Proof-of-payment submission for processed files and download of the stored challan.

use std::path::PathBuf;

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::HeaderName,
    response::Response,
};
use rusqlite::Connection;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    auth::Caller,
    calendar::{
        format_compact_timestamp, format_iso_date, format_underscored_date, iso_date,
        iso_date_option, parse_iso_date, timestamp,
    },
    config::StorageConfig,
    processed_file::{
        ProcessedFileID, RecordsState, RemittanceUpdate, attachment, get_processed_file,
        read_stored_file, record_remittance,
    },
    scheme::Scheme,
    timezone::local_now,
};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// The fields of a remittance submission form, as sent by the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemittanceForm {
    /// The payment date, `YYYY-MM-DD`.
    pub remittance_date: String,
    /// The amount paid.
    pub remittance_amount: String,
    /// The name the client gave the challan.
    pub challan_filename: String,
    /// The challan PDF.
    pub challan: Vec<u8>,
}

/// What a successful submission wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemittanceDetails {
    pub file_id: ProcessedFileID,
    #[serde(serialize_with = "iso_date_option::serialize")]
    pub remittance_month: Option<Date>,
    #[serde(serialize_with = "iso_date::serialize")]
    pub remittance_date: Date,
    pub remittance_amount: f64,
    pub challan_path: String,
    #[serde(serialize_with = "timestamp::serialize")]
    pub submitted_at: OffsetDateTime,
}

/// The response body of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemittanceResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub details: RemittanceDetails,
}

fn parse_amount(text: &str) -> Result<f64, Error> {
    let amount: f64 = text
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput("Remittance amount must be a number".to_owned()))?;

    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidInput(
            "Remittance amount must be positive".to_owned(),
        ));
    }

    Ok(amount)
}

/// Store the challan of `form` and record the remittance against record `file_id`.
///
/// The challan is written to `{challans}/{upload month}/` before the record is
/// updated, and deleted again if the update fails. A second submission for the
/// same record overwrites the first.
///
/// # Errors
///
/// - [Error::Forbidden] if the caller is not HR or an admin.
/// - [Error::InvalidInput] for a bad date, a non-PDF challan, a non-positive
///   amount or a record without an upload month.
/// - [Error::NotFound] if the record does not exist.
/// - [Error::StorageError] or [Error::PersistenceFailure] if the challan or the
///   record could not be written.
pub fn submit_remittance(
    scheme: Scheme,
    file_id: ProcessedFileID,
    form: &RemittanceForm,
    caller: &Caller,
    storage: &StorageConfig,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<RemittanceDetails, Error> {
    caller.require_staff()?;

    let remittance_date = parse_iso_date(&form.remittance_date)?;

    if !form.challan_filename.to_lowercase().ends_with(".pdf") {
        return Err(Error::InvalidInput("Only PDF files are accepted".to_owned()));
    }

    let remittance_amount = parse_amount(&form.remittance_amount)?;
    let record = get_processed_file(scheme, file_id, connection)?;
    let upload_month = record.upload_month.ok_or_else(|| {
        Error::InvalidInput("File missing upload month information".to_owned())
    })?;

    let challan_path = challan_path(storage, scheme, file_id, upload_month, now);
    write_challan(&challan_path, &form.challan)?;
    let challan_path_text = challan_path.display().to_string();

    let update = RemittanceUpdate {
        remittance_date,
        remittance_amount,
        challan_path: challan_path_text.clone(),
        submitted_at: now,
        submitted_by: caller.user_id,
    };

    if let Err(error) = record_remittance(file_id, &update, connection) {
        if let Err(remove_error) = std::fs::remove_file(&challan_path) {
            tracing::warn!(
                "could not remove challan {} after a failed update: {remove_error}",
                challan_path.display()
            );
        }

        return Err(Error::PersistenceFailure(format!(
            "Failed to update database: {error}"
        )));
    }

    tracing::info!(
        "user {} submitted a remittance of {remittance_amount} for {scheme} record {file_id}",
        caller.user_id
    );

    Ok(RemittanceDetails {
        file_id,
        remittance_month: Some(upload_month),
        remittance_date,
        remittance_amount,
        challan_path: challan_path_text,
        submitted_at: now,
    })
}

fn challan_path(
    storage: &StorageConfig,
    scheme: Scheme,
    file_id: ProcessedFileID,
    upload_month: Date,
    now: OffsetDateTime,
) -> PathBuf {
    storage
        .challan_dir()
        .join(format_iso_date(upload_month))
        .join(format!(
            "{}_Remittance_{}_{file_id}_{}.pdf",
            scheme.label(),
            format_underscored_date(upload_month),
            format_compact_timestamp(now)
        ))
}

fn write_challan(path: &std::path::Path, bytes: &[u8]) -> Result<(), Error> {
    let save_error =
        |error: std::io::Error| Error::StorageError(format!("Failed to save remittance file: {error}"));

    if let Some(directory) = path.parent() {
        std::fs::create_dir_all(directory).map_err(save_error)?;
    }

    std::fs::write(path, bytes).map_err(save_error)
}

/// Read the remittance form fields from a multipart body.
async fn read_remittance_form(mut multipart: Multipart) -> Result<RemittanceForm, Error> {
    let mut form = RemittanceForm::default();
    let mut has_challan = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| Error::MultipartError(error.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_owned();

        match name.as_str() {
            "remittance_date" | "remittance_amount" => {
                let text = field
                    .text()
                    .await
                    .map_err(|error| Error::MultipartError(error.to_string()))?;

                if name == "remittance_date" {
                    form.remittance_date = text;
                } else {
                    form.remittance_amount = text;
                }
            }
            "remittance_file" => {
                form.challan_filename = field.file_name().unwrap_or_default().to_owned();
                form.challan = field
                    .bytes()
                    .await
                    .map_err(|error| Error::MultipartError(error.to_string()))?
                    .to_vec();
                has_challan = true;
                tracing::debug!(
                    "received challan '{}' that is {} bytes",
                    form.challan_filename,
                    form.challan.len()
                );
            }
            other => tracing::debug!("ignoring unexpected form field '{other}'"),
        }
    }

    if !has_challan {
        return Err(Error::InvalidInput(
            "Missing form field: remittance_file".to_owned(),
        ));
    }

    Ok(form)
}

/// A route handler for submitting the remittance of a processed file.
pub async fn submit_remittance_endpoint(
    State(state): State<RecordsState>,
    Path((scheme, file_id)): Path<(Scheme, ProcessedFileID)>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> Result<Json<RemittanceResponse>, Error> {
    caller.require_staff()?;

    let form = read_remittance_form(multipart).await?;
    let now = local_now(&state.local_timezone)?;
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let details = submit_remittance(
        scheme,
        file_id,
        &form,
        &caller,
        &state.storage,
        now,
        &connection,
    )?;

    Ok(Json(RemittanceResponse {
        status: "success",
        message: "Remittance submitted successfully",
        details,
    }))
}

/// A route handler for downloading the remittance challan of a processed file.
pub async fn get_remittance_challan_endpoint(
    State(state): State<RecordsState>,
    Path((scheme, file_id)): Path<(Scheme, ProcessedFileID)>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, Error> {
    caller.require_staff()?;

    let record = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;
        get_processed_file(scheme, file_id, &connection)?
    };

    let challan_path = match (&record.remittance_challan_path, record.remittance_submitted) {
        (Some(path), true) if !path.is_empty() => PathBuf::from(path),
        _ => {
            return Err(Error::NotFound(
                "No remittance challan found for this file".to_owned(),
            ));
        }
    };
    let bytes = read_stored_file(
        &challan_path,
        "Remittance file not found on server".to_owned(),
    )
    .await?;

    let month = record.upload_month.unwrap_or(record.created_at.date());
    let filename = format!(
        "{}_Remittance_{}_{file_id}.pdf",
        scheme.label(),
        format_underscored_date(month)
    );

    Ok(attachment(
        PDF_CONTENT_TYPE,
        &filename,
        vec![
            (
                HeaderName::from_static("x-remittance-month"),
                record
                    .upload_month
                    .map(format_iso_date)
                    .unwrap_or_default(),
            ),
            (
                HeaderName::from_static("x-remittance-amount"),
                record
                    .remittance_amount
                    .map(|amount| amount.to_string())
                    .unwrap_or_else(|| "0".to_owned()),
            ),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod submit_remittance_tests {
    use rusqlite::Connection;
    use time::macros::{date, datetime};

    use crate::{
        Error,
        auth::{Caller, Role, User},
        config::StorageConfig,
        db::initialize,
        processed_file::{
            get_processed_file,
            test_records::{insert, new_file, user},
        },
        remittance::{RemittanceForm, submit_remittance},
        scheme::Scheme,
    };

    fn get_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    fn caller(user: &User) -> Caller {
        Caller {
            user_id: user.id,
            role: user.role,
        }
    }

    fn form(date: &str, amount: &str, filename: &str) -> RemittanceForm {
        RemittanceForm {
            remittance_date: date.to_owned(),
            remittance_amount: amount.to_owned(),
            challan_filename: filename.to_owned(),
            challan: b"%PDF-1.4".to_vec(),
        }
    }

    #[test]
    fn stores_challan_and_updates_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::new(dir.path()).unwrap();
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::StateInsurance,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-01 10:00:00 UTC),
            ),
            &connection,
        );
        let now = datetime!(2024-06-14 16:20:05 UTC);

        let details = submit_remittance(
            Scheme::StateInsurance,
            record.id,
            &form("2024-06-14", "15230.50", "Challan.PDF"),
            &caller(&hr),
            &storage,
            now,
            &connection,
        )
        .unwrap();

        let expected_path = dir
            .path()
            .join("remittance_challans/2024-05-01")
            .join(format!("ESI_Remittance_2024_05_01_{}_20240614_162005.pdf", record.id));
        assert_eq!(details.challan_path, expected_path.display().to_string());
        assert_eq!(std::fs::read(&expected_path).unwrap(), b"%PDF-1.4");

        let record = get_processed_file(Scheme::StateInsurance, record.id, &connection).unwrap();
        assert!(record.remittance_submitted);
        assert_eq!(record.remittance_date, Some(date!(2024 - 06 - 14)));
        assert_eq!(record.remittance_month, Some(date!(2024 - 05 - 01)));
        assert_eq!(record.remittance_amount, Some(15230.5));
        assert_eq!(record.remittance_submitted_at, Some(now));
        assert_eq!(record.remittance_submitted_by, Some(hr.id));
    }

    #[test]
    fn rejects_bad_input_before_touching_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::new(dir.path()).unwrap();
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let now = datetime!(2024-06-14 16:20:05 UTC);

        let cases = [
            (
                form("14-06-2024", "100", "challan.pdf"),
                "Invalid date format. Please use YYYY-MM-DD format (e.g., 2023-05-01)",
            ),
            (
                form("2024-06-14", "100", "challan.png"),
                "Only PDF files are accepted",
            ),
            (
                form("2024-06-14", "0", "challan.pdf"),
                "Remittance amount must be positive",
            ),
            (
                form("2024-06-14", "-5", "challan.pdf"),
                "Remittance amount must be positive",
            ),
        ];

        for (form, message) in cases {
            let result = submit_remittance(
                Scheme::ProvidentFund,
                1,
                &form,
                &caller(&hr),
                &storage,
                now,
                &connection,
            );

            assert_eq!(result, Err(Error::InvalidInput(message.to_owned())));
        }

        assert!(!storage.challan_dir().exists());
    }

    #[test]
    fn unknown_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::new(dir.path()).unwrap();
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);

        let result = submit_remittance(
            Scheme::ProvidentFund,
            42,
            &form("2024-06-14", "100", "challan.pdf"),
            &caller(&hr),
            &storage,
            datetime!(2024-06-14 16:20:05 UTC),
            &connection,
        );

        assert_eq!(result, Err(Error::NotFound("File not found".to_owned())));
    }

    #[test]
    fn users_cannot_submit() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::new(dir.path()).unwrap();
        let connection = get_connection();
        let viewer = user("viewer", Role::User, &connection);

        let result = submit_remittance(
            Scheme::ProvidentFund,
            1,
            &form("2024-06-14", "100", "challan.pdf"),
            &caller(&viewer),
            &storage,
            datetime!(2024-06-14 16:20:05 UTC),
            &connection,
        );

        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[test]
    fn failed_update_removes_the_challan() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::new(dir.path()).unwrap();
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::ProvidentFund,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-01 10:00:00 UTC),
            ),
            &connection,
        );
        connection
            .execute_batch(
                "CREATE TRIGGER reject_update BEFORE UPDATE ON processed_file
                 BEGIN SELECT RAISE(ABORT, 'database is read only'); END;",
            )
            .unwrap();

        let result = submit_remittance(
            Scheme::ProvidentFund,
            record.id,
            &form("2024-06-14", "100", "challan.pdf"),
            &caller(&hr),
            &storage,
            datetime!(2024-06-14 16:20:05 UTC),
            &connection,
        );

        match result {
            Err(Error::PersistenceFailure(message)) => assert!(
                message.starts_with("Failed to update database: "),
                "got message {message}"
            ),
            other => panic!("expected a persistence failure, got {other:?}"),
        }
        let month_dir = storage.challan_dir().join("2024-05-01");
        let remaining: Vec<_> = std::fs::read_dir(&month_dir)
            .map(|entries| entries.map(|entry| entry.unwrap().path()).collect())
            .unwrap_or_default();
        assert!(remaining.is_empty(), "challans left behind: {remaining:?}");

        let record = get_processed_file(Scheme::ProvidentFund, record.id, &connection).unwrap();
        assert!(!record.remittance_submitted);
        assert_eq!(record.remittance_challan_path, None);
    }
}

#[cfg(test)]
mod remittance_endpoint_tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Extension, Router,
        routing::{get, post},
    };
    use axum_test::{
        TestServer,
        multipart::{MultipartForm, Part},
    };
    use rusqlite::Connection;
    use serde_json::json;
    use time::macros::{date, datetime};

    use crate::{
        auth::{Caller, Role, User},
        config::StorageConfig,
        db::initialize,
        endpoints::{self, format_scheme_endpoint},
        processed_file::{
            RecordsState,
            test_records::{insert, new_file, user},
        },
        remittance::{get_remittance_challan_endpoint, submit_remittance_endpoint},
        scheme::Scheme,
    };

    fn server(state: RecordsState, caller: &User) -> TestServer {
        let app = Router::new()
            .route(endpoints::SUBMIT_REMITTANCE, post(submit_remittance_endpoint))
            .route(
                endpoints::REMITTANCE_CHALLAN,
                get(get_remittance_challan_endpoint),
            )
            .layer(Extension(Caller {
                user_id: caller.id,
                role: caller.role,
            }))
            .with_state(state);

        TestServer::try_new(app).expect("Could not create test server.")
    }

    fn remittance_form(filename: &str) -> MultipartForm {
        MultipartForm::new()
            .add_text("remittance_date", "2024-06-14")
            .add_text("remittance_amount", "2500")
            .add_part(
                "remittance_file",
                Part::bytes(b"%PDF-1.7 challan".to_vec())
                    .file_name(filename)
                    .mime_type("application/pdf"),
            )
    }

    #[tokio::test]
    async fn submitted_challan_can_be_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::ProvidentFund,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-01 10:00:00 UTC),
            ),
            &connection,
        );
        let state = RecordsState {
            db_connection: Arc::new(Mutex::new(connection)),
            storage: StorageConfig::new(dir.path()).unwrap(),
            local_timezone: "Etc/UTC".to_owned(),
        };
        let server = server(state, &hr);

        let response = server
            .post(&format_scheme_endpoint(
                endpoints::SUBMIT_REMITTANCE,
                "pf",
                Some(record.id),
            ))
            .multipart(remittance_form("challan.pdf"))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Remittance submitted successfully");
        assert_eq!(body["details"]["remittance_month"], "2024-05-01");
        assert_eq!(body["details"]["remittance_date"], "2024-06-14");
        assert_eq!(body["details"]["remittance_amount"], 2500.0);

        let response = server
            .get(&format_scheme_endpoint(
                endpoints::REMITTANCE_CHALLAN,
                "pf",
                Some(record.id),
            ))
            .await;

        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), b"%PDF-1.7 challan");
        assert_eq!(response.header("x-remittance-month"), "2024-05-01");
        assert_eq!(response.header("x-remittance-amount"), "2500");
        assert_eq!(
            response.header("content-disposition"),
            format!(
                "attachment; filename=\"PF_Remittance_2024_05_01_{}.pdf\"",
                record.id
            )
            .as_str()
        );
    }

    #[tokio::test]
    async fn challan_of_unsubmitted_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::ProvidentFund,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-01 10:00:00 UTC),
            ),
            &connection,
        );
        let state = RecordsState {
            db_connection: Arc::new(Mutex::new(connection)),
            storage: StorageConfig::new(dir.path()).unwrap(),
            local_timezone: "Etc/UTC".to_owned(),
        };

        let response = server(state, &hr)
            .get(&format_scheme_endpoint(
                endpoints::REMITTANCE_CHALLAN,
                "pf",
                Some(record.id),
            ))
            .await;

        response.assert_status_not_found();
        response.assert_json(&json!({"detail": "No remittance challan found for this file"}));
    }

    #[tokio::test]
    async fn users_cannot_submit_remittances() {
        let dir = tempfile::tempdir().unwrap();
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let viewer = user("viewer", Role::User, &connection);
        let state = RecordsState {
            db_connection: Arc::new(Mutex::new(connection)),
            storage: StorageConfig::new(dir.path()).unwrap(),
            local_timezone: "Etc/UTC".to_owned(),
        };

        let response = server(state, &viewer)
            .post(&format_scheme_endpoint(
                endpoints::SUBMIT_REMITTANCE,
                "pf",
                Some(1),
            ))
            .multipart(remittance_form("challan.pdf"))
            .await;

        response.assert_status_forbidden();
    }
}
