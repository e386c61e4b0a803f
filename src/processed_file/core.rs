//! The processed file record: one row per upload batch, plus its remittance state.

use rusqlite::{Connection, Row, named_params};
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    auth::UserID,
    calendar::{iso_date_option, timestamp, timestamp_option},
    normalize::Status,
    scheme::Scheme,
};

/// Alias for the integer type used for processed file IDs.
pub type ProcessedFileID = i64;

/// The persisted outcome of one upload batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFile {
    pub id: ProcessedFileID,
    pub scheme: Scheme,
    pub user_id: UserID,
    /// The file name of the spreadsheet artifact.
    pub filename: String,
    /// The comma-joined artifact paths, empty if no artifacts were written.
    #[serde(skip)]
    pub filepath: String,
    pub status: Status,
    pub message: String,
    #[serde(serialize_with = "iso_date_option::serialize")]
    pub upload_month: Option<Date>,
    #[serde(serialize_with = "iso_date_option::serialize")]
    pub upload_date: Option<Date>,
    pub source_folder: String,
    pub processed_files_count: i64,
    pub success_files_count: i64,
    #[serde(serialize_with = "timestamp::serialize")]
    pub created_at: OffsetDateTime,
    #[serde(serialize_with = "timestamp_option::serialize")]
    pub updated_at: Option<OffsetDateTime>,
    pub remittance_submitted: bool,
    #[serde(serialize_with = "iso_date_option::serialize")]
    pub remittance_date: Option<Date>,
    #[serde(serialize_with = "iso_date_option::serialize")]
    pub remittance_month: Option<Date>,
    pub remittance_amount: Option<f64>,
    #[serde(skip)]
    pub remittance_challan_path: Option<String>,
    #[serde(serialize_with = "timestamp_option::serialize")]
    pub remittance_submitted_at: Option<OffsetDateTime>,
    pub remittance_submitted_by: Option<UserID>,
}

/// The values of a new record, written once when a batch finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProcessedFile {
    pub scheme: Scheme,
    pub user_id: UserID,
    pub filename: String,
    pub filepath: String,
    pub status: Status,
    pub message: String,
    pub upload_month: Date,
    pub upload_date: Date,
    pub source_folder: String,
    pub processed_files_count: i64,
    pub success_files_count: i64,
    pub created_at: OffsetDateTime,
}

/// The remittance fields written by a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RemittanceUpdate {
    pub remittance_date: Date,
    pub remittance_amount: f64,
    pub challan_path: String,
    pub submitted_at: OffsetDateTime,
    pub submitted_by: UserID,
}

/// Create the processed file table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_processed_file_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS processed_file (
                id INTEGER PRIMARY KEY,
                scheme TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                filepath TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                upload_month TEXT,
                upload_date TEXT,
                source_folder TEXT NOT NULL DEFAULT '',
                processed_files_count INTEGER NOT NULL DEFAULT 0,
                success_files_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                remittance_submitted INTEGER NOT NULL DEFAULT 0,
                remittance_date TEXT,
                remittance_month TEXT,
                remittance_amount REAL,
                remittance_challan_path TEXT,
                remittance_submitted_at TEXT,
                remittance_submitted_by INTEGER,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_processed_file_scheme_month
            ON processed_file(scheme, upload_month)",
        (),
    )?;

    Ok(())
}

const SELECT_COLUMNS: &str = "SELECT id, scheme, user_id, filename, filepath, status, message,
    upload_month, upload_date, source_folder, processed_files_count, success_files_count,
    created_at, updated_at, remittance_submitted, remittance_date, remittance_month,
    remittance_amount, remittance_challan_path, remittance_submitted_at, remittance_submitted_by
    FROM processed_file";

/// Insert a record for a finished batch.
///
/// # Errors
///
/// Returns [Error::SqlError] if the insert failed.
pub fn insert_processed_file(
    new_file: &NewProcessedFile,
    connection: &Connection,
) -> Result<ProcessedFile, Error> {
    connection.execute(
        "INSERT INTO processed_file (scheme, user_id, filename, filepath, status, message,
            upload_month, upload_date, source_folder, processed_files_count,
            success_files_count, created_at)
         VALUES (:scheme, :user_id, :filename, :filepath, :status, :message, :upload_month,
            :upload_date, :source_folder, :processed_files_count, :success_files_count,
            :created_at)",
        named_params! {
            ":scheme": new_file.scheme,
            ":user_id": new_file.user_id,
            ":filename": new_file.filename,
            ":filepath": new_file.filepath,
            ":status": new_file.status,
            ":message": new_file.message,
            ":upload_month": new_file.upload_month,
            ":upload_date": new_file.upload_date,
            ":source_folder": new_file.source_folder,
            ":processed_files_count": new_file.processed_files_count,
            ":success_files_count": new_file.success_files_count,
            ":created_at": new_file.created_at,
        },
    )?;

    get_processed_file(new_file.scheme, connection.last_insert_rowid(), connection)
}

/// Get the record `id` of `scheme`.
///
/// # Errors
///
/// Returns [Error::NotFound] with the message "File not found" if there is no
/// such record for the scheme.
pub fn get_processed_file(
    scheme: Scheme,
    id: ProcessedFileID,
    connection: &Connection,
) -> Result<ProcessedFile, Error> {
    connection
        .prepare(&format!("{SELECT_COLUMNS} WHERE id = :id AND scheme = :scheme"))?
        .query_row(named_params! {":id": id, ":scheme": scheme}, map_processed_file_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("File not found".to_owned()),
            error => error.into(),
        })
}

/// Get the records of `scheme` whose upload month lies in `start..=end`, newest first.
///
/// `owner` limits the result to one user's records, `None` returns everyone's.
///
/// # Errors
///
/// Returns [Error::SqlError] if the query failed.
pub fn get_processed_files_for_month(
    scheme: Scheme,
    start: Date,
    end: Date,
    owner: Option<UserID>,
    connection: &Connection,
) -> Result<Vec<ProcessedFile>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_COLUMNS}
            WHERE scheme = :scheme
                AND upload_month BETWEEN :start AND :end
                AND (:owner IS NULL OR user_id = :owner)
            ORDER BY created_at DESC, id DESC"
        ))?
        .query_map(
            named_params! {
                ":scheme": scheme,
                ":start": start,
                ":end": end,
                ":owner": owner,
            },
            map_processed_file_row,
        )?
        .map(|maybe_file| maybe_file.map_err(Error::from))
        .collect()
}

/// Mark a record as failed, e.g. when its artifacts have gone missing.
///
/// # Errors
///
/// Returns [Error::SqlError] if the update failed.
pub fn mark_processed_file_error(
    id: ProcessedFileID,
    message: &str,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE processed_file SET status = :status, message = :message, updated_at = :now
         WHERE id = :id",
        named_params! {
            ":status": Status::Error,
            ":message": message,
            ":now": now,
            ":id": id,
        },
    )?;

    Ok(())
}

/// Write a remittance submission to record `id`.
///
/// The remittance month is copied from the record's upload month. Any earlier
/// submission is overwritten.
///
/// # Errors
///
/// Returns [Error::NotFound] if there is no such record, or [Error::SqlError]
/// if the update failed.
pub fn record_remittance(
    id: ProcessedFileID,
    update: &RemittanceUpdate,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_updated = connection.execute(
        "UPDATE processed_file SET
            remittance_submitted = 1,
            remittance_date = :remittance_date,
            remittance_month = upload_month,
            remittance_amount = :remittance_amount,
            remittance_challan_path = :challan_path,
            remittance_submitted_at = :submitted_at,
            remittance_submitted_by = :submitted_by,
            updated_at = :submitted_at
         WHERE id = :id",
        named_params! {
            ":remittance_date": update.remittance_date,
            ":remittance_amount": update.remittance_amount,
            ":challan_path": update.challan_path,
            ":submitted_at": update.submitted_at,
            ":submitted_by": update.submitted_by,
            ":id": id,
        },
    )?;

    if rows_updated == 0 {
        return Err(Error::NotFound("File not found".to_owned()));
    }

    Ok(())
}

fn map_processed_file_row(row: &Row) -> Result<ProcessedFile, rusqlite::Error> {
    Ok(ProcessedFile {
        id: row.get(0)?,
        scheme: row.get(1)?,
        user_id: row.get(2)?,
        filename: row.get(3)?,
        filepath: row.get(4)?,
        status: row.get(5)?,
        message: row.get(6)?,
        upload_month: row.get(7)?,
        upload_date: row.get(8)?,
        source_folder: row.get(9)?,
        processed_files_count: row.get(10)?,
        success_files_count: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        remittance_submitted: row.get(14)?,
        remittance_date: row.get(15)?,
        remittance_month: row.get(16)?,
        remittance_amount: row.get(17)?,
        remittance_challan_path: row.get(18)?,
        remittance_submitted_at: row.get(19)?,
        remittance_submitted_by: row.get(20)?,
    })
}

#[cfg(test)]
pub(crate) mod test_records {
    //! Helpers for inserting records in tests.
    use rusqlite::Connection;
    use time::{Date, OffsetDateTime};

    use crate::{
        auth::{PasswordHash, Role, User, create_user},
        normalize::Status,
        processed_file::{NewProcessedFile, ProcessedFile, insert_processed_file},
        scheme::Scheme,
    };

    /// Create a user with a placeholder password hash.
    pub fn user(username: &str, role: Role, connection: &Connection) -> User {
        create_user(username, PasswordHash::new_unchecked("hash"), role, connection).unwrap()
    }

    /// A successful batch for `user` with no artifacts on disk.
    pub fn new_file(
        scheme: Scheme,
        user: &User,
        upload_month: Date,
        created_at: OffsetDateTime,
    ) -> NewProcessedFile {
        NewProcessedFile {
            scheme,
            user_id: user.id,
            filename: "Branch_2024_05_01.xlsx".to_owned(),
            filepath: String::new(),
            status: Status::Success,
            message: "All files processed successfully.".to_owned(),
            upload_month,
            upload_date: created_at.date(),
            source_folder: "Branch".to_owned(),
            processed_files_count: 1,
            success_files_count: 1,
            created_at,
        }
    }

    /// Insert `new_file` and return the stored record.
    pub fn insert(new_file: NewProcessedFile, connection: &Connection) -> ProcessedFile {
        insert_processed_file(&new_file, connection).unwrap()
    }
}

#[cfg(test)]
mod processed_file_tests {
    use rusqlite::Connection;
    use time::macros::{date, datetime};

    use crate::{
        Error,
        auth::Role,
        db::initialize,
        normalize::Status,
        processed_file::{
            RemittanceUpdate, get_processed_file, get_processed_files_for_month,
            mark_processed_file_error, record_remittance,
            test_records::{insert, new_file, user},
        },
        scheme::Scheme,
    };

    fn get_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn insert_round_trips() {
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let new_record = new_file(
            Scheme::ProvidentFund,
            &hr,
            date!(2024 - 05 - 01),
            datetime!(2024-06-03 09:15:42 UTC),
        );

        let record = insert(new_record.clone(), &connection);

        assert_eq!(record.scheme, Scheme::ProvidentFund);
        assert_eq!(record.user_id, hr.id);
        assert_eq!(record.upload_month, Some(date!(2024 - 05 - 01)));
        assert_eq!(record.created_at, datetime!(2024-06-03 09:15:42 UTC));
        assert!(!record.remittance_submitted);
        assert_eq!(get_processed_file(Scheme::ProvidentFund, record.id, &connection), Ok(record));
    }

    #[test]
    fn record_of_other_scheme_is_not_found() {
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::ProvidentFund,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-03 09:15:42 UTC),
            ),
            &connection,
        );

        assert_eq!(
            get_processed_file(Scheme::StateInsurance, record.id, &connection),
            Err(Error::NotFound("File not found".to_owned()))
        );
    }

    #[test]
    fn month_query_filters_by_range_and_owner() {
        let connection = get_connection();
        let asha = user("asha", Role::Hr, &connection);
        let ravi = user("ravi", Role::Hr, &connection);
        let first = insert(
            new_file(
                Scheme::StateInsurance,
                &asha,
                date!(2024 - 05 - 01),
                datetime!(2024-06-01 10:00:00 UTC),
            ),
            &connection,
        );
        let second = insert(
            new_file(
                Scheme::StateInsurance,
                &asha,
                date!(2024 - 05 - 20),
                datetime!(2024-06-02 10:00:00 UTC),
            ),
            &connection,
        );
        let others = insert(
            new_file(
                Scheme::StateInsurance,
                &ravi,
                date!(2024 - 05 - 01),
                datetime!(2024-06-03 10:00:00 UTC),
            ),
            &connection,
        );
        insert(
            new_file(
                Scheme::StateInsurance,
                &asha,
                date!(2024 - 06 - 01),
                datetime!(2024-07-01 10:00:00 UTC),
            ),
            &connection,
        );

        let own = get_processed_files_for_month(
            Scheme::StateInsurance,
            date!(2024 - 05 - 01),
            date!(2024 - 05 - 31),
            Some(asha.id),
            &connection,
        )
        .unwrap();
        let everyone = get_processed_files_for_month(
            Scheme::StateInsurance,
            date!(2024 - 05 - 01),
            date!(2024 - 05 - 31),
            None,
            &connection,
        )
        .unwrap();

        assert_eq!(own, vec![second.clone(), first.clone()]);
        assert_eq!(everyone, vec![others, second, first]);
    }

    #[test]
    fn marks_record_as_error() {
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::ProvidentFund,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-03 09:15:42 UTC),
            ),
            &connection,
        );

        mark_processed_file_error(
            record.id,
            "Output files not found on server",
            datetime!(2024-06-04 00:00:00 UTC),
            &connection,
        )
        .unwrap();

        let record = get_processed_file(Scheme::ProvidentFund, record.id, &connection).unwrap();
        assert_eq!(record.status, Status::Error);
        assert_eq!(record.message, "Output files not found on server");
        assert_eq!(record.updated_at, Some(datetime!(2024-06-04 00:00:00 UTC)));
    }

    #[test]
    fn remittance_copies_upload_month_and_overwrites_earlier_submission() {
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::ProvidentFund,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-03 09:15:42 UTC),
            ),
            &connection,
        );
        let mut update = RemittanceUpdate {
            remittance_date: date!(2024 - 06 - 12),
            remittance_amount: 1500.0,
            challan_path: "/srv/challan.pdf".to_owned(),
            submitted_at: datetime!(2024-06-12 11:00:00 UTC),
            submitted_by: hr.id,
        };
        record_remittance(record.id, &update, &connection).unwrap();
        update.remittance_amount = 1750.5;

        record_remittance(record.id, &update, &connection).unwrap();

        let record = get_processed_file(Scheme::ProvidentFund, record.id, &connection).unwrap();
        assert!(record.remittance_submitted);
        assert_eq!(record.remittance_date, Some(date!(2024 - 06 - 12)));
        assert_eq!(record.remittance_month, Some(date!(2024 - 05 - 01)));
        assert_eq!(record.remittance_amount, Some(1750.5));
        assert_eq!(record.remittance_challan_path.as_deref(), Some("/srv/challan.pdf"));
        assert_eq!(record.remittance_submitted_by, Some(hr.id));
    }

    #[test]
    fn remittance_for_missing_record_is_not_found() {
        let connection = get_connection();
        let update = RemittanceUpdate {
            remittance_date: date!(2024 - 06 - 12),
            remittance_amount: 1.0,
            challan_path: String::new(),
            submitted_at: datetime!(2024-06-12 11:00:00 UTC),
            submitted_by: crate::auth::UserID::new(1),
        };

        assert_eq!(
            record_remittance(404, &update, &connection),
            Err(Error::NotFound("File not found".to_owned()))
        );
    }

    #[test]
    fn serializes_dates_as_iso_strings() {
        let connection = get_connection();
        let hr = user("hr", Role::Hr, &connection);
        let record = insert(
            new_file(
                Scheme::ProvidentFund,
                &hr,
                date!(2024 - 05 - 01),
                datetime!(2024-06-03 09:15:42 UTC),
            ),
            &connection,
        );

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["upload_month"], "2024-05-01");
        assert_eq!(json["created_at"], "2024-06-03T09:15:42");
        assert_eq!(json["scheme"], "pf");
        assert_eq!(json["remittance_date"], serde_json::Value::Null);
        assert!(json.get("filepath").is_none());
    }
}
