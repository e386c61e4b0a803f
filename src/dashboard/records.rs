//! Database queries for retrieving the remittances the dashboard aggregates.

use rusqlite::{Connection, named_params};
use time::{Date, OffsetDateTime};

use crate::{Error, auth::Scope, scheme::Scheme};

/// The remittance fields of a processed file record.
///
/// Kept separate from [crate::processed_file::ProcessedFile] because the
/// dashboard only needs these columns for charting.
#[derive(Debug, Clone)]
pub(super) struct RemittanceRecord {
    pub scheme: Scheme,
    pub remittance_submitted: bool,
    pub remittance_date: Option<Date>,
    pub remittance_month: Option<Date>,
    pub remittance_amount: Option<f64>,
    pub upload_month: Option<Date>,
    pub created_at: Option<OffsetDateTime>,
}

/// Gets every record with a remittance date that `scope` can see, for both schemes.
///
/// # Errors
/// Returns [Error::SqlError] if the query could not be prepared or run.
pub(super) fn get_remittance_records(
    scope: Scope,
    connection: &Connection,
) -> Result<Vec<RemittanceRecord>, Error> {
    connection
        .prepare(
            "SELECT
                scheme,
                remittance_submitted,
                remittance_date,
                remittance_month,
                remittance_amount,
                upload_month,
                created_at
            FROM processed_file
            WHERE remittance_date IS NOT NULL
                AND (:owner IS NULL OR user_id = :owner)
            ORDER BY id",
        )?
        .query_map(named_params! { ":owner": scope.owner() }, |row| {
            Ok(RemittanceRecord {
                scheme: row.get(0)?,
                remittance_submitted: row.get(1)?,
                remittance_date: row.get(2)?,
                remittance_month: row.get(3)?,
                remittance_amount: row.get(4)?,
                upload_month: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<RemittanceRecord>, rusqlite::Error>>()
        .map_err(|error| error.into())
}
