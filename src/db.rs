//! Sets up the application's database.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error,
    auth::create_user_table,
    processed_file::{create_processed_file_table, normalize_legacy_dates},
};

/// Create the tables for the domain models and repair any legacy date strings.
///
/// Safe to call on an existing database.
///
/// # Errors
/// Returns [Error::SqlError] if a table could not be created or a legacy date
/// could not be rewritten. Nothing is changed in that case.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_processed_file_table(&transaction)?;

    let repaired = normalize_legacy_dates(&transaction)?;
    if repaired > 0 {
        tracing::warn!("repaired {repaired} legacy date values");
    }

    transaction.commit()?;

    Ok(())
}

#[cfg(test)]
mod db_tests {
    use rusqlite::Connection;

    use crate::db::initialize;

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();
        initialize(&connection).unwrap();

        let table_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('user', 'processed_file')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 2);
    }

    #[test]
    fn initialize_repairs_legacy_dates() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
            .execute(
                "INSERT INTO user (username, password, role) VALUES ('hr', 'hash', 'hr')",
                (),
            )
            .unwrap();
        connection
            .execute(
                "INSERT INTO processed_file (scheme, user_id, filename, status, upload_month, created_at)
                 VALUES ('pf', 1, 'a.xlsx', 'success', '05-2024', '2024-05-02 10:00:00.0 +00:00:00')",
                (),
            )
            .unwrap();

        initialize(&connection).unwrap();

        let upload_month: String = connection
            .query_row("SELECT upload_month FROM processed_file", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(upload_month, "2024-05-01");
    }
}
