//! Repairs date columns written in the legacy text formats.
//!
//! Older records hold dates as `MM-YYYY`, `DD-MM-YYYY` or `YYYY-MM-DD HH:MM:SS`
//! strings. They are rewritten to plain `YYYY-MM-DD` once at start-up so the
//! rest of the application only ever reads typed dates.

use rusqlite::{Connection, named_params};
use time::{Date, Month, format_description::BorrowedFormatItem, macros::format_description};

use crate::calendar::ISO_DATE_FORMAT;

const DATE_COLUMNS: [&str; 4] = [
    "upload_month",
    "upload_date",
    "remittance_date",
    "remittance_month",
];

const DAY_FIRST_FORMAT: &[BorrowedFormatItem] = format_description!("[day]-[month]-[year]");

/// Parse a date in any of the formats legacy records were written in.
///
/// `MM-YYYY` is taken to mean the first of that month.
pub fn parse_legacy_date(text: &str) -> Option<Date> {
    let text = text.trim();

    if let Some(prefix) = text.get(..10)
        && let Ok(date) = Date::parse(prefix, ISO_DATE_FORMAT)
    {
        return Some(date);
    }

    if let Ok(date) = Date::parse(text, DAY_FIRST_FORMAT) {
        return Some(date);
    }

    let (month, year) = text.split_once('-')?;
    let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    let year = year.parse::<i32>().ok()?;

    Date::from_calendar_date(year, month, 1).ok()
}

/// Rewrite every legacy formatted date in the processed file table.
///
/// Values that cannot be parsed are set to NULL. Returns the number of values changed.
///
/// # Errors
///
/// Returns an error if the SQL queries failed.
pub fn normalize_legacy_dates(connection: &Connection) -> Result<usize, rusqlite::Error> {
    let mut changed = 0;

    for column in DATE_COLUMNS {
        let legacy_values: Vec<(i64, String)> = connection
            .prepare(&format!(
                "SELECT id, CAST({column} AS TEXT) FROM processed_file
                 WHERE {column} IS NOT NULL
                    AND CAST({column} AS TEXT) NOT GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'"
            ))?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        for (id, legacy_value) in legacy_values {
            let repaired = parse_legacy_date(&legacy_value);

            match repaired {
                Some(date) => tracing::warn!(
                    "rewriting legacy {column} \"{legacy_value}\" of processed file {id} as {date}"
                ),
                None => tracing::warn!(
                    "clearing unparseable {column} \"{legacy_value}\" of processed file {id}"
                ),
            }

            connection.execute(
                &format!("UPDATE processed_file SET {column} = :value WHERE id = :id"),
                named_params! {":value": repaired, ":id": id},
            )?;
            changed += 1;
        }
    }

    Ok(changed)
}
