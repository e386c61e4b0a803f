//! Financial-year date arithmetic.
//!
//! A financial year runs from April 1 to March 31 and is named by the calendar
//! year in which it ends, so financial year 2024 is 2023-04-01 to 2024-03-31.

use time::{
    Date, Month, OffsetDateTime, format_description::BorrowedFormatItem,
    macros::format_description,
};

use crate::Error;

/// Labels for the twelve month buckets of a financial year, April first.
pub const MONTH_LABELS: [&str; 12] = [
    "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb", "Mar",
];

/// The inclusive date range covered by a financial year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinancialYearWindow {
    /// April 1 of the previous calendar year.
    pub start: Date,
    /// March 31 of the named year.
    pub end: Date,
}

impl FinancialYearWindow {
    /// Get the window for the financial year ending in `year`.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidInput] if `year` is outside the range of representable dates.
    pub fn new(year: i32) -> Result<Self, Error> {
        let invalid_year = |_| Error::InvalidInput(format!("Invalid year: {year}"));
        let start = Date::from_calendar_date(year - 1, Month::April, 1).map_err(invalid_year)?;
        let end = Date::from_calendar_date(year, Month::March, 31).map_err(invalid_year)?;

        Ok(Self { start, end })
    }

    /// Whether `date` falls within the window, inclusive of both ends.
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Map a calendar month to its bucket index in a financial year, April=0 to March=11.
pub fn month_bucket(month: Month) -> usize {
    let month = u8::from(month) as usize;

    if month >= 4 { month - 4 } else { month + 8 }
}

/// The financial year that `date` belongs to.
pub fn financial_year_of(date: Date) -> i32 {
    if u8::from(date.month()) >= 4 {
        date.year() + 1
    } else {
        date.year()
    }
}

/// The first and last day of the calendar month containing `date`.
pub fn month_bounds(date: Date) -> (Date, Date) {
    let start = date.replace_day(1).unwrap_or(date);
    let mut end = start;

    while let Some(next) = end.next_day() {
        if next.month() != start.month() {
            break;
        }
        end = next;
    }

    (start, end)
}

/// The only date format accepted from clients and written to the database.
pub const ISO_DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// Dates as they appear in artifact and download file names, e.g. "2024_05_01".
const UNDERSCORED_DATE_FORMAT: &[BorrowedFormatItem] =
    format_description!("[year]_[month]_[day]");

/// Timestamps as they appear in folder and file names, e.g. "20240501_134502".
const COMPACT_TIMESTAMP_FORMAT: &[BorrowedFormatItem] =
    format_description!("[year][month][day]_[hour][minute][second]");

/// Parse a client supplied `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [Error::InvalidInput] if `text` is not a valid date in that format.
pub fn parse_iso_date(text: &str) -> Result<Date, Error> {
    Date::parse(text.trim(), ISO_DATE_FORMAT).map_err(|_| {
        Error::InvalidInput(
            "Invalid date format. Please use YYYY-MM-DD format (e.g., 2023-05-01)".to_owned(),
        )
    })
}

/// Format `date` as `YYYY-MM-DD`.
pub fn format_iso_date(date: Date) -> String {
    date.format(ISO_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Format `date` as `YYYY_MM_DD`.
pub fn format_underscored_date(date: Date) -> String {
    date.format(UNDERSCORED_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string().replace('-', "_"))
}

/// Format `timestamp` as `YYYYmmdd_HHMMSS`.
pub fn format_compact_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(COMPACT_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| timestamp.unix_timestamp().to_string())
}

pub mod iso_date {
    //! Serialize a [time::Date] as `YYYY-MM-DD`.
    use serde::Serializer;
    use time::Date;

    use super::ISO_DATE_FORMAT;

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = date
            .format(ISO_DATE_FORMAT)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

pub mod iso_date_option {
    //! Serialize an optional [time::Date] as `YYYY-MM-DD` or `null`.
    use serde::Serializer;
    use time::Date;

    pub fn serialize<S>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => super::iso_date::serialize(date, serializer),
            None => serializer.serialize_none(),
        }
    }
}

pub mod timestamp {
    //! Serialize a [time::OffsetDateTime] as `YYYY-MM-DDTHH:MM:SS`, dropping the
    //! offset and fraction the dashboard has no use for.
    use serde::Serializer;
    use time::{
        OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description,
    };

    const TIMESTAMP_FORMAT: &[BorrowedFormatItem] =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

    pub fn serialize<S>(timestamp: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = timestamp
            .format(TIMESTAMP_FORMAT)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

pub mod timestamp_option {
    //! Serialize an optional [time::OffsetDateTime] like [super::timestamp].
    use serde::Serializer;
    use time::OffsetDateTime;

    pub fn serialize<S>(timestamp: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match timestamp {
            Some(timestamp) => super::timestamp::serialize(timestamp, serializer),
            None => serializer.serialize_none(),
        }
    }
}
