//! The dashboard reports: remittance queries scoped to the caller, then aggregated.

use rusqlite::Connection;

use crate::{
    Error,
    auth::Scope,
    calendar::FinancialYearWindow,
    dashboard::{
        aggregation::{
            AverageDays, Delays, MonthlyAmounts, SummaryStats, Timeline, YearList, average_days,
            delays, monthly_sums, summary, timeline, years,
        },
        records::get_remittance_records,
    },
    scheme::Scheme,
};

/// The remitted amount per month of financial year `year` for each scheme.
///
/// # Errors
/// Returns [Error::InvalidInput] for an unrepresentable year, or [Error::SqlError]
/// if the records could not be read.
pub fn aggregate_monthly(
    year: i32,
    scope: Scope,
    connection: &Connection,
) -> Result<MonthlyAmounts, Error> {
    let window = FinancialYearWindow::new(year)?;
    let records = get_remittance_records(scope, connection)?;

    Ok(monthly_sums(&records, window))
}

/// The remittance count, total and average of each scheme in financial year `year`.
///
/// # Errors
/// Returns [Error::InvalidInput] for an unrepresentable year, or [Error::SqlError]
/// if the records could not be read.
pub fn aggregate_summary(
    year: i32,
    scope: Scope,
    connection: &Connection,
) -> Result<SummaryStats, Error> {
    let window = FinancialYearWindow::new(year)?;
    let records = get_remittance_records(scope, connection)?;

    Ok(summary(&records, window))
}

/// The remittances of `scheme` in financial year `year` as points per month.
///
/// # Errors
/// Returns [Error::InvalidInput] for an unrepresentable year, or [Error::SqlError]
/// if the records could not be read.
pub fn aggregate_timeline(
    scheme: Scheme,
    year: i32,
    scope: Scope,
    connection: &Connection,
) -> Result<Timeline, Error> {
    let window = FinancialYearWindow::new(year)?;
    let records = get_remittance_records(scope, connection)?;

    Ok(timeline(&records, scheme, window))
}

/// The remittance delays of financial year `year` per month for each scheme.
///
/// # Errors
/// Returns [Error::InvalidInput] for an unrepresentable year, or [Error::SqlError]
/// if the records could not be read.
pub fn aggregate_delays(year: i32, scope: Scope, connection: &Connection) -> Result<Delays, Error> {
    let window = FinancialYearWindow::new(year)?;
    let records = get_remittance_records(scope, connection)?;

    Ok(delays(&records, window))
}

/// Every financial year the caller has remittances in.
///
/// # Errors
/// Returns [Error::SqlError] if the records could not be read.
pub fn list_years(scope: Scope, connection: &Connection) -> Result<YearList, Error> {
    let records = get_remittance_records(scope, connection)?;

    Ok(years(&records))
}

/// The average remittance day per month for remittances made in calendar year `year`.
///
/// # Errors
/// Returns [Error::SqlError] if the records could not be read.
pub fn average_remittance_day(
    year: i32,
    scope: Scope,
    connection: &Connection,
) -> Result<AverageDays, Error> {
    let records = get_remittance_records(scope, connection)?;

    Ok(average_days(&records, year))
}
