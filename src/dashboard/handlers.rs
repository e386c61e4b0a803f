//! Dashboard HTTP handlers.
//!
//! Every handler reports on the records the caller can see: admins see all
//! records and everyone else only their own.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Extension, Json,
    extract::{FromRef, Query, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    auth::Caller,
    dashboard::{
        aggregation::{AverageDays, Delays, MonthlyAmounts, SummaryStats, Timeline, YearList},
        reports::{
            aggregate_delays, aggregate_monthly, aggregate_summary, aggregate_timeline,
            average_remittance_day, list_years,
        },
    },
    scheme::Scheme,
    timezone::local_today,
};

/// The state needed for the dashboard reports.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection for reading remittances.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Asia/Kolkata".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

impl DashboardState {
    fn connection(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)
    }

    /// The requested year, or the current year in the local timezone.
    fn year_or_current(&self, year: Option<i32>) -> Result<i32, Error> {
        match year {
            Some(year) => Ok(year),
            None => Ok(local_today(&self.local_timezone)?.year()),
        }
    }
}

/// The query parameters of the dashboard reports.
#[derive(Debug, Deserialize)]
pub struct YearQuery {
    /// The financial year for most reports, the calendar year for remittance days.
    pub year: Option<i32>,
}

/// The summary statistics alongside the monthly amounts they were drawn from.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    summary_stats: SummaryStats,
    monthly_amounts: MonthlyAmounts,
    year: i32,
}

/// Both submission timelines and the delay distribution of one year.
#[derive(Debug, Serialize)]
pub struct SubmissionsResponse {
    pf_submissions: Timeline,
    esi_submissions: Timeline,
    delayed_submissions: Delays,
    year: i32,
}

/// A route handler for the monthly remittance amounts of a financial year.
pub async fn get_monthly_amounts(
    State(state): State<DashboardState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<YearQuery>,
) -> Result<Json<MonthlyAmounts>, Error> {
    let year = state.year_or_current(query.year)?;
    let connection = state.connection()?;

    aggregate_monthly(year, caller.scope(), &connection).map(Json)
}

/// A route handler for the summary statistics of a financial year.
pub async fn get_summary_stats(
    State(state): State<DashboardState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<YearQuery>,
) -> Result<Json<SummaryResponse>, Error> {
    let year = state.year_or_current(query.year)?;
    let connection = state.connection()?;
    let scope = caller.scope();

    Ok(Json(SummaryResponse {
        summary_stats: aggregate_summary(year, scope, &connection)?,
        monthly_amounts: aggregate_monthly(year, scope, &connection)?,
        year,
    }))
}

/// A route handler for the submission timelines and delays of a financial year.
pub async fn get_submissions_data(
    State(state): State<DashboardState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<YearQuery>,
) -> Result<Json<SubmissionsResponse>, Error> {
    let year = state.year_or_current(query.year)?;
    let connection = state.connection()?;
    let scope = caller.scope();

    Ok(Json(SubmissionsResponse {
        pf_submissions: aggregate_timeline(Scheme::ProvidentFund, year, scope, &connection)?,
        esi_submissions: aggregate_timeline(Scheme::StateInsurance, year, scope, &connection)?,
        delayed_submissions: aggregate_delays(year, scope, &connection)?,
        year,
    }))
}

/// A route handler for the remittance delays of a financial year.
pub async fn get_delayed_submissions(
    State(state): State<DashboardState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<YearQuery>,
) -> Result<Json<Delays>, Error> {
    let year = state.year_or_current(query.year)?;
    let connection = state.connection()?;

    aggregate_delays(year, caller.scope(), &connection).map(Json)
}

/// A route handler for the financial years that have remittances.
pub async fn get_year_list(
    State(state): State<DashboardState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<YearList>, Error> {
    let connection = state.connection()?;

    list_years(caller.scope(), &connection).map(Json)
}

/// A route handler for the average remittance day of each month of a calendar year.
///
/// Unlike the other reports, the year must be given.
pub async fn get_remittance_days(
    State(state): State<DashboardState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<YearQuery>,
) -> Result<Json<AverageDays>, Error> {
    let year = query
        .year
        .ok_or_else(|| Error::InvalidInput("Year parameter is required".to_owned()))?;
    let connection = state.connection()?;

    average_remittance_day(year, caller.scope(), &connection).map(Json)
}
