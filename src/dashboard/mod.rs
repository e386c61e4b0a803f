//! Dashboard module
//!
//! Reports remittance totals, timelines and delays per financial year, charted
//! by the front end from the JSON these handlers return.

mod aggregation;
mod handlers;
mod records;
mod reports;

pub use aggregation::{
    AverageDay, AverageDays, Delay, Delays, MonthlyAmounts, PerScheme, SchemeSummary,
    SummaryStats, Timeline, TimelinePoint, YearList,
};
pub use handlers::{
    DashboardState, SubmissionsResponse, SummaryResponse, YearQuery, get_delayed_submissions,
    get_monthly_amounts, get_remittance_days, get_submissions_data, get_summary_stats,
    get_year_list,
};
pub use reports::{
    aggregate_delays, aggregate_monthly, aggregate_summary, aggregate_timeline,
    average_remittance_day, list_years,
};
