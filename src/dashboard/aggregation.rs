//! Buckets remittance records into the financial-year series the dashboard charts.
//!
//! Every function here is pure: it takes records that were already scoped to
//! the caller and a [FinancialYearWindow] or year, and returns a response body.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::{Date, Month};

use crate::{
    calendar::{FinancialYearWindow, MONTH_LABELS, financial_year_of, month_bucket},
    dashboard::records::RemittanceRecord,
    scheme::Scheme,
};

/// The radius of every point in a submission timeline.
const POINT_RADIUS: u8 = 5;

/// The day of the upload month that remittance delays are measured from.
const DELAY_REFERENCE_DAY: u8 = 15;

/// One value per scheme, serialized with the scheme labels as keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerScheme<T> {
    #[serde(rename = "PF")]
    pub pf: T,
    #[serde(rename = "ESI")]
    pub esi: T,
}

impl<T> PerScheme<T> {
    fn get_mut(&mut self, scheme: Scheme) -> &mut T {
        match scheme {
            Scheme::ProvidentFund => &mut self.pf,
            Scheme::StateInsurance => &mut self.esi,
        }
    }
}

/// The remitted amount per financial-year month for each scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAmounts {
    pub labels: [&'static str; 12],
    pub datasets: PerScheme<[f64; 12]>,
}

/// The total, count and average remittance of one scheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemeSummary {
    pub total: f64,
    pub count: usize,
    pub average: f64,
}

/// The summary statistics of a financial year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    #[serde(rename = "PF")]
    pub pf: SchemeSummary,
    #[serde(rename = "ESI")]
    pub esi: SchemeSummary,
    /// The share of provident fund remittances counted as on time.
    pub on_time_rate: f64,
}

/// A point of a submission timeline: day of the month, amount and radius.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    pub x: u8,
    pub y: f64,
    pub r: u8,
}

/// The remittances of one scheme as points per financial-year month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub labels: [&'static str; 12],
    pub points: Vec<Vec<TimelinePoint>>,
}

/// How many days after the reference date a remittance was made. Negative if early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delay {
    pub delay_days: i64,
}

/// The remittance delays per financial-year month for each scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delays {
    pub labels: [&'static str; 12],
    pub datasets: PerScheme<Vec<Vec<Delay>>>,
}

/// The financial years that have at least one remittance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearList {
    pub yearlist: Vec<i32>,
}

/// The average day of the month remittances for one month were made on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AverageDay {
    /// The full name of the remittance month, e.g. "April".
    pub month: String,
    pub day: i64,
}

/// The average remittance days of a calendar year for each scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AverageDays {
    pub pf: Vec<AverageDay>,
    pub esi: Vec<AverageDay>,
}

fn empty_buckets<T>() -> Vec<Vec<T>> {
    (0..12).map(|_| Vec::new()).collect()
}

/// Sum the remittance amounts of each scheme per month of the financial year.
///
/// Records are bucketed by their remittance month. Records that were not
/// submitted or lack an amount or a remittance date are left out. Every month
/// without remittances is zero.
pub(super) fn monthly_sums(
    records: &[RemittanceRecord],
    window: FinancialYearWindow,
) -> MonthlyAmounts {
    let mut datasets = PerScheme {
        pf: [0.0; 12],
        esi: [0.0; 12],
    };

    for record in records {
        if !record.remittance_submitted || record.remittance_date.is_none() {
            continue;
        }

        let (Some(month), Some(amount)) = (record.remittance_month, record.remittance_amount)
        else {
            continue;
        };

        if window.contains(month) {
            datasets.get_mut(record.scheme)[month_bucket(month.month())] += amount;
        }
    }

    MonthlyAmounts {
        labels: MONTH_LABELS,
        datasets,
    }
}

/// Count, total and average the remittances of each scheme made within the window.
///
/// Every submitted remittance dated within the window is counted; the total and
/// average only use those with a non-zero amount.
///
/// The on-time rate counts every provident fund remittance in the window as on
/// time, so it is 1 whenever there are any and 0 otherwise. There is no due
/// date rule to compare against yet.
pub(super) fn summary(records: &[RemittanceRecord], window: FinancialYearWindow) -> SummaryStats {
    let mut amounts: PerScheme<Vec<f64>> = PerScheme::default();
    let mut counts: PerScheme<usize> = PerScheme::default();
    let mut on_time = 0;

    for record in records {
        let Some(date) = record.remittance_date else {
            continue;
        };

        if !record.remittance_submitted || !window.contains(date) {
            continue;
        }

        *counts.get_mut(record.scheme) += 1;

        if record.scheme == Scheme::ProvidentFund {
            on_time += 1;
        }

        if let Some(amount) = record.remittance_amount.filter(|amount| *amount != 0.0) {
            amounts.get_mut(record.scheme).push(amount);
        }
    }

    let scheme_summary = |amounts: &[f64], count: usize| {
        let total: f64 = amounts.iter().sum();
        let average = if amounts.is_empty() {
            0.0
        } else {
            total / amounts.len() as f64
        };

        SchemeSummary {
            total,
            count,
            average,
        }
    };

    let on_time_rate = if counts.pf > 0 {
        on_time as f64 / counts.pf as f64
    } else {
        0.0
    };

    SummaryStats {
        pf: scheme_summary(&amounts.pf, counts.pf),
        esi: scheme_summary(&amounts.esi, counts.esi),
        on_time_rate,
    }
}

/// Plot the remittances of `scheme` as (day of month, amount) points per month.
///
/// Records are bucketed by their remittance date and need an amount.
pub(super) fn timeline(
    records: &[RemittanceRecord],
    scheme: Scheme,
    window: FinancialYearWindow,
) -> Timeline {
    let mut points = empty_buckets();

    for record in records.iter().filter(|record| record.scheme == scheme) {
        if !record.remittance_submitted {
            continue;
        }

        let (Some(date), Some(amount)) = (record.remittance_date, record.remittance_amount) else {
            continue;
        };

        if window.contains(date) {
            points[month_bucket(date.month())].push(TimelinePoint {
                x: date.day(),
                y: amount,
                r: POINT_RADIUS,
            });
        }
    }

    Timeline {
        labels: MONTH_LABELS,
        points,
    }
}

/// The date a remittance delay is measured from: the 15th of the upload month,
/// or the creation date of records without one.
fn delay_reference(record: &RemittanceRecord) -> Option<Date> {
    match record.upload_month {
        Some(month) => month.replace_day(DELAY_REFERENCE_DAY).ok(),
        None => record.created_at.map(|created_at| created_at.date()),
    }
}

/// The delay of every submitted remittance in the window, bucketed by remittance date.
///
/// Early remittances have a negative delay. A record without any reference
/// date has a delay of zero.
pub(super) fn delays(records: &[RemittanceRecord], window: FinancialYearWindow) -> Delays {
    let mut datasets = PerScheme {
        pf: empty_buckets(),
        esi: empty_buckets(),
    };

    for record in records {
        let Some(date) = record.remittance_date else {
            continue;
        };

        if !record.remittance_submitted || !window.contains(date) {
            continue;
        }

        let delay_days = delay_reference(record)
            .map(|reference| (date - reference).whole_days())
            .unwrap_or(0);

        datasets.get_mut(record.scheme)[month_bucket(date.month())].push(Delay { delay_days });
    }

    Delays {
        labels: MONTH_LABELS,
        datasets,
    }
}

/// The distinct financial years of every remittance date, in ascending order.
pub(super) fn years(records: &[RemittanceRecord]) -> YearList {
    let years: BTreeSet<i32> = records
        .iter()
        .filter_map(|record| record.remittance_date)
        .map(financial_year_of)
        .collect();

    YearList {
        yearlist: years.into_iter().collect(),
    }
}

/// The average day of the month remittances were made on, per remittance month.
///
/// Only remittances dated in calendar year `year` are used, regardless of the
/// financial year their remittance month falls in. Months are returned in
/// chronological order and averages are rounded half to even.
pub(super) fn average_days(records: &[RemittanceRecord], year: i32) -> AverageDays {
    let mut days: PerScheme<BTreeMap<(i32, u8), (Month, Vec<u8>)>> = PerScheme::default();

    for record in records {
        let (Some(date), Some(month)) = (record.remittance_date, record.remittance_month) else {
            continue;
        };

        if date.year() != year {
            continue;
        }

        days.get_mut(record.scheme)
            .entry((month.year(), u8::from(month.month())))
            .or_insert_with(|| (month.month(), Vec::new()))
            .1
            .push(date.day());
    }

    let averages = |groups: BTreeMap<(i32, u8), (Month, Vec<u8>)>| -> Vec<AverageDay> {
        groups
            .into_values()
            .map(|(month, days)| {
                let sum: u32 = days.iter().map(|day| u32::from(*day)).sum();
                let average = f64::from(sum) / days.len() as f64;

                AverageDay {
                    month: month.to_string(),
                    day: average.round_ties_even() as i64,
                }
            })
            .collect()
    };

    AverageDays {
        pf: averages(days.pf),
        esi: averages(days.esi),
    }
}
