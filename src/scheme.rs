//! The two statutory payroll-deduction schemes and their fixed output layouts.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

/// A statutory payroll-deduction scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// The provident fund scheme (PF).
    #[serde(rename = "pf")]
    ProvidentFund,
    /// The state insurance scheme (ESI).
    #[serde(rename = "esi")]
    StateInsurance,
}

/// Logical field names for the provident fund scheme, as understood by the row transformer.
pub mod pf_field {
    /// The member's universal account number.
    pub const UAN: &str = "UAN No";
    /// The member's name.
    pub const NAME: &str = "Employee Name";
    /// Total gross wages for the month.
    pub const GROSS_WAGES: &str = "Gross Wages";
    /// The part of the gross wages that is eligible for EPF.
    pub const EPF_WAGES: &str = "EPF Wages";
    /// Loss-of-pay days.
    pub const LOP_DAYS: &str = "LOP Days";
}

/// Logical field names for the state insurance scheme, as understood by the row transformer.
pub mod esi_field {
    /// The member's insurance number.
    pub const ESI_NUMBER: &str = "ESI No";
    /// The member's name.
    pub const NAME: &str = "Employee Name";
    /// Gross wages subject to insurance contributions.
    pub const ESI_GROSS: &str = "ESI Gross";
    /// Days worked in the month.
    pub const WORKED_DAYS: &str = "Worked Days";
}

const PF_FIELDS: [&str; 5] = [
    pf_field::UAN,
    pf_field::NAME,
    pf_field::GROSS_WAGES,
    pf_field::EPF_WAGES,
    pf_field::LOP_DAYS,
];

const ESI_FIELDS: [&str; 4] = [
    esi_field::ESI_NUMBER,
    esi_field::NAME,
    esi_field::ESI_GROSS,
    esi_field::WORKED_DAYS,
];

const PF_COLUMNS: [&str; 11] = [
    "UAN No",
    "MEMBER NAME",
    "GROSS WAGES",
    "EPF Wages",
    "EPS Wages",
    "EDLI WAGES",
    "EPF CONTRI REMITTED",
    "EPS CONTRI REMITTED",
    "EPF EPS DIFF REMITTED",
    "NCP DAYS",
    "REFUND OF ADVANCES",
];

const ESI_COLUMNS: [&str; 4] = ["ESI No", "MEMBER NAME", "ESI GROSS", "WORKED DAYS"];

impl Scheme {
    /// Both schemes, in the order they appear in dashboard responses.
    pub const ALL: [Scheme; 2] = [Scheme::ProvidentFund, Scheme::StateInsurance];

    /// The lowercase identifier used in URLs and the database, e.g. "pf".
    pub fn slug(self) -> &'static str {
        match self {
            Scheme::ProvidentFund => "pf",
            Scheme::StateInsurance => "esi",
        }
    }

    /// The uppercase label used in file names and dashboard datasets, e.g. "PF".
    pub fn label(self) -> &'static str {
        match self {
            Scheme::ProvidentFund => "PF",
            Scheme::StateInsurance => "ESI",
        }
    }

    /// The directory under the storage root that holds this scheme's artifacts.
    pub fn output_dir(self) -> &'static str {
        match self {
            Scheme::ProvidentFund => "processed_pf",
            Scheme::StateInsurance => "processed_esi",
        }
    }

    /// The worksheet name of the spreadsheet artifact.
    pub fn sheet_name(self) -> &'static str {
        match self {
            Scheme::ProvidentFund => "PF_Data",
            Scheme::StateInsurance => "ESI Data",
        }
    }

    /// The logical fields every uploaded spreadsheet must provide.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Scheme::ProvidentFund => &PF_FIELDS,
            Scheme::StateInsurance => &ESI_FIELDS,
        }
    }

    /// The column headers of the canonical output, in order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Scheme::ProvidentFund => &PF_COLUMNS,
            Scheme::StateInsurance => &ESI_COLUMNS,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pf" => Ok(Scheme::ProvidentFund),
            "esi" => Ok(Scheme::StateInsurance),
            other => Err(format!("unknown scheme \"{other}\"")),
        }
    }
}

impl ToSql for Scheme {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.slug()))
    }
}

impl FromSql for Scheme {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}
