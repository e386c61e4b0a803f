//! Row validation and the derived-field arithmetic for each scheme.

use std::fmt::Display;

use crate::{
    normalize::{
        ColumnMapping, FileError,
        sheet::{Cell, Sheet, format_number},
    },
    scheme::{Scheme, esi_field, pf_field},
};

/// The statutory wage ceiling for pension and insurance-linked wages.
const WAGE_CEILING: i64 = 15_000;
/// Employee provident fund contribution rate.
const EPF_RATE: f64 = 0.12;
/// Pension scheme contribution rate.
const EPS_RATE: f64 = 0.0833;

/// A single value in a canonical row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Identifiers and names.
    Text(String),
    /// Amounts and day counts.
    Integer(i64),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(number) => number.fmt(f),
        }
    }
}

/// One member's provident fund record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvidentFundRow {
    pub uan: String,
    pub member_name: String,
    pub gross_wages: i64,
    pub epf_wages: i64,
    pub eps_wages: i64,
    pub edli_wages: i64,
    pub epf_contribution: i64,
    pub eps_contribution: i64,
    pub epf_eps_difference: i64,
    pub ncp_days: i64,
    pub refund_of_advances: i64,
}

/// One member's state insurance record.
#[derive(Debug, Clone, PartialEq)]
pub struct StateInsuranceRow {
    pub esi_number: String,
    pub member_name: String,
    pub esi_gross: i64,
    pub worked_days: i64,
}

/// A validated, transformed row ready for export.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalRow {
    /// A provident fund row.
    ProvidentFund(ProvidentFundRow),
    /// A state insurance row.
    StateInsurance(StateInsuranceRow),
}

impl CanonicalRow {
    /// The row's values in the column order of [Scheme::columns].
    pub fn values(&self) -> Vec<FieldValue> {
        match self {
            CanonicalRow::ProvidentFund(row) => vec![
                FieldValue::Text(row.uan.clone()),
                FieldValue::Text(row.member_name.clone()),
                FieldValue::Integer(row.gross_wages),
                FieldValue::Integer(row.epf_wages),
                FieldValue::Integer(row.eps_wages),
                FieldValue::Integer(row.edli_wages),
                FieldValue::Integer(row.epf_contribution),
                FieldValue::Integer(row.eps_contribution),
                FieldValue::Integer(row.epf_eps_difference),
                FieldValue::Integer(row.ncp_days),
                FieldValue::Integer(row.refund_of_advances),
            ],
            CanonicalRow::StateInsurance(row) => vec![
                FieldValue::Text(row.esi_number.clone()),
                FieldValue::Text(row.member_name.clone()),
                FieldValue::Integer(row.esi_gross),
                FieldValue::Integer(row.worked_days),
            ],
        }
    }
}

/// Round to the nearest integer with ties going towards positive infinity.
///
/// A missing value counts as zero. Used for day counts, where payroll files
/// often carry half days.
pub fn custom_round(value: Option<f64>) -> i64 {
    match value {
        None => 0,
        Some(value) => {
            let floor = value.floor();
            if value - floor >= 0.5 {
                floor as i64 + 1
            } else {
                floor as i64
            }
        }
    }
}

/// Round half to even, which is how amounts were always rounded for these files.
fn round_amount(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// Validate and transform every row of `sheet`.
///
/// Rows with a blank or zero identifier, a missing member name, or a missing or
/// zero gross amount are dropped without comment.
///
/// # Errors
///
/// Returns [FileError::RowProcessing] for the first value that cannot be read
/// as the type its field needs. The rows already transformed are discarded.
pub fn transform_rows(
    scheme: Scheme,
    sheet: &Sheet,
    mapping: &ColumnMapping,
) -> Result<Vec<CanonicalRow>, FileError> {
    let mut canonical_rows = Vec::with_capacity(sheet.rows.len());

    for (index, cells) in sheet.rows.iter().enumerate() {
        let row = RowReader {
            cells,
            mapping,
            row_number: index + 2,
        };

        let transformed = match scheme {
            Scheme::ProvidentFund => transform_provident_fund_row(&row)?,
            Scheme::StateInsurance => transform_state_insurance_row(&row)?,
        };

        if let Some(canonical_row) = transformed {
            canonical_rows.push(canonical_row);
        }
    }

    Ok(canonical_rows)
}

fn transform_provident_fund_row(row: &RowReader) -> Result<Option<CanonicalRow>, FileError> {
    let Some(uan) = row.identifier(pf_field::UAN) else {
        return Ok(None);
    };
    let Some(gross_wages) = row.gross(pf_field::GROSS_WAGES)? else {
        return Ok(None);
    };
    let Some(member_name) = row.text(pf_field::NAME) else {
        return Ok(None);
    };

    let epf_wages = round_amount(row.number(pf_field::EPF_WAGES)?.unwrap_or(0.0));
    let eps_wages = capped_wages(epf_wages);
    let edli_wages = capped_wages(epf_wages);
    let epf_contribution = round_amount(epf_wages as f64 * EPF_RATE);
    let eps_contribution = round_amount(epf_wages as f64 * EPS_RATE);
    let ncp_days = custom_round(row.number(pf_field::LOP_DAYS)?);

    Ok(Some(CanonicalRow::ProvidentFund(ProvidentFundRow {
        uan,
        member_name,
        gross_wages,
        epf_wages,
        eps_wages,
        edli_wages,
        epf_contribution,
        eps_contribution,
        epf_eps_difference: epf_contribution - eps_contribution,
        ncp_days,
        refund_of_advances: 0,
    })))
}

fn transform_state_insurance_row(row: &RowReader) -> Result<Option<CanonicalRow>, FileError> {
    let Some(esi_number) = row.identifier(esi_field::ESI_NUMBER) else {
        return Ok(None);
    };
    let Some(esi_gross) = row.gross(esi_field::ESI_GROSS)? else {
        return Ok(None);
    };
    let Some(member_name) = row.text(esi_field::NAME) else {
        return Ok(None);
    };
    let worked_days = custom_round(row.number(esi_field::WORKED_DAYS)?);

    Ok(Some(CanonicalRow::StateInsurance(StateInsuranceRow {
        esi_number,
        member_name,
        esi_gross,
        worked_days,
    })))
}

fn capped_wages(wages: i64) -> i64 {
    if wages > 0 { wages.min(WAGE_CEILING) } else { 0 }
}

struct RowReader<'a> {
    cells: &'a [Cell],
    mapping: &'a ColumnMapping,
    row_number: usize,
}

impl RowReader<'_> {
    fn cell(&self, field: &str) -> &Cell {
        self.mapping
            .index_of(field)
            .and_then(|index| self.cells.get(index))
            .unwrap_or(&Cell::Empty)
    }

    /// The cell as text, or `None` if it is empty.
    fn text(&self, field: &str) -> Option<String> {
        match self.cell(field) {
            Cell::Empty => None,
            Cell::Text(text) => Some(text.trim().to_owned()),
            Cell::Number(number) => Some(format_number(*number)),
            Cell::Bool(value) => Some(value.to_string()),
        }
    }

    /// The identifier with hyphens removed, or `None` if the row should be dropped.
    fn identifier(&self, field: &str) -> Option<String> {
        let identifier = self.text(field)?.replace('-', "");

        match identifier.trim() {
            "" | "0" | "0.0" => None,
            _ => Some(identifier),
        }
    }

    /// The rounded gross amount, or `None` if it is missing or exactly zero.
    ///
    /// A small non-zero gross is kept even if it rounds to zero.
    fn gross(&self, field: &str) -> Result<Option<i64>, FileError> {
        Ok(self
            .number(field)?
            .filter(|gross| *gross != 0.0)
            .map(round_amount))
    }

    fn number(&self, field: &str) -> Result<Option<f64>, FileError> {
        let value = match self.cell(field) {
            Cell::Empty => return Ok(None),
            Cell::Number(number) => *number,
            Cell::Bool(value) => f64::from(u8::from(*value)),
            Cell::Text(text) => text.trim().parse::<f64>().map_err(|_| FileError::RowProcessing {
                row: self.row_number,
                message: format!("\"{text}\" in column \"{field}\" is not a number"),
            })?,
        };

        if value.is_nan() {
            Ok(None)
        } else if value.is_infinite() {
            Err(FileError::RowProcessing {
                row: self.row_number,
                message: format!("the value in column \"{field}\" is not a finite number"),
            })
        } else {
            Ok(Some(value))
        }
    }
}

#[cfg(test)]
mod custom_round_tests {
    use super::custom_round;

    #[test]
    fn ties_round_towards_positive_infinity() {
        assert_eq!(custom_round(Some(2.5)), 3);
        assert_eq!(custom_round(Some(-2.5)), -2);
        assert_eq!(custom_round(Some(0.5)), 1);
    }

    #[test]
    fn non_ties_round_to_nearest() {
        assert_eq!(custom_round(Some(2.4)), 2);
        assert_eq!(custom_round(Some(2.6)), 3);
        assert_eq!(custom_round(Some(-2.6)), -3);
        assert_eq!(custom_round(Some(4.0)), 4);
    }

    #[test]
    fn missing_is_zero() {
        assert_eq!(custom_round(None), 0);
    }
}

#[cfg(test)]
mod transform_rows_tests {
    use crate::{
        normalize::{
            CanonicalRow, Cell, FileError, Sheet, SynonymTable, reconcile,
            rows::{ProvidentFundRow, StateInsuranceRow},
            transform_rows,
        },
        scheme::Scheme,
    };

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_owned())
    }

    fn pf_sheet(rows: Vec<Vec<Cell>>) -> Sheet {
        Sheet {
            headers: ["UAN No", "Employee Name", "Total Salary", "PF Gross", "LOP"]
                .iter()
                .map(|header| (*header).to_owned())
                .collect(),
            rows,
        }
    }

    fn esi_sheet(rows: Vec<Vec<Cell>>) -> Sheet {
        Sheet {
            headers: ["ESI Number", "Name", "ESI SALARY", "Worked days"]
                .iter()
                .map(|header| (*header).to_owned())
                .collect(),
            rows,
        }
    }

    fn transform(scheme: Scheme, sheet: &Sheet) -> Result<Vec<CanonicalRow>, FileError> {
        let table = SynonymTable::default();
        let mapping = reconcile(&sheet.headers, table.for_scheme(scheme)).unwrap();

        transform_rows(scheme, sheet, &mapping)
    }

    #[test]
    fn computes_provident_fund_contributions() {
        let sheet = pf_sheet(vec![vec![
            text("1001-2002-3003"),
            text("Ravi Kumar"),
            Cell::Number(25_300.4),
            Cell::Number(20_000.0),
            Cell::Number(1.5),
        ]]);

        let rows = transform(Scheme::ProvidentFund, &sheet).unwrap();

        assert_eq!(
            rows,
            vec![CanonicalRow::ProvidentFund(ProvidentFundRow {
                uan: "100120023003".to_owned(),
                member_name: "Ravi Kumar".to_owned(),
                gross_wages: 25_300,
                epf_wages: 20_000,
                eps_wages: 15_000,
                edli_wages: 15_000,
                epf_contribution: 2_400,
                eps_contribution: 1_666,
                epf_eps_difference: 734,
                ncp_days: 2,
                refund_of_advances: 0,
            })]
        );
    }

    #[test]
    fn wages_below_ceiling_are_not_capped() {
        let sheet = pf_sheet(vec![vec![
            Cell::Number(100_200_300_400.0),
            text("Meena"),
            Cell::Number(12_000.0),
            Cell::Number(10_000.0),
            Cell::Empty,
        ]]);

        let rows = transform(Scheme::ProvidentFund, &sheet).unwrap();

        let CanonicalRow::ProvidentFund(row) = &rows[0] else {
            panic!("expected a provident fund row, got {rows:?}");
        };
        assert_eq!(row.uan, "100200300400");
        assert_eq!(row.eps_wages, 10_000);
        assert_eq!(row.edli_wages, 10_000);
        assert_eq!(row.epf_contribution, 1_200);
        assert_eq!(row.eps_contribution, 833);
        assert_eq!(row.epf_eps_difference, 367);
        assert_eq!(row.ncp_days, 0);
    }

    #[test]
    fn missing_epf_wages_produce_zero_contributions() {
        let sheet = pf_sheet(vec![vec![
            text("555"),
            text("Gita"),
            Cell::Number(9_000.0),
            Cell::Empty,
            Cell::Number(0.0),
        ]]);

        let rows = transform(Scheme::ProvidentFund, &sheet).unwrap();

        let CanonicalRow::ProvidentFund(row) = &rows[0] else {
            panic!("expected a provident fund row, got {rows:?}");
        };
        assert_eq!(row.epf_wages, 0);
        assert_eq!(row.eps_wages, 0);
        assert_eq!(row.epf_contribution, 0);
        assert_eq!(row.epf_eps_difference, 0);
    }

    #[test]
    fn drops_rows_with_zero_or_blank_identifiers_and_gross() {
        let valid = vec![
            text("31-1"),
            text("Asha"),
            Cell::Number(14_999.5),
            Cell::Number(25.5),
        ];
        let sheet = esi_sheet(vec![
            valid.clone(),
            vec![text("0.0"), text("Zero"), Cell::Number(10_000.0), Cell::Number(1.0)],
            vec![text("0"), text("Zero"), Cell::Number(10_000.0), Cell::Number(1.0)],
            vec![Cell::Empty, text("Blank"), Cell::Number(10_000.0), Cell::Number(1.0)],
            vec![text("77"), text("No gross"), Cell::Empty, Cell::Number(1.0)],
            vec![text("78"), text("Zero gross"), Cell::Number(0.0), Cell::Number(1.0)],
            vec![text("79"), Cell::Empty, Cell::Number(10_000.0), Cell::Number(1.0)],
        ]);

        let rows = transform(Scheme::StateInsurance, &sheet).unwrap();

        assert_eq!(
            rows,
            vec![CanonicalRow::StateInsurance(StateInsuranceRow {
                esi_number: "311".to_owned(),
                member_name: "Asha".to_owned(),
                esi_gross: 15_000,
                worked_days: 26,
            })]
        );
    }

    #[test]
    fn small_gross_is_kept_even_when_it_rounds_to_zero() {
        let sheet = esi_sheet(vec![
            vec![text("41"), text("Part time"), Cell::Number(0.4), Cell::Number(2.0)],
            vec![text("42"), text("Zero text"), text("0"), Cell::Number(2.0)],
        ]);

        let rows = transform(Scheme::StateInsurance, &sheet).unwrap();

        assert_eq!(
            rows,
            vec![CanonicalRow::StateInsurance(StateInsuranceRow {
                esi_number: "41".to_owned(),
                member_name: "Part time".to_owned(),
                esi_gross: 0,
                worked_days: 2,
            })]
        );
    }

    #[test]
    fn amounts_round_half_to_even() {
        let sheet = esi_sheet(vec![
            vec![text("1"), text("A"), Cell::Number(10_000.5), Cell::Number(1.0)],
            vec![text("2"), text("B"), Cell::Number(10_001.5), Cell::Number(1.0)],
        ]);

        let rows = transform(Scheme::StateInsurance, &sheet).unwrap();

        let grosses: Vec<i64> = rows
            .iter()
            .map(|row| match row {
                CanonicalRow::StateInsurance(row) => row.esi_gross,
                CanonicalRow::ProvidentFund(row) => row.gross_wages,
            })
            .collect();
        assert_eq!(grosses, vec![10_000, 10_002]);
    }

    #[test]
    fn numeric_text_is_accepted() {
        let sheet = esi_sheet(vec![vec![
            text("9"),
            text("Isha"),
            text(" 8000 "),
            text("20.5"),
        ]]);

        let rows = transform(Scheme::StateInsurance, &sheet).unwrap();

        assert_eq!(
            rows,
            vec![CanonicalRow::StateInsurance(StateInsuranceRow {
                esi_number: "9".to_owned(),
                member_name: "Isha".to_owned(),
                esi_gross: 8_000,
                worked_days: 21,
            })]
        );
    }

    #[test]
    fn unparseable_value_fails_the_whole_file() {
        let sheet = esi_sheet(vec![
            vec![text("1"), text("A"), Cell::Number(10_000.0), Cell::Number(1.0)],
            vec![text("2"), text("B"), Cell::Number(10_000.0), text("twenty")],
        ]);

        let result = transform(Scheme::StateInsurance, &sheet);

        assert!(
            matches!(result, Err(FileError::RowProcessing { row: 3, .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn values_follow_column_order() {
        let row = CanonicalRow::StateInsurance(StateInsuranceRow {
            esi_number: "42".to_owned(),
            member_name: "Nila".to_owned(),
            esi_gross: 9_100,
            worked_days: 30,
        });

        let rendered: Vec<String> = row.values().iter().map(ToString::to_string).collect();

        assert_eq!(rendered, vec!["42", "Nila", "9100", "30"]);
        assert_eq!(rendered.len(), Scheme::StateInsurance.columns().len());
    }
}
