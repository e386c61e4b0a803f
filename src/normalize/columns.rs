//! Maps the headers of an uploaded spreadsheet onto the logical fields of a scheme.

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    Error,
    normalize::FileError,
    scheme::{Scheme, esi_field, pf_field},
};

/// The accepted header names for one logical field, highest priority first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSynonyms {
    /// The logical field, e.g. "Gross Wages".
    pub field: String,
    /// Header names that may hold the field, in priority order.
    pub synonyms: Vec<String>,
}

impl FieldSynonyms {
    fn new(field: &str, synonyms: &[&str]) -> Self {
        Self {
            field: field.to_owned(),
            synonyms: synonyms.iter().map(|synonym| (*synonym).to_owned()).collect(),
        }
    }
}

/// The header synonyms for every scheme.
///
/// This is configuration data: supporting a new payroll vendor's spreadsheet
/// layout only needs a new synonym, not a code change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymTable {
    /// Synonyms for the provident fund scheme.
    pub pf: Vec<FieldSynonyms>,
    /// Synonyms for the state insurance scheme.
    pub esi: Vec<FieldSynonyms>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self {
            pf: vec![
                FieldSynonyms::new(pf_field::UAN, &["UAN No", "UAN", "UAN Number"]),
                FieldSynonyms::new(pf_field::NAME, &["Employee Name", "Name"]),
                FieldSynonyms::new(
                    pf_field::GROSS_WAGES,
                    &["Total Salary", "Gross Salary", "Total Earnings", "T GROSS"],
                ),
                FieldSynonyms::new(pf_field::EPF_WAGES, &["PF Gross", "EPF Gross", "EPF WAGES"]),
                FieldSynonyms::new(pf_field::LOP_DAYS, &["LOP", "LOP Days", "Lop Days"]),
            ],
            esi: vec![
                FieldSynonyms::new(esi_field::ESI_NUMBER, &["ESI N0", "ESI", "ESI Number"]),
                FieldSynonyms::new(esi_field::NAME, &["Employee Name", "Name"]),
                FieldSynonyms::new(esi_field::ESI_GROSS, &["ESI Gross", "ESI SALARY"]),
                FieldSynonyms::new(
                    esi_field::WORKED_DAYS,
                    &["Worked days", "PD+EL", "Pay Days"],
                ),
            ],
        }
    }
}

impl SynonymTable {
    /// The synonyms for `scheme`, in the order fields are reconciled.
    pub fn for_scheme(&self, scheme: Scheme) -> &[FieldSynonyms] {
        match scheme {
            Scheme::ProvidentFund => &self.pf,
            Scheme::StateInsurance => &self.esi,
        }
    }

    /// Load a synonym table from a JSON file and check it is usable.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidConfig] if the file cannot be read, is not valid JSON
    /// or fails [SynonymTable::validate].
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            Error::InvalidConfig(format!("could not read {}: {error}", path.display()))
        })?;
        let table: SynonymTable = serde_json::from_str(&text).map_err(|error| {
            Error::InvalidConfig(format!("could not parse {}: {error}", path.display()))
        })?;
        table.validate()?;

        Ok(table)
    }

    /// Check that every field the row transformer reads has at least one synonym.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidConfig] naming the first scheme and field that is missing.
    pub fn validate(&self) -> Result<(), Error> {
        for scheme in Scheme::ALL {
            let entries = self.for_scheme(scheme);

            for field in scheme.required_fields() {
                let has_synonyms = entries
                    .iter()
                    .any(|entry| entry.field == *field && !entry.synonyms.is_empty());

                if !has_synonyms {
                    return Err(Error::InvalidConfig(format!(
                        "the synonym table has no headers for the {scheme} field \"{field}\""
                    )));
                }
            }
        }

        Ok(())
    }
}

/// The column index chosen for each logical field of a spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    columns: HashMap<String, usize>,
}

impl ColumnMapping {
    /// The index of the column holding `field`, if it was reconciled.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }
}

/// Choose a column for every field in `synonyms` from the actual `headers`.
///
/// For each field the synonyms are tried in priority order and the first one
/// present among `headers` wins. Header matching is exact.
///
/// # Errors
///
/// Returns [FileError::MissingColumns] listing every field for which none of
/// the synonyms appear in `headers`.
pub fn reconcile(headers: &[String], synonyms: &[FieldSynonyms]) -> Result<ColumnMapping, FileError> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (index, header) in headers.iter().enumerate() {
        positions.entry(header.as_str()).or_insert(index);
    }

    let mut columns = HashMap::new();
    let mut missing = Vec::new();

    for entry in synonyms {
        let found = entry
            .synonyms
            .iter()
            .find_map(|synonym| positions.get(synonym.as_str()).copied());

        match found {
            Some(index) => {
                columns.insert(entry.field.clone(), index);
            }
            None => missing.push(entry.field.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(FileError::MissingColumns(missing));
    }

    Ok(ColumnMapping { columns })
}
