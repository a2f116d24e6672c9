//! `.xlsx` decoding into a [`Workbook`].

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use serde::Deserialize;

use super::{CellValue, ParticipantTable, Workbook};

/// Column holding the text of the one-row context sheets.
pub const BLOB_TEXT_COLUMN: &str = "text";

/// Largest magnitude at which a whole-valued float is still treated as an id.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Sheet names inside the workbook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    /// Participant profiles sheet.
    pub participants: String,
    /// One-row company context sheet.
    pub company_context: String,
    /// One-row role definitions sheet.
    pub role_definitions: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            participants: "participants_profile".to_owned(),
            company_context: "company_context".to_owned(),
            role_definitions: "role_definition".to_owned(),
        }
    }
}

/// Workbook decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    /// The bytes are not a readable `.xlsx` file.
    #[error("cannot open workbook: {0}")]
    Open(#[from] calamine::XlsxError),
    /// A required sheet is missing.
    #[error("workbook has no sheet named '{0}'")]
    MissingSheet(String),
}

/// Decoded workbook where the context sheets may be missing.
///
/// Local sources fill missing blobs from text files; remote sources treat
/// a missing blob sheet as an error via [`PartialWorkbook::require_blobs`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialWorkbook {
    /// Participant profiles.
    pub participants: ParticipantTable,
    /// Company context, if the sheet exists.
    pub company_context: Option<String>,
    /// Role definitions, if the sheet exists.
    pub role_definitions: Option<String>,
}

impl PartialWorkbook {
    /// Require both context sheets to be present.
    ///
    /// # Errors
    ///
    /// Returns [`WorkbookError::MissingSheet`] naming the first missing sheet.
    pub fn require_blobs(self, sheets: &SheetNames) -> Result<Workbook, WorkbookError> {
        let company_context = self
            .company_context
            .ok_or_else(|| WorkbookError::MissingSheet(sheets.company_context.clone()))?;
        let role_definitions = self
            .role_definitions
            .ok_or_else(|| WorkbookError::MissingSheet(sheets.role_definitions.clone()))?;
        Ok(Workbook {
            participants: self.participants,
            company_context,
            role_definitions,
        })
    }
}

/// Decode workbook bytes.
///
/// The participants sheet is mandatory. A context sheet that exists but
/// has no text in its first row decodes to an empty string.
///
/// # Errors
///
/// Returns [`WorkbookError`] if the bytes cannot be parsed or the
/// participants sheet is missing.
pub fn decode_workbook(bytes: Vec<u8>, sheets: &SheetNames) -> Result<PartialWorkbook, WorkbookError> {
    let mut xlsx: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let available = xlsx.sheet_names();

    if !available.contains(&sheets.participants) {
        return Err(WorkbookError::MissingSheet(sheets.participants.clone()));
    }
    let participants = table_from_range(&xlsx.worksheet_range(&sheets.participants)?);

    let mut blob = |name: &str| -> Result<Option<String>, WorkbookError> {
        if !available.iter().any(|s| s == name) {
            return Ok(None);
        }
        let table = table_from_range(&xlsx.worksheet_range(name)?);
        Ok(Some(table.first_text(BLOB_TEXT_COLUMN).unwrap_or_default()))
    };
    let company_context = blob(&sheets.company_context)?;
    let role_definitions = blob(&sheets.role_definitions)?;

    Ok(PartialWorkbook {
        participants,
        company_context,
        role_definitions,
    })
}

/// Convert a calamine range into a table using its first row as header.
///
/// Rows whose cells are all absent are dropped.
pub fn table_from_range(range: &Range<Data>) -> ParticipantTable {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return ParticipantTable::default();
    };

    let columns = header
        .iter()
        .enumerate()
        .map(|(index, cell)| match cell_value(cell).to_text() {
            Some(name) if !name.trim().is_empty() => name.trim().to_owned(),
            _ => format!("column_{index}"),
        })
        .collect();

    let data = rows
        .map(|row| row.iter().map(cell_value).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_absent()))
        .collect();

    ParticipantTable::new(columns, data)
}

/// Normalise one calamine cell.
pub fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Absent,
        Data::String(s) if s.is_empty() => CellValue::Absent,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(n) => CellValue::Integer(*n),
        Data::Float(x) => float_cell(*x),
        Data::Bool(b) => CellValue::Bool(*b),
        other => CellValue::Text(other.to_string()),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_cell(x: f64) -> CellValue {
    if !x.is_finite() {
        return CellValue::Absent;
    }
    if x.fract() == 0.0 && x.abs() < MAX_EXACT_INTEGER {
        // Bounded above, so the conversion is exact.
        return CellValue::Integer(x as i64);
    }
    CellValue::Float(x)
}
