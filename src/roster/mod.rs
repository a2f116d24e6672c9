//! Participant roster data model.
//!
//! The workbook holds three logical sheets: participant profiles, a one-row
//! company context blob, and a one-row role glossary blob. Cells are decoded
//! into the explicit [`CellValue`] type at the data-source boundary so no
//! untyped "NaN means missing" convention leaks into the pipeline.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

pub mod resolver;
pub mod workbook;

/// Column holding the numeric employee id.
pub const ID_COLUMN: &str = "id";
/// Column holding the participant's full name.
pub const NAME_COLUMN: &str = "name";
/// Column selecting the reply language.
pub const NATIONALITY_COLUMN: &str = "nationality";
/// Column holding the participant's team.
pub const TEAM_COLUMN: &str = "team";
/// Optional column with a pre-written fortune that bypasses generation.
pub const FIXED_RESPONSE_COLUMN: &str = "fixed_response";
/// Optional column with text the generated fortune must contain.
pub const TEXT_TO_INJECT_COLUMN: &str = "text_to_inject";

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// A single decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Text cell.
    Text(String),
    /// Whole number (including whole-valued float cells).
    Integer(i64),
    /// Non-integral number.
    Float(f64),
    /// Boolean cell.
    Bool(bool),
    /// Empty, NaN, or error cell.
    Absent,
}

impl CellValue {
    /// Returns `true` for [`CellValue::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Borrow the text content of a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Render the cell as display text. `Absent` yields `None`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(t) => f.write_str(t),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Absent => Ok(()),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(t) => serializer.serialize_str(t),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Absent => serializer.serialize_none(),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One participant row: field name to cell, in sheet column order.
///
/// Serialises as a JSON object in column order; absent cells become `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantRecord {
    fields: Vec<(String, CellValue)>,
}

impl ParticipantRecord {
    /// Build a record from `(field, value)` pairs.
    pub fn from_fields(fields: Vec<(String, CellValue)>) -> Self {
        Self { fields }
    }

    /// Look up a field by exact name.
    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Text rendering of a field, `None` when missing or absent.
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(CellValue::to_text)
    }

    /// Remove a field and return its value.
    pub fn take(&mut self, field: &str) -> Option<CellValue> {
        let index = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(index).1)
    }

    /// Field names in column order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialise to a JSON string, keeping non-ASCII characters verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error only if a float cell holds a non-finite value that
    /// escaped normalisation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for ParticipantRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A decoded sheet: header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ParticipantTable {
    /// Build a table. Short rows are padded with [`CellValue::Absent`].
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Absent);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Header names in column order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by exact header name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate over the raw data rows.
    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Materialise row `index` as a record.
    pub fn record(&self, index: usize) -> Option<ParticipantRecord> {
        let row = self.rows.get(index)?;
        let fields = self
            .columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect();
        Some(ParticipantRecord::from_fields(fields))
    }

    /// First cell of `column` rendered as text (used for one-row blob sheets).
    pub fn first_text(&self, column: &str) -> Option<String> {
        let index = self.column_index(column)?;
        self.rows
            .first()
            .and_then(|row| row.get(index))
            .and_then(CellValue::to_text)
    }
}

// ---------------------------------------------------------------------------
// Workbook
// ---------------------------------------------------------------------------

/// Everything one data refresh yields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    /// Participant profiles.
    pub participants: ParticipantTable,
    /// Company description inserted verbatim into prompts.
    pub company_context: String,
    /// Role glossary inserted verbatim into prompts.
    pub role_definitions: String,
}
