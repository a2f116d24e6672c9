//! Participant lookup by numeric id or by name.

use std::fmt;

use super::{
    CellValue, ParticipantRecord, ParticipantTable, FIXED_RESPONSE_COLUMN, ID_COLUMN, NAME_COLUMN,
    TEXT_TO_INJECT_COLUMN,
};

/// Rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// Nothing but whitespace was entered.
    #[error("identifier is empty")]
    Empty,
    /// Digits only, but too large to be an employee id.
    #[error("employee id '{0}' is out of range")]
    IdOutOfRange(String),
    /// Fortune number is not a non-negative integer.
    #[error("fortune number '{0}' is not a valid number")]
    FortuneNumber(String),
}

/// Lookup outcome when the identifier is well formed but matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// No row matched.
    #[error("no participant matches {0}")]
    NotFound(Identifier),
}

/// A parsed lookup key. Exactly one lookup strategy applies per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Matched against the numeric `id` column.
    Id(i64),
    /// Matched case- and whitespace-insensitively against the `name` column.
    Name(String),
}

impl Identifier {
    /// Parse raw user input.
    ///
    /// Surrounding whitespace is ignored. A string made only of ASCII digits
    /// is an id; anything else is a name, including strings such as
    /// `"abc!!"` that cannot match any real name.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Empty`] for blank input and
    /// [`InputError::IdOutOfRange`] for digit strings that overflow `i64`.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::Empty);
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed
                .parse::<i64>()
                .map(Self::Id)
                .map_err(|_| InputError::IdOutOfRange(trimmed.to_owned()));
        }
        Ok(Self::Name(trimmed.to_owned()))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "name '{name}'"),
        }
    }
}

/// A matched participant with its side-channel fields split off.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Profile handed to the prompt composer.
    pub record: ParticipantRecord,
    /// Pre-written fortune, if the sheet provides one.
    pub fixed_response: Option<String>,
    /// Text the generated fortune must contain, if any.
    pub text_to_inject: Option<String>,
}

impl Resolution {
    /// The fixed response when it should replace generation.
    ///
    /// Only non-blank fixed responses short-circuit; the returned text is
    /// the cell content untouched.
    pub fn effective_fixed_response(&self) -> Option<&str> {
        self.fixed_response
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// Find the first row matching `identifier`.
///
/// # Errors
///
/// Returns [`LookupError::NotFound`] when no row matches, including when
/// the relevant column does not exist.
pub fn resolve(identifier: &Identifier, table: &ParticipantTable) -> Result<Resolution, LookupError> {
    let index = match identifier {
        Identifier::Id(id) => find_by_id(table, *id),
        Identifier::Name(name) => find_by_name(table, name),
    }
    .ok_or_else(|| LookupError::NotFound(identifier.clone()))?;

    let mut record = table
        .record(index)
        .ok_or_else(|| LookupError::NotFound(identifier.clone()))?;
    let fixed_response = record.take(FIXED_RESPONSE_COLUMN).and_then(|v| v.to_text());
    let text_to_inject = record.take(TEXT_TO_INJECT_COLUMN).and_then(|v| v.to_text());

    Ok(Resolution {
        record,
        fixed_response,
        text_to_inject,
    })
}

fn find_by_id(table: &ParticipantTable, id: i64) -> Option<usize> {
    let column = table.column_index(ID_COLUMN)?;
    table
        .rows()
        .position(|row| matches!(row.get(column), Some(CellValue::Integer(n)) if *n == id))
}

fn find_by_name(table: &ParticipantTable, name: &str) -> Option<usize> {
    let column = table.column_index(NAME_COLUMN)?;
    let wanted = normalize_name(name);
    table.rows().position(|row| {
        row.get(column)
            .and_then(CellValue::as_text)
            .is_some_and(|cell| normalize_name(cell) == wanted)
    })
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
