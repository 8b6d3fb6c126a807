use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

/// Column holding the row identifier used for deduplication.
pub const ID_COLUMN: &str = "id";
/// Column holding the last update timestamp; drives the time window.
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Column compared against the target status.
pub const STATUS_COLUMN: &str = "status_id";

/// The three columns every monitored row carries. Everything else is passed
/// through to notifications untouched.
pub const CORE_COLUMNS: [&str; 3] = [ID_COLUMN, UPDATED_AT_COLUMN, STATUS_COLUMN];

static NULL_VALUE: RowValue = RowValue::Null;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("Result row has no 'id' column")]
    MissingIdentifier,
    #[error("Column 'id' cannot be used as an identifier: {0}")]
    InvalidIdentifier(String),
}

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Rendered with a `UTC` suffix. `TIMESTAMP WITHOUT TIME ZONE` columns
    /// land here too, on the assumption that they were written in UTC.
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(serde_json::Value),
    /// A column whose Postgres type the monitor does not decode. Holds the type name.
    Unsupported(String),
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Null => write!(f, "NULL"),
            RowValue::Bool(v) => write!(f, "{v}"),
            RowValue::Integer(v) => write!(f, "{v}"),
            RowValue::Float(v) => write!(f, "{v}"),
            RowValue::Text(v) => write!(f, "{v}"),
            RowValue::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f UTC")),
            RowValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            RowValue::Json(v) => write!(f, "{v}"),
            RowValue::Unsupported(type_name) => write!(f, "<{type_name}>"),
        }
    }
}

/// Identity of a row for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowId {
    Integer(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Integer(v) => write!(f, "{v}"),
            RowId::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        RowId::Integer(value)
    }
}

impl TryFrom<&RowValue> for RowId {
    type Error = RowError;

    fn try_from(value: &RowValue) -> Result<Self, Self::Error> {
        match value {
            RowValue::Integer(v) => Ok(RowId::Integer(*v)),
            RowValue::Text(v) => Ok(RowId::Text(v.clone())),
            other => Err(RowError::InvalidIdentifier(format!("{other:?}"))),
        }
    }
}

/// One result row: an ordered list of `(column, value)` pairs in the order the
/// database returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: RowId,
    columns: Vec<(String, RowValue)>,
}

impl Row {
    pub fn from_columns(columns: Vec<(String, RowValue)>) -> Result<Self, RowError> {
        let id_value = columns
            .iter()
            .find(|(name, _)| name == ID_COLUMN)
            .map(|(_, value)| value)
            .ok_or(RowError::MissingIdentifier)?;
        let id = RowId::try_from(id_value)?;
        Ok(Self { id, columns })
    }

    pub fn id(&self) -> &RowId {
        &self.id
    }

    pub fn get(&self, column: &str) -> Option<&RowValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn updated_at(&self) -> &RowValue {
        self.get(UPDATED_AT_COLUMN).unwrap_or(&NULL_VALUE)
    }

    pub fn status(&self) -> &RowValue {
        self.get(STATUS_COLUMN).unwrap_or(&NULL_VALUE)
    }

    /// All columns, core ones included.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &RowValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Columns other than id, updated_at and status_id, in result order.
    pub fn extra_columns(&self) -> impl Iterator<Item = (&str, &RowValue)> {
        self.columns().filter(|(name, _)| !CORE_COLUMNS.contains(name))
    }
}
