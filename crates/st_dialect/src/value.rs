//! Driver-independent values and rows.
//!
//! [`SqlValue`] is both the bind-parameter type and the decoded cell type,
//! so adapter implementations (and test fakes) only deal in one shape.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view across the numeric encodings drivers actually return
    /// (COUNT(*) comes back signed on PostgreSQL, unsigned on MySQL).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Display form matching what a trigger's text cast would produce.
    /// `None` for NULL.
    pub fn to_display(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::UInt(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            SqlValue::Bool(v) => Some(v.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            SqlValue::Timestamp(t) => Some(t.to_rfc3339()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        v.map(SqlValue::Text).unwrap_or(SqlValue::Null)
    }
}

/// One decoded result row; column names keep result order.
#[derive(Debug, Clone, Default)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn get_at(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Text cell by name; `None` when absent, NULL, or not text.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_text)
    }

    /// Integer cell by name, tolerant of signed/unsigned driver encodings.
    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_int)
    }
}
