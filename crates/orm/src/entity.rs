use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use sea_query::Value;
use serde::de::DeserializeOwned;

use crate::column::{ColumnType, Columns};
use crate::error::Result;
use crate::record::{Json, Record};
use crate::type_mismatch;

/// A fetched row, keyed by physical column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// An empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// The value of `column`, if fetched.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Whether `column` was fetched with a non-null value.
    #[must_use]
    pub fn has_value(&self, column: &str) -> bool {
        self.get(column).is_some_and(|value| !crate::validate::is_null(value))
    }

    /// Columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl IntoIterator for Row {
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;
    type Item = (String, Value);

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(column, value)| (column.into(), value)).collect(),
        }
    }
}

/// Types that can be decoded from one column of a row.
pub trait FetchValue: Sized {
    /// Decodes the value of `column`. A column that was not fetched, or is null,
    /// decodes to the type's default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`](crate::Error::TypeMismatch) if the stored value
    /// cannot be converted.
    fn fetch(row: &Row, column: &str) -> Result<Self>;

    /// Whether the row carries a value for this field.
    fn present(row: &Row, column: &str) -> bool {
        row.has_value(column)
    }
}

/// Types decoded from a whole row. Implemented by the [`record!`](crate::record!)
/// macro.
pub trait FromRow: Sized {
    /// Decodes a record from a row.
    ///
    /// # Errors
    ///
    /// Returns the first field decoding error.
    fn from_row(row: &Row) -> Result<Self>;

    /// Whether any of the record's columns carries a value.
    fn present(row: &Row) -> bool;
}

/// A record stored in a table.
pub trait Table: Record + FromRow {
    /// Table name.
    const NAME: &'static str;

    /// The table's column registry.
    fn columns() -> &'static Columns;

    /// Fields a filter may reference. Defaults to every column; override to add
    /// JSON paths or hide columns.
    #[must_use]
    fn rule_fields() -> BTreeMap<String, ColumnType> {
        Self::columns().column_types()
    }

    /// Stores an allocated primary key.
    fn set_id(&mut self, id: String);
}

/// Formats a timestamp the way time columns are stored.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp. Accepts RFC 3339 and `%Y-%m-%d %H:%M:%S%.f`.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`](crate::Error::TypeMismatch) for other formats.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc));
    }
    Err(type_mismatch!("unsupported timestamp: {raw}; expected RFC 3339 or \"%Y-%m-%d %H:%M:%S%.f\""))
}

fn fetch_with<T: Default>(
    row: &Row, column: &str, convert: impl FnOnce(&Value) -> Option<T>, expected: &str,
) -> Result<T> {
    match row.get(column) {
        None => Ok(T::default()),
        Some(value) if crate::validate::is_null(value) => Ok(T::default()),
        Some(value) => {
            convert(value).ok_or_else(|| type_mismatch!("column `{column}` is not {expected}: {value:?}"))
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(Some(v)) => Some(i64::from(*v)),
        Value::SmallInt(Some(v)) => Some(i64::from(*v)),
        Value::Int(Some(v)) => Some(i64::from(*v)),
        Value::BigInt(Some(v)) => Some(*v),
        Value::TinyUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::SmallUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::Unsigned(Some(v)) => Some(i64::from(*v)),
        Value::BigUnsigned(Some(v)) => i64::try_from(*v).ok(),
        Value::Bool(Some(v)) => Some(i64::from(*v)),
        _ => None,
    }
}

macro_rules! fetch_integers {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FetchValue for $ty {
                fn fetch(row: &Row, column: &str) -> Result<Self> {
                    fetch_with(row, column, |v| as_i64(v).and_then(|i| Self::try_from(i).ok()), stringify!($ty))
                }
            }
        )*
    };
}

fetch_integers!(i8, i16, i32, i64, u8, u16, u32);

impl FetchValue for u64 {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(
            row,
            column,
            |v| match v {
                Value::BigUnsigned(Some(u)) => Some(*u),
                other => as_i64(other).and_then(|i| Self::try_from(i).ok()),
            },
            "u64",
        )
    }
}

impl FetchValue for bool {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(row, column, |v| as_i64(v).map(|i| i != 0), "boolean")
    }
}

impl FetchValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(
            row,
            column,
            |v| match v {
                Value::Double(Some(f)) => Some(*f),
                Value::Float(Some(f)) => Some(Self::from(*f)),
                other => as_i64(other).map(|i| i as Self),
            },
            "f64",
        )
    }
}

impl FetchValue for f32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(
            row,
            column,
            |v| match v {
                Value::Float(Some(f)) => Some(*f),
                Value::Double(Some(f)) => Some(*f as Self),
                other => as_i64(other).map(|i| i as Self),
            },
            "f32",
        )
    }
}

impl FetchValue for char {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(
            row,
            column,
            |v| match v {
                Value::Char(Some(c)) => Some(*c),
                Value::String(Some(s)) => s.chars().next(),
                _ => None,
            },
            "char",
        )
    }
}

impl FetchValue for String {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(
            row,
            column,
            |v| match v {
                Value::String(Some(s)) => Some(s.as_ref().clone()),
                Value::Char(Some(c)) => Some(c.to_string()),
                _ => None,
            },
            "a string",
        )
    }
}

impl FetchValue for Vec<u8> {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(
            row,
            column,
            |v| match v {
                Value::Bytes(Some(b)) => Some(b.as_ref().clone()),
                Value::String(Some(s)) => Some(s.as_bytes().to_vec()),
                _ => None,
            },
            "binary",
        )
    }
}

impl FetchValue for DateTime<Utc> {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        match row.get(column) {
            Some(Value::String(Some(raw))) => parse_timestamp(raw),
            _ => fetch_with(
                row,
                column,
                |v| match v {
                    Value::ChronoDateTimeUtc(Some(ts)) => Some(**ts),
                    _ => None,
                },
                "a timestamp",
            ),
        }
    }
}

impl FetchValue for NaiveDate {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        fetch_with(
            row,
            column,
            |v| match v {
                Value::ChronoDate(Some(d)) => Some(**d),
                Value::String(Some(raw)) => Self::parse_from_str(raw, "%Y-%m-%d").ok(),
                _ => None,
            },
            "a date",
        )
    }
}

impl FetchValue for serde_json::Value {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        match row.get(column) {
            Some(Value::String(Some(raw))) => {
                serde_json::from_str(raw).map_err(|e| type_mismatch!("column `{column}` is not JSON: {e}"))
            }
            Some(Value::Bytes(Some(raw))) => {
                serde_json::from_slice(raw).map_err(|e| type_mismatch!("column `{column}` is not JSON: {e}"))
            }
            Some(Value::Json(Some(json))) => Ok(json.as_ref().clone()),
            Some(value) if !crate::validate::is_null(value) => {
                Err(type_mismatch!("column `{column}` is not JSON: {value:?}"))
            }
            _ => Ok(Self::Null),
        }
    }
}

impl<T: DeserializeOwned + Default> FetchValue for Json<T> {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        let json = serde_json::Value::fetch(row, column)?;
        if json.is_null() {
            return Ok(Self(T::default()));
        }
        serde_json::from_value(json)
            .map(Self)
            .map_err(|e| type_mismatch!("column `{column}` does not decode: {e}"))
    }
}

impl<T: FetchValue> FetchValue for Option<T> {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        if T::present(row, column) { T::fetch(row, column).map(Some) } else { Ok(None) }
    }

    fn present(row: &Row, column: &str) -> bool {
        T::present(row, column)
    }
}

impl<T: FetchValue> FetchValue for Box<T> {
    fn fetch(row: &Row, column: &str) -> Result<Self> {
        T::fetch(row, column).map(Self::new)
    }

    fn present(row: &Row, column: &str) -> bool {
        T::present(row, column)
    }
}
