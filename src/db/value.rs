use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::schema::{Column, ColumnType};
use crate::error::CrmError;

/// A single SQL value as it travels to and from every driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Bool(bool),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(0) => Some(false),
            Value::Integer(1) => Some(true),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Convert into the representation `column` stores, or fail with
    /// [`CrmError::InvalidQuery`].
    pub fn coerce_for(self, table: &str, column: &Column) -> Result<Value, CrmError> {
        let mismatch = |v: &Value| {
            CrmError::InvalidQuery(format!(
                "{table}.{} expects {:?}, got {v:?}",
                column.name, column.ty
            ))
        };
        match (column.ty, self) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::Integer, v @ Value::Integer(_)) => Ok(v),
            (ColumnType::Real, Value::Real(f)) if !f.is_finite() => Err(mismatch(&Value::Real(f))),
            (ColumnType::Real, v @ Value::Real(_)) => Ok(v),
            (ColumnType::Real, Value::Integer(i)) => Ok(Value::Real(i as f64)),
            (ColumnType::Text, v @ Value::Text(_)) => Ok(v),
            (ColumnType::Boolean, v @ Value::Bool(_)) => Ok(v),
            (ColumnType::Boolean, Value::Integer(i)) if i == 0 || i == 1 => Ok(Value::Bool(i == 1)),
            (ColumnType::Timestamp, v @ Value::Timestamp(_)) => Ok(v),
            (ColumnType::Timestamp, Value::Text(s)) => match parse_timestamp(&s) {
                Some(t) => Ok(Value::Timestamp(t)),
                None => Err(mismatch(&Value::Text(s))),
            },
            (_, v) => Err(mismatch(&v)),
        }
    }

    /// Normalize a value read back from storage into `ty`'s shape. SQLite
    /// keeps booleans as integers and timestamps as text.
    pub fn normalize(self, ty: ColumnType) -> Value {
        match (ty, self) {
            (ColumnType::Boolean, Value::Integer(i)) => Value::Bool(i != 0),
            (ColumnType::Real, Value::Integer(i)) => Value::Real(i as f64),
            (ColumnType::Timestamp, Value::Text(s)) => match parse_timestamp(&s) {
                Some(t) => Value::Timestamp(t),
                None => Value::Text(s),
            },
            (_, v) => v,
        }
    }
}

/// Text form of timestamps stored by SQLite and libSQL. Matches what
/// `CURRENT_TIMESTAMP` writes, so stored values compare and sort as text.
pub const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn sqlite_timestamp(t: &DateTime<Utc>) -> String {
    t.format(SQLITE_TIMESTAMP_FORMAT).to_string()
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format (UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, SQLITE_TIMESTAMP_FORMAT)
        .ok()
        .map(|n| n.and_utc())
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::CRM_SCHEMA;

    fn column(table: &str, name: &str) -> &'static Column {
        CRM_SCHEMA.table(table).unwrap().column(name).unwrap()
    }

    #[test]
    fn integers_widen_into_real_and_boolean_columns() {
        let amount = column("deals", "amount");
        assert_eq!(
            Value::Integer(5).coerce_for("deals", amount).unwrap(),
            Value::Real(5.0)
        );
        let closed = column("deals", "closed");
        assert_eq!(
            Value::Integer(1).coerce_for("deals", closed).unwrap(),
            Value::Bool(true)
        );
        assert!(Value::Integer(2).coerce_for("deals", closed).is_err());
    }

    #[test]
    fn text_parses_into_timestamp_columns() {
        let due = column("activities", "due_at");
        let v = Value::from("2026-03-01T09:30:00Z")
            .coerce_for("activities", due)
            .unwrap();
        assert_eq!(v.as_timestamp().unwrap().to_rfc3339(), "2026-03-01T09:30:00+00:00");
        assert!(Value::from("next week").coerce_for("activities", due).is_err());
    }

    #[test]
    fn sqlite_storage_shapes_are_normalized() {
        assert_eq!(Value::Integer(0).normalize(ColumnType::Boolean), Value::Bool(false));
        let ts = Value::from("2026-01-02 03:04:05").normalize(ColumnType::Timestamp);
        assert_eq!(ts.as_timestamp().unwrap().to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert_eq!(Value::from("x").normalize(ColumnType::Text), Value::from("x"));
    }

    #[test]
    fn non_finite_reals_are_rejected() {
        let amount = column("deals", "amount");
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = Value::Real(f).coerce_for("deals", amount).unwrap_err();
            assert!(matches!(err, CrmError::InvalidQuery(_)));
        }
    }

    #[test]
    fn sqlite_timestamps_match_current_timestamp_text() {
        let t = parse_timestamp("2026-10-17T02:45:04Z").unwrap();
        assert_eq!(sqlite_timestamp(&t), "2026-10-17 02:45:04");
        let t = parse_timestamp("2026-10-17T02:45:04.250Z").unwrap();
        assert_eq!(sqlite_timestamp(&t), "2026-10-17 02:45:04.250");
        assert_eq!(parse_timestamp(&sqlite_timestamp(&t)), Some(t));
        assert!(sqlite_timestamp(&t) > "2026-10-17 02:45:04".to_string());
    }

    #[test]
    fn options_map_to_null() {
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
    }
}
