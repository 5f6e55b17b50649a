// Row and parameter conversions between SQLite and serde_json

use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Number, Value as JsonValue};

use crate::constants::TIMESTAMP_FORMAT;
use crate::error::Result;

/// A result row: column name -> value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Convert one SQLite column value into JSON.
pub fn value_ref_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
    }
}

/// Convert a JSON value from a data map into a bind parameter.
/// Booleans become 0/1, arrays and objects are stored as JSON text.
pub fn json_to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Lift a flat row into a typed struct.
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(JsonValue::Object(row))?)
}

/// Lift every row, failing on the first mismatch.
pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

/// Read an integer column from a row, if present and numeric.
pub fn row_i64(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(JsonValue::as_i64)
}

/// Read a text column from a row.
pub fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(JsonValue::as_str)
}

/// Current UTC time in the same layout SQLite's datetime('now') uses.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Deserialize SQLite's 0/1 integer flags (or real booleans) into `bool`.
pub fn int_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Bool(b) => Ok(b),
        JsonValue::Number(n) => Ok(n.as_i64().map(|i| i != 0).unwrap_or(false)),
        JsonValue::Null => Ok(false),
        JsonValue::String(s) => Ok(matches!(s.as_str(), "1" | "true")),
        other => Err(de::Error::custom(format!("expected boolean flag, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Flagged {
        id: i64,
        #[serde(deserialize_with = "int_bool")]
        is_active: bool,
        title: Option<String>,
    }

    #[test]
    fn test_json_to_sql_conversions() {
        assert_eq!(json_to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(42)), SqlValue::Integer(42));
        assert_eq!(json_to_sql(&json!(7.5)), SqlValue::Real(7.5));
        assert_eq!(json_to_sql(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(json_to_sql(&json!([1, 2])), SqlValue::Text("[1,2]".to_string()));
    }

    #[test]
    fn test_from_row_reads_integer_flags() {
        let mut row = Row::new();
        row.insert("id".into(), json!(3));
        row.insert("is_active".into(), json!(1));
        row.insert("title".into(), json!(null));
        row.insert("extra_joined_column".into(), json!("ignored"));

        let parsed: Flagged = from_row(row).unwrap();
        assert_eq!(parsed.id, 3);
        assert!(parsed.is_active);
        assert!(parsed.title.is_none());
    }
}
