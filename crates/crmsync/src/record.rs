//! Record representations and field coercion
//!
//! Source records arrive as loosely typed JSON: numbers as strings, `Y`/`N`
//! flags, empty strings standing in for NULL, and an open-ended field set.
//! This module defines the raw and mapped representations plus the fixed
//! coercion rules that turn source values into destination-typed values.
//! Monetary amounts become [`Decimal`], never floats; boolean-like codes go
//! through an explicit table, never truthiness; anything the typed columns
//! do not capture stays available through the raw-record passthrough.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as Json;

/// One untouched record as returned by the source
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord(Json);

impl RawRecord {
    /// Wrap a raw JSON record
    pub fn new(value: Json) -> Self {
        Self(value)
    }

    /// The full record
    pub fn as_json(&self) -> &Json {
        &self.0
    }

    /// Whether the record is a JSON object
    pub fn is_object(&self) -> bool {
        self.0.is_object()
    }

    /// Field accessor. JSON null is treated as absent.
    pub fn field(&self, name: &str) -> Option<&Json> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// Field accessor yielding a non-empty string. The source emits `""`
    /// and the literal string `"null"` for absent values.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            Json::String(s) => {
                let s = s.trim();
                if s.is_empty() || s == "null" {
                    None
                } else {
                    Some(s)
                }
            }
            _ => None,
        }
    }
}

/// A typed destination value, nullable per variant
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(Option<bool>),
    Int(Option<i64>),
    Decimal(Option<Decimal>),
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
    Date(Option<NaiveDate>),
    Json(Json),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_none(),
            Self::Int(v) => v.is_none(),
            Self::Decimal(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Json(v) => v.is_null(),
        }
    }

    /// The contained timestamp, if any
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => *v,
            _ => None,
        }
    }
}

/// A row ready for the destination: primary key plus one value per column
/// of the kind's fixed layout, in column order. The primary key is always
/// the first value and equals the source record's identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub pk: i64,
    pub values: Vec<Value>,
}

/// Integer coercion: accepts numbers and numeric strings, including the
/// source's float-formatted integers (`"123.0"`).
pub fn coerce_i64(value: Option<&Json>) -> Option<i64> {
    match value? {
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Json::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "null" {
                return None;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Foreign-key coercion: like [`coerce_i64`], with the source's `0`
/// placeholder for "no reference" mapped to NULL.
pub fn coerce_ref(value: Option<&Json>) -> Option<i64> {
    coerce_i64(value).filter(|id| *id != 0)
}

/// Decimal coercion for monetary fields.
pub fn coerce_decimal(value: Option<&Json>) -> Option<Decimal> {
    match value? {
        Json::Number(n) => n.to_string().parse().ok(),
        Json::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "null" {
                return None;
            }
            s.parse().ok()
        }
        _ => None,
    }
}

/// Timestamp coercion: RFC 3339 with offset, normalized to UTC. The source
/// emits values like `2023-01-15T10:30:00+03:00`.
pub fn coerce_timestamp(value: Option<&Json>) -> Option<DateTime<Utc>> {
    match value? {
        Json::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "null" {
                return None;
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}

/// Date coercion: `YYYY-MM-DD`, or a full timestamp truncated to its date.
pub fn coerce_date(value: Option<&Json>) -> Option<NaiveDate> {
    if let Some(Json::String(s)) = value {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return Some(date);
        }
    }
    coerce_timestamp(value).map(|dt| dt.date_naive())
}

/// Boolean coercion through an explicit code table. Unrecognized codes map
/// to NULL rather than being treated as truthy or falsy.
pub fn coerce_flag(value: Option<&Json>) -> Option<bool> {
    match value? {
        Json::Bool(b) => Some(*b),
        Json::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" | "TRUE" | "1" => Some(true),
            "N" | "NO" | "FALSE" | "0" | "" => Some(false),
            _ => None,
        },
        Json::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Text coercion: non-empty trimmed string.
pub fn coerce_text(value: Option<&Json>) -> Option<String> {
    match value? {
        Json::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "null" {
                None
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    }
}

/// First entry of a multi-value communication field. The source represents
/// emails and phones as `[{"VALUE": "...", "VALUE_TYPE": "..."}, ...]`.
pub fn first_comm_value(value: Option<&Json>) -> Option<String> {
    let entries = value?.as_array()?;
    let first = entries.first()?;
    match first.get("VALUE") {
        Some(Json::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_coerce_i64_variants() {
        assert_eq!(coerce_i64(Some(&json!(42))), Some(42));
        assert_eq!(coerce_i64(Some(&json!("42"))), Some(42));
        assert_eq!(coerce_i64(Some(&json!("123.0"))), Some(123));
        assert_eq!(coerce_i64(Some(&json!(""))), None);
        assert_eq!(coerce_i64(Some(&json!("null"))), None);
        assert_eq!(coerce_i64(Some(&json!("abc"))), None);
        assert_eq!(coerce_i64(None), None);
    }

    #[test]
    fn test_coerce_ref_zero_is_null() {
        assert_eq!(coerce_ref(Some(&json!("17"))), Some(17));
        assert_eq!(coerce_ref(Some(&json!("0"))), None);
        assert_eq!(coerce_ref(Some(&json!(0))), None);
    }

    #[test]
    fn test_coerce_decimal_exact() {
        let amount = coerce_decimal(Some(&json!("1500.50"))).unwrap();
        assert_eq!(amount.to_string(), "1500.50");
        let amount = coerce_decimal(Some(&json!(99.9))).unwrap();
        assert_eq!(amount.to_string(), "99.9");
        assert_eq!(coerce_decimal(Some(&json!(""))), None);
    }

    #[test]
    fn test_coerce_timestamp_offsets() {
        let dt = coerce_timestamp(Some(&json!("2023-01-15T10:30:00+03:00"))).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 1, 15, 7, 30, 0).unwrap());

        let dt = coerce_timestamp(Some(&json!("2023-01-15T10:30:00Z"))).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 1, 15, 10, 30, 0).unwrap());

        assert_eq!(coerce_timestamp(Some(&json!("not a date"))), None);
    }

    #[test]
    fn test_coerce_date_forms() {
        let date = coerce_date(Some(&json!("1990-04-12"))).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1990, 4, 12).unwrap());

        let date = coerce_date(Some(&json!("1990-04-12T00:00:00+03:00"))).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1990, 4, 11).unwrap());
    }

    #[test]
    fn test_coerce_flag_table() {
        assert_eq!(coerce_flag(Some(&json!("Y"))), Some(true));
        assert_eq!(coerce_flag(Some(&json!("yes"))), Some(true));
        assert_eq!(coerce_flag(Some(&json!("N"))), Some(false));
        assert_eq!(coerce_flag(Some(&json!("0"))), Some(false));
        assert_eq!(coerce_flag(Some(&json!(true))), Some(true));
        assert_eq!(coerce_flag(Some(&json!(1))), Some(true));
        // unrecognized codes are NULL, not false
        assert_eq!(coerce_flag(Some(&json!("maybe"))), None);
        assert_eq!(coerce_flag(Some(&json!(7))), None);
    }

    #[test]
    fn test_first_comm_value() {
        let field = json!([
            {"VALUE": "a@example.com", "VALUE_TYPE": "WORK"},
            {"VALUE": "b@example.com", "VALUE_TYPE": "HOME"}
        ]);
        assert_eq!(
            first_comm_value(Some(&field)),
            Some("a@example.com".to_string())
        );
        assert_eq!(first_comm_value(Some(&json!([]))), None);
        assert_eq!(first_comm_value(Some(&json!("plain"))), None);
    }

    #[test]
    fn test_raw_record_fields() {
        let raw = RawRecord::new(json!({
            "ID": "7",
            "TITLE": "  Acme  ",
            "EMPTY": "",
            "NULLISH": "null",
            "MISSING_VALUE": null
        }));
        assert!(raw.is_object());
        assert_eq!(raw.str_field("TITLE"), Some("Acme"));
        assert_eq!(raw.str_field("EMPTY"), None);
        assert_eq!(raw.str_field("NULLISH"), None);
        assert!(raw.field("MISSING_VALUE").is_none());
        assert!(raw.field("ABSENT").is_none());
    }

    #[test]
    fn test_value_is_null() {
        assert!(Value::Int(None).is_null());
        assert!(!Value::Int(Some(3)).is_null());
        assert!(Value::Json(Json::Null).is_null());
        assert!(!Value::Json(json!({})).is_null());
    }
}
