//! Row decoding for PostgreSQL results.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Per-category decoders extract the value
//!
//! Statements run over the extended query protocol, so values usually arrive
//! in binary format. Types without a dedicated decoder fall back to their raw
//! value: text when the server sent text, base64 when it sent binary.

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
use sqlx::postgres::{PgHasArrayType, PgRow, PgTypeInfo, PgTypeKind, PgValueFormat};
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo, ValueRef};
use uuid::Uuid;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for PostgreSQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    TimeTz,
    Interval,
    Text,
    Array,
    Other,
}

/// Classify a PostgreSQL type name (as reported by the driver) into a category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let name = type_name.to_ascii_lowercase();
    if name.ends_with("[]") {
        return TypeCategory::Array;
    }
    match name.as_str() {
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "oid" => {
            TypeCategory::Integer
        }
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "numeric" | "decimal" => TypeCategory::Decimal,
        "bool" | "boolean" => TypeCategory::Boolean,
        "bytea" => TypeCategory::Binary,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "timestamp" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "timetz" => TypeCategory::TimeTz,
        "interval" => TypeCategory::Interval,
        // Both wire formats of these types are UTF-8 text
        "text" | "varchar" | "bpchar" | "char" | "\"char\"" | "name" | "citext" | "xml"
        | "unknown" => TypeCategory::Text,
        _ => TypeCategory::Other,
    }
}

/// Category of a column, looking through enums and domains.
fn column_category(type_info: &PgTypeInfo) -> TypeCategory {
    match type_info.kind() {
        PgTypeKind::Enum(_) => TypeCategory::Text,
        PgTypeKind::Domain(base) => column_category(base),
        _ => categorize_type(type_info.name()),
    }
}

// =============================================================================
// Value Formatting
// =============================================================================

/// Encode binary data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

/// Render an interval the way PostgreSQL's default `postgres` output style
/// does, e.g. `1 year 2 mons 3 days 04:05:06`.
pub fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    push_unit(&mut parts, i64::from(interval.months / 12), "year");
    push_unit(&mut parts, i64::from(interval.months % 12), "mon");
    push_unit(&mut parts, i64::from(interval.days), "day");

    if interval.microseconds != 0 || parts.is_empty() {
        parts.push(format_clock(interval.microseconds));
    }
    parts.join(" ")
}

fn push_unit(parts: &mut Vec<String>, amount: i64, unit: &str) {
    if amount != 0 {
        let plural = if amount == 1 { "" } else { "s" };
        parts.push(format!("{amount} {unit}{plural}"));
    }
}

fn format_clock(microseconds: i64) -> String {
    let sign = if microseconds < 0 { "-" } else { "" };
    let total = microseconds.unsigned_abs();
    let secs = total / 1_000_000;
    let fraction = total % 1_000_000;

    let mut out = format!(
        "{sign}{:02}:{:02}:{:02}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    );
    if fraction != 0 {
        out.push('.');
        out.push_str(format!("{fraction:06}").trim_end_matches('0'));
    }
    out
}

fn float_value(v: f64) -> JsonValue {
    // NaN and infinities are not JSON numbers
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn decimal_value(v: Decimal) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn uuid_value(v: Uuid) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn timestamp_value(v: chrono::NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn timestamptz_value(v: chrono::DateTime<chrono::Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn date_value(v: chrono::NaiveDate) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn time_value(v: chrono::NaiveTime) -> JsonValue {
    JsonValue::String(v.format("%H:%M:%S%.f").to_string())
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps keyed by column name.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = column_category(col.type_info());
                (col.name().to_string(), decode_column(self, idx, category))
            })
            .collect()
    }
}

fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
    // NULL short-circuits every category
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return JsonValue::Null,
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "Failed to read column");
            return JsonValue::Null;
        }
    }

    let decoded = match category {
        TypeCategory::Decimal => scalar(row, idx, decimal_value),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => scalar(row, idx, JsonValue::Bool),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => scalar(row, idx, |v: Vec<u8>| encode_binary_value(&v)),
        TypeCategory::Json => scalar(row, idx, |v: JsonValue| v),
        TypeCategory::Uuid => scalar(row, idx, uuid_value),
        TypeCategory::Timestamp => scalar(row, idx, timestamp_value),
        TypeCategory::TimestampTz => scalar(row, idx, timestamptz_value),
        TypeCategory::Date => scalar(row, idx, date_value),
        TypeCategory::Time => scalar(row, idx, time_value),
        TypeCategory::TimeTz => decode_timetz(row, idx),
        TypeCategory::Interval => {
            scalar(row, idx, |v: PgInterval| JsonValue::String(format_interval(&v)))
        }
        TypeCategory::Array => decode_array(row, idx),
        TypeCategory::Text | TypeCategory::Other => None,
    };

    decoded.unwrap_or_else(|| decode_raw(row, idx))
}

fn scalar<T>(row: &PgRow, idx: usize, to_json: impl FnOnce(T) -> JsonValue) -> Option<JsonValue>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<T, _>(idx).ok().map(to_json)
}

fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
    scalar(row, idx, |v: i16| JsonValue::Number(v.into()))
        .or_else(|| scalar(row, idx, |v: i32| JsonValue::Number(v.into())))
        .or_else(|| scalar(row, idx, |v: i64| JsonValue::Number(v.into())))
        .or_else(|| scalar(row, idx, |v: Oid| JsonValue::Number(v.0.into())))
}

fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
    scalar(row, idx, float_value).or_else(|| scalar(row, idx, |v: f32| float_value(f64::from(v))))
}

fn decode_timetz(row: &PgRow, idx: usize) -> Option<JsonValue> {
    scalar(row, idx, |v: PgTimeTz| {
        JsonValue::String(format!("{}{}", v.time.format("%H:%M:%S%.f"), v.offset))
    })
}

/// One-dimensional arrays of the scalar categories; anything else falls back
/// to the raw value.
fn decode_array(row: &PgRow, idx: usize) -> Option<JsonValue> {
    let type_name = row.columns().get(idx)?.type_info().name().to_string();
    let element = categorize_type(type_name.trim_end_matches("[]"));

    match element {
        TypeCategory::Integer => array_of(row, idx, |v: i16| JsonValue::Number(v.into()))
            .or_else(|| array_of(row, idx, |v: i32| JsonValue::Number(v.into())))
            .or_else(|| array_of(row, idx, |v: i64| JsonValue::Number(v.into()))),
        TypeCategory::Float => array_of(row, idx, float_value)
            .or_else(|| array_of(row, idx, |v: f32| float_value(f64::from(v)))),
        TypeCategory::Decimal => array_of(row, idx, decimal_value),
        TypeCategory::Boolean => array_of(row, idx, JsonValue::Bool),
        TypeCategory::Json => array_of(row, idx, |v: JsonValue| v),
        TypeCategory::Uuid => array_of(row, idx, uuid_value),
        TypeCategory::Timestamp => array_of(row, idx, timestamp_value),
        TypeCategory::TimestampTz => array_of(row, idx, timestamptz_value),
        TypeCategory::Date => array_of(row, idx, date_value),
        TypeCategory::Text => array_of(row, idx, JsonValue::String),
        _ => None,
    }
}

fn array_of<T>(row: &PgRow, idx: usize, to_json: impl Fn(T) -> JsonValue) -> Option<JsonValue>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres> + PgHasArrayType,
{
    let values = row.try_get::<Vec<Option<T>>, _>(idx).ok()?;
    Some(JsonValue::Array(
        values
            .into_iter()
            .map(|v| v.map_or(JsonValue::Null, &to_json))
            .collect(),
    ))
}

/// The value as the server sent it: text as a string, binary as base64.
fn decode_raw(row: &PgRow, idx: usize) -> JsonValue {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "Failed to read column");
            return JsonValue::Null;
        }
    };

    let decoded = match raw.format() {
        PgValueFormat::Text => raw.as_str().map(|s| JsonValue::String(s.to_string())),
        PgValueFormat::Binary => match raw.as_str() {
            Ok(s) if is_text_category(row, idx) => Ok(JsonValue::String(s.to_string())),
            _ => raw.as_bytes().map(encode_binary_value),
        },
    };
    decoded.unwrap_or_else(|e| {
        tracing::warn!(column = idx, error = %e, "Failed to decode column");
        JsonValue::Null
    })
}

fn is_text_category(row: &PgRow, idx: usize) -> bool {
    row.columns()
        .get(idx)
        .is_some_and(|col| column_category(col.type_info()) == TypeCategory::Text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT2"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("OID"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_does_not_match_substrings() {
        // "interval" and "point" contain "int" but are not integers
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Interval);
        assert_eq!(categorize_type("POINT"), TypeCategory::Other);
        assert_eq!(categorize_type("UUID"), TypeCategory::Uuid);
        assert_eq!(categorize_type("NAME"), TypeCategory::Text);
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(categorize_type("TIMESTAMP"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("DATE"), TypeCategory::Date);
        assert_eq!(categorize_type("TIME"), TypeCategory::Time);
        assert_eq!(categorize_type("TIMETZ"), TypeCategory::TimeTz);
    }

    #[test]
    fn test_categorize_type_arrays() {
        assert_eq!(categorize_type("INT4[]"), TypeCategory::Array);
        assert_eq!(categorize_type("TEXT[]"), TypeCategory::Array);
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("FLOAT8"), TypeCategory::Float);
        assert_eq!(categorize_type("BOOL"), TypeCategory::Boolean);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("JSONB"), TypeCategory::Json);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("INET"), TypeCategory::Other);
    }

    #[test]
    fn test_format_interval() {
        let interval = |months, days, microseconds| PgInterval {
            months,
            days,
            microseconds,
        };

        assert_eq!(format_interval(&interval(0, 1, 0)), "1 day");
        assert_eq!(format_interval(&interval(0, -1, 0)), "-1 days");
        assert_eq!(format_interval(&interval(0, 0, 0)), "00:00:00");
        assert_eq!(
            format_interval(&interval(14, 3, 14_706_000_000)),
            "1 year 2 mons 3 days 04:05:06"
        );
        assert_eq!(format_interval(&interval(0, 0, 1_500_000)), "00:00:01.5");
        assert_eq!(format_interval(&interval(0, 0, -5_400_000_000)), "-01:30:00");
        assert_eq!(format_interval(&interval(0, 0, 90_000_000_000)), "25:00:00");
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            encode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }
}
