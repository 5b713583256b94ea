//! Row decoding into attribute maps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use hearth_core::Row;
use serde_json::Value as JsonValue;
use tokio_postgres::types::Type;

/// Format a timestamp the way `chrono`'s serde support does, so decoded rows
/// compare equal to records serialized by the storages.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn opt<T: Into<JsonValue>>(value: Option<T>) -> JsonValue {
    value.map(Into::into).unwrap_or(JsonValue::Null)
}

fn column(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<JsonValue, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => opt(row.try_get::<_, Option<bool>>(idx)?),
        Type::INT2 => opt(row.try_get::<_, Option<i16>>(idx)?),
        Type::INT4 => opt(row.try_get::<_, Option<i32>>(idx)?),
        Type::INT8 => opt(row.try_get::<_, Option<i64>>(idx)?),
        Type::OID => opt(row.try_get::<_, Option<u32>>(idx)?),
        Type::FLOAT4 => opt(row.try_get::<_, Option<f32>>(idx)?),
        Type::FLOAT8 => opt(row.try_get::<_, Option<f64>>(idx)?),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<JsonValue>>(idx)?
            .unwrap_or(JsonValue::Null),
        Type::TIMESTAMPTZ => opt(row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(format_timestamp)),
        Type::TIMESTAMP => opt(row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|ts| format_timestamp(ts.and_utc()))),
        Type::DATE => opt(row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| d.to_string())),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => opt(row.try_get::<_, Option<Vec<String>>>(idx)?),
        Type::INT4_ARRAY => opt(row.try_get::<_, Option<Vec<i32>>>(idx)?),
        Type::INT8_ARRAY => opt(row.try_get::<_, Option<Vec<i64>>>(idx)?),
        _ => opt(row.try_get::<_, Option<String>>(idx)?),
    };
    Ok(value)
}

/// Decode every column of `row`.
///
/// Columns of a type with no JSON mapping decode as `null` and are logged.
pub fn decode_row(row: &tokio_postgres::Row) -> Row {
    let mut out = Row::new();
    for (idx, col) in row.columns().iter().enumerate() {
        let value = column(row, idx, col.type_()).unwrap_or_else(|e| {
            tracing::debug!(column = col.name(), ty = %col.type_(), error = %e, "column not decodable");
            JsonValue::Null
        });
        out.insert(col.name().to_string(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp_matches_serde() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(ts), "2024-03-01T12:00:00Z");
        assert_eq!(
            serde_json::to_value(ts).unwrap(),
            JsonValue::String(format_timestamp(ts))
        );

        let micro = ts + chrono::Duration::microseconds(1500);
        assert_eq!(serde_json::to_value(micro).unwrap(), JsonValue::String(format_timestamp(micro)));
    }

    #[test]
    fn test_opt_null() {
        assert_eq!(opt::<i64>(None), JsonValue::Null);
        assert_eq!(opt(Some(vec!["a".to_string()])), serde_json::json!(["a"]));
    }
}
