//! Named placeholder support.
//!
//! Storages write `:name` placeholders. PostgreSQL wants `$1`, `$2`, ... so
//! queries are rewritten before preparing, and JSON parameter values are
//! converted to the Rust type matching the parameter type the server
//! inferred for each placeholder.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hearth_core::{HearthError, HearthResult, ValidationError};
use serde_json::Value as JsonValue;
use tokio_postgres::types::{ToSql, Type};

/// A query rewritten to positional placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalQuery {
    pub sql: String,
    /// Parameter names in placeholder order. `names[0]` binds `$1`.
    pub names: Vec<String>,
}

/// Rewrite `:name` placeholders to `$n`.
///
/// Quoted strings, quoted identifiers and `::type` casts are left alone. A
/// name used twice reuses its position.
pub fn rewrite(query: &str) -> PositionalQuery {
    let chars: Vec<char> = query.chars().collect();
    let mut sql = String::with_capacity(query.len());
    let mut names: Vec<String> = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            sql.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                sql.push(c);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                sql.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let position = match names.iter().position(|n| *n == name) {
                    Some(existing) => existing + 1,
                    None => {
                        names.push(name);
                        names.len()
                    }
                };
                sql.push('$');
                sql.push_str(&position.to_string());
                i = end;
            }
            _ => {
                sql.push(c);
                i += 1;
            }
        }
    }

    PositionalQuery { sql, names }
}

/// Whether an insert already asks for rows back.
pub fn has_returning(query: &str) -> bool {
    query
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("returning"))
}

pub type BoxedParam = Box<dyn ToSql + Sync + Send>;

fn mismatch(name: &str, ty: &Type, value: &JsonValue) -> HearthError {
    ValidationError::InvalidValue {
        field: name.to_string(),
        reason: format!("cannot bind {} as {}", value, ty),
    }
    .into()
}

fn text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn int(name: &str, ty: &Type, value: &JsonValue) -> HearthResult<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| mismatch(name, ty, value))
}

fn timestamp(name: &str, ty: &Type, value: &JsonValue) -> HearthResult<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| mismatch(name, ty, value))
}

fn array<T, F>(name: &str, ty: &Type, value: &JsonValue, item: F) -> HearthResult<Vec<T>>
where
    F: Fn(&JsonValue) -> Option<T>,
{
    value
        .as_array()
        .ok_or_else(|| mismatch(name, ty, value))?
        .iter()
        .map(|v| item(v).ok_or_else(|| mismatch(name, ty, v)))
        .collect()
}

/// Convert one JSON parameter into a value `tokio_postgres` can bind as `ty`.
///
/// JSON `null` binds as SQL `NULL` for every type.
pub fn bind(name: &str, value: &JsonValue, ty: &Type) -> HearthResult<BoxedParam> {
    let null = value.is_null();

    let boxed: BoxedParam = match *ty {
        Type::BOOL => Box::new(if null {
            None
        } else {
            Some(value.as_bool().ok_or_else(|| mismatch(name, ty, value))?)
        }),
        Type::INT2 => Box::new(if null {
            None
        } else {
            Some(i16::try_from(int(name, ty, value)?).map_err(|_| mismatch(name, ty, value))?)
        }),
        Type::INT4 => Box::new(if null {
            None
        } else {
            Some(i32::try_from(int(name, ty, value)?).map_err(|_| mismatch(name, ty, value))?)
        }),
        Type::INT8 => Box::new(if null { None } else { Some(int(name, ty, value)?) }),
        Type::FLOAT4 => Box::new(if null {
            None
        } else {
            Some(value.as_f64().ok_or_else(|| mismatch(name, ty, value))? as f32)
        }),
        Type::FLOAT8 => Box::new(if null {
            None
        } else {
            Some(value.as_f64().ok_or_else(|| mismatch(name, ty, value))?)
        }),
        Type::JSON | Type::JSONB => Box::new(if null { None } else { Some(value.clone()) }),
        Type::TIMESTAMPTZ => Box::new(if null {
            None
        } else {
            Some(timestamp(name, ty, value)?)
        }),
        Type::TIMESTAMP => Box::new(if null {
            None::<NaiveDateTime>
        } else {
            Some(timestamp(name, ty, value)?.naive_utc())
        }),
        Type::DATE => Box::new(if null {
            None::<NaiveDate>
        } else {
            Some(
                value
                    .as_str()
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                    .ok_or_else(|| mismatch(name, ty, value))?,
            )
        }),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => Box::new(if null {
            None
        } else {
            Some(array(name, ty, value, text)?)
        }),
        Type::INT8_ARRAY => Box::new(if null {
            None
        } else {
            Some(array(name, ty, value, JsonValue::as_i64)?)
        }),
        Type::INT4_ARRAY => Box::new(if null {
            None
        } else {
            Some(array(name, ty, value, |v| {
                v.as_i64().and_then(|n| i32::try_from(n).ok())
            })?)
        }),
        _ => Box::new(if null {
            None
        } else {
            Some(text(value).ok_or_else(|| mismatch(name, ty, value))?)
        }),
    };

    Ok(boxed)
}
