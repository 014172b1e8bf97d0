//! Wire-value normalization for inbound payloads.
//!
//! The analytics backend serializes some numeric columns as strings
//! (e.g. `"totalTransactions": "42"`). Every payload entering the cache —
//! pulled or pushed — passes through [`normalize`] first so the canonical
//! in-memory value never carries string-typed numbers.

use serde_json::{Number, Value};

/// Recursively replace numeric-looking strings with native numbers.
///
/// A string qualifies when it is all digits with at most one decimal point
/// and digits on both sides (`42`, `3.14` — but not `abc123`, `.5`, `1.`,
/// or `1e3`). Arrays and objects are rebuilt with normalized elements;
/// every other value passes through untouched.
///
/// Pure and idempotent: normalizing an already-normalized value is a no-op.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => match parse_numeric_literal(&s) {
            Some(n) => Value::Number(n),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
        }
        other => other,
    }
}

/// Parse a string matching `digits ('.' digits)?` into a JSON number.
///
/// Integers that fit `u64` stay integers; larger integers and fractional
/// literals go through `f64`. Returns `None` when the string doesn't match
/// the pattern or the `f64` conversion is not finite (JSON numbers must be).
fn parse_numeric_literal(s: &str) -> Option<Number> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(frac) = frac_part
        && (frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    if frac_part.is_none()
        && let Ok(n) = s.parse::<u64>()
    {
        return Some(Number::from(n));
    }

    // Fractional, or an integer too large for u64.
    let f: f64 = s.parse().ok()?;
    Number::from_f64(f)
}
