//! Merge Rules Module
//!
//! Shallow, type-directed combination of a stored value with an update,
//! dispatched on the shape of the stored value. One rule per variant:
//!
//! - mapping ⊕ mapping: shallow field overlay
//! - sequence ⊕ sequence: concatenation, deduplicated unless allowed
//! - text ⊕ text: concatenation
//! - number ⊕ number: concatenation of the decimal renderings, reparsed
//!   (so 4 merged with 2 yields 42, not 6 — arithmetic is what `increment`
//!   is for)
//! - anything else, or a mismatched pairing: the update replaces the value

use serde_json::{Number, Value};

// == Merge ==
/// Combines `current` with `updates` according to the rules above.
pub fn merge_values(current: &Value, updates: &Value, allow_duplicates: bool) -> Value {
    match (current, updates) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (field, val) in overlay {
                merged.insert(field.clone(), val.clone());
            }
            Value::Object(merged)
        }
        (Value::Array(base), Value::Array(incoming)) => {
            let mut merged = base.clone();
            for item in incoming {
                if allow_duplicates || !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Value::Array(merged)
        }
        (Value::String(base), Value::String(suffix)) => {
            Value::String(format!("{}{}", base, suffix))
        }
        (Value::Number(base), Value::Number(suffix)) => {
            concat_numbers(base, suffix).unwrap_or_else(|| updates.clone())
        }
        _ => updates.clone(),
    }
}

/// Concatenates two decimal renderings and reparses the result.
///
/// Returns None when the concatenation is not a parseable number (for
/// example `1.5` and `2.5` produce `"1.52.5"`); the caller falls back to
/// replacement.
fn concat_numbers(base: &Number, suffix: &Number) -> Option<Value> {
    let joined = format!("{}{}", base, suffix);
    parse_number(&joined).map(Value::Number)
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(Number::from(u));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

// == Numeric Addition ==
/// Adds `delta` to a numeric value, used by increment/decrement.
///
/// Integer values stay integers for integral deltas; everything else goes
/// through f64. Returns None when the result cannot be represented (NaN or
/// infinity), in which case the entry is left untouched.
pub fn add_to_number(current: &Number, delta: f64) -> Option<Number> {
    if delta.fract() == 0.0 && delta.abs() <= i64::MAX as f64 {
        if let Some(i) = current.as_i64() {
            if let Some(sum) = i.checked_add(delta as i64) {
                return Some(Number::from(sum));
            }
        }
    }
    let sum = current.as_f64()? + delta;
    if sum.is_finite() {
        Number::from_f64(sum)
    } else {
        None
    }
}
