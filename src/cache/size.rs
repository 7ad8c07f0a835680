//! Size Estimation Module
//!
//! Computes an approximate in-memory byte cost for stored values. The model
//! is deliberately coarse: fixed widths for scalars, two bytes per UTF-16
//! code unit of text, and a recursive sum over composite values. It is a
//! pressure signal for the byte budget and the alarm registry, not an exact
//! memory measurement.

use serde_json::Value;

// == Cost Constants ==
/// Estimated cost of a numeric value, in bytes.
pub const NUMBER_COST: u64 = 8;

/// Estimated cost of a boolean value, in bytes.
pub const BOOL_COST: u64 = 4;

/// Estimated cost per UTF-16 code unit of text, in bytes.
pub const TEXT_UNIT_COST: u64 = 2;

/// Fixed per-entry overhead: the storage slot plus the creation, expiry, and
/// last-access timestamps. The same constant feeds both per-entry costs and
/// the whole-store total so the two always agree.
pub const ENTRY_OVERHEAD: u64 = 80;

// == Estimation ==
/// Estimates the in-memory byte cost of a value.
///
/// Null and other opaque shapes cost nothing; sequences and mappings cost the
/// sum of their parts (mapping keys are costed as text).
pub fn estimate(value: &Value) -> u64 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => BOOL_COST,
        Value::Number(_) => NUMBER_COST,
        Value::String(s) => text_cost(s),
        Value::Array(items) => items.iter().map(estimate).sum(),
        Value::Object(map) => map
            .iter()
            .map(|(key, val)| text_cost(key) + estimate(val))
            .sum(),
    }
}

/// Estimates the full cost of one stored entry: key, value, and the fixed
/// per-entry overhead.
pub fn entry_cost(key: &str, value: &Value) -> u64 {
    text_cost(key) + estimate(value) + ENTRY_OVERHEAD
}

/// Byte cost of a text fragment: two bytes per UTF-16 code unit.
fn text_cost(s: &str) -> u64 {
    TEXT_UNIT_COST * s.encode_utf16().count() as u64
}
