//! Helpers for the loosely typed numbers dApps put in request params.

use alloy_primitives::U256;
use serde_json::Value;

/// Parses a quantity given as a JSON number, a decimal string or a `0x` hex string.
pub fn parse_quantity(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(num) => num
            .as_u64()
            .map(U256::from)
            .or_else(|| num.to_string().parse().ok())
            .ok_or_else(|| format!("{num} is not an unsigned integer")),
        Value::String(s) => parse_quantity_str(s),
        other => Err(format!("expected a quantity, got {other}")),
    }
}

/// Parses a decimal or `0x` hex quantity.
pub fn parse_quantity_str(s: &str) -> Result<U256, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => return Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|err| format!("invalid quantity {s:?}: {err}"))
}

/// Formats a quantity the way JSON-RPC expects it, `0x` prefixed without leading zeros.
pub fn to_quantity(value: U256) -> String {
    format!("{value:#x}")
}

/// Normalises a quantity to its hex form, leaving it untouched if it doesn't parse.
pub fn normalize_quantity(value: &Value) -> Value {
    match parse_quantity(value) {
        Ok(quantity) => Value::String(to_quantity(quantity)),
        Err(_) => value.clone(),
    }
}
