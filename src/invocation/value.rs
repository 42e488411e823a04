//! # Best-effort typing of raw strings.
//!
//! Invocation arguments usually arrive as text (`key=value` pairs from a command
//! line, query strings, environment). [`guess`] turns such text into the most
//! specific [`Value`] it can represent.
//!
//! ## Rules
//! ```text
//! "true" / "false"       → Bool      (case-insensitive)
//! "null" / "none"        → Null      (case-insensitive)
//! "42", "-7"             → Number    (i64 / u64)
//! "1.5", "2e3"           → Number    (finite f64)
//! "[1,2]", "{\"a\":1}"   → Array / Object (valid JSON only)
//! anything else          → String    (verbatim)
//! ```

use serde_json::{Map, Number, Value};

/// Converts a raw string into the most specific JSON value it represents.
///
/// # Example
/// ```
/// use launchvisor::guess;
/// use serde_json::json;
///
/// assert_eq!(guess("8080"), json!(8080));
/// assert_eq!(guess("True"), json!(true));
/// assert_eq!(guess("[1, 2]"), json!([1, 2]));
/// assert_eq!(guess("pkg.mod:handler"), json!("pkg.mod:handler"));
/// ```
pub fn guess(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = trimmed.parse::<u64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
            return v;
        }
    }
    Value::String(raw.to_string())
}

/// Builds a map by guessing the type of every value in `pairs`.
///
/// Later keys overwrite earlier ones.
pub fn guess_map<'a, I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), guess(v)))
        .collect()
}
