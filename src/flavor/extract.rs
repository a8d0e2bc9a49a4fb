//! Payload extraction shared by the HTTP and file sources.

use super::traits::FlavorError;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::Value;

fn at_pointer<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value, FlavorError> {
    if pointer.is_empty() {
        return Ok(value);
    }
    value
        .pointer(pointer)
        .ok_or_else(|| FlavorError::Missing(pointer.to_string()))
}

fn non_empty(text: &str) -> Result<String, FlavorError> {
    let text = text.trim();
    if text.is_empty() {
        Err(FlavorError::Empty)
    } else {
        Ok(text.to_string())
    }
}

/// The string at `pointer`.
pub fn field(value: &Value, pointer: &str) -> Result<String, FlavorError> {
    match at_pointer(value, pointer)? {
        Value::String(s) => non_empty(s),
        Value::Null => Err(FlavorError::Missing(pointer.to_string())),
        _ => Err(FlavorError::Malformed("a string")),
    }
}

/// A random non-empty string element of the array at `pointer`.
pub fn random_element<R: Rng + ?Sized>(
    value: &Value,
    pointer: &str,
    rng: &mut R,
) -> Result<String, FlavorError> {
    let Value::Array(items) = at_pointer(value, pointer)? else {
        return Err(FlavorError::Malformed("an array"));
    };
    let strings: Vec<&str> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    strings
        .choose(rng)
        .map(|s| (*s).to_string())
        .ok_or(FlavorError::Empty)
}

/// A random non-empty line from a fixed list.
pub fn random_line<R: Rng + ?Sized>(lines: &[String], rng: &mut R) -> Result<String, FlavorError> {
    let candidates: Vec<&String> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    candidates
        .choose(rng)
        .map(|l| l.trim().to_string())
        .ok_or(FlavorError::Empty)
}

pub fn text_body(body: &str) -> Result<String, FlavorError> {
    non_empty(body)
}

pub fn with_prefix(text: String, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}{text}"),
        _ => text,
    }
}
