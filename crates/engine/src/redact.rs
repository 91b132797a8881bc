//! Redaction of sensitive fields before structured context reaches a log sink.
//!
//! Keys are compared after folding (accents, case and separators removed), so
//! `apiKey`, `api_key` and `API-KEY` are all caught, as are locale variants
//! such as `contraseña` or `tarjetaCredito`.

use serde_json::Value;

use crate::util::fold_text;

const MASK: &str = "[REDACTED]";

/// Fragments that mark a key as sensitive wherever they appear in it.
const SENSITIVE_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "secret",
    "apikey",
    "creditcard",
    "cardnumber",
    "contrasena",
    "clave",
    "tarjeta",
];

/// Short keys that are only sensitive as a whole word.
const SENSITIVE_KEYS: &[&str] = &["pin", "cvv", "cvc"];

/// Returns a copy of `value` with every sensitive field masked, recursively.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let val = if is_sensitive_key(key) {
                        Value::String(MASK.to_string())
                    } else {
                        redact(val)
                    };
                    (key.clone(), val)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Serializes `value` and redacts it; falls back to `null` when it cannot be
/// represented as JSON.
pub fn redacted<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value)
        .map(|value| redact(&value))
        .unwrap_or(Value::Null)
}

pub fn is_sensitive_key(key: &str) -> bool {
    let folded = fold_text(&split_camel_case(key));
    if folded
        .split(' ')
        .any(|word| SENSITIVE_KEYS.contains(&word))
    {
        return true;
    }
    let compact: String = folded.chars().filter(|c| !c.is_whitespace()).collect();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| compact.contains(fragment))
}

// `fold_text` lowercases, so camel-case boundaries have to be made explicit
// first for the whole-word list to see `userPin` as `user pin`.
fn split_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch.is_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        out.push(ch);
    }
    out
}
