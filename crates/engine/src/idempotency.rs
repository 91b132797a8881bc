//! Deterministic idempotency keys for create operations.
//!
//! A key is the SHA-256 of a canonical JSON array
//! `["v1", operation, principal, field_0, field_1, ...]`, hex encoded. Missing
//! fields serialize as `null`, numbers in their normalized decimal form, so the
//! same logical request always lands on the same key regardless of process or
//! platform. Field order is part of the key.

use rust_decimal::Decimal;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::TransferLeg;

const KEY_VERSION: &str = "v1";

/// One semantically relevant input of a create operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyField(Option<String>);

impl KeyField {
    pub const MISSING: KeyField = KeyField(None);

    fn to_json(&self) -> Value {
        match &self.0 {
            Some(text) => Value::String(text.clone()),
            None => Value::Null,
        }
    }
}

impl From<&str> for KeyField {
    fn from(value: &str) -> Self {
        Self(Some(value.to_string()))
    }
}

impl From<String> for KeyField {
    fn from(value: String) -> Self {
        Self(Some(value))
    }
}

impl From<i64> for KeyField {
    fn from(value: i64) -> Self {
        Self(Some(value.to_string()))
    }
}

impl From<Decimal> for KeyField {
    fn from(value: Decimal) -> Self {
        Self(Some(value.normalize().to_string()))
    }
}

impl<T: Into<KeyField>> From<Option<T>> for KeyField {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::MISSING, Into::into)
    }
}

/// Derives the idempotency key of `operation` performed by `principal_id`.
///
/// A non-empty `explicit_key` is returned unchanged; the caller owns its
/// uniqueness.
pub fn create_idempotency_key<I>(
    operation: &str,
    principal_id: &str,
    fields: I,
    explicit_key: Option<&str>,
) -> String
where
    I: IntoIterator<Item = KeyField>,
{
    if let Some(key) = explicit_key.filter(|key| !key.is_empty()) {
        return key.to_string();
    }

    let mut parts = vec![
        Value::String(KEY_VERSION.to_string()),
        Value::String(operation.to_string()),
        Value::String(principal_id.to_string()),
    ];
    parts.extend(fields.into_iter().map(|field| field.to_json()));

    // A `Vec<Value>` of strings and nulls always serializes.
    let canonical = Value::Array(parts).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Key of one leg of a split transfer (`<base>:outflow`, `<base>:inflow`).
pub fn leg_key(base: &str, leg: TransferLeg) -> String {
    format!("{base}:{}", leg.as_str())
}
