use super::{Direction, fail_type_check};
use crate::error::Result;
use crate::options::SerializationOptions;
use crate::path::PropertyPath;
use crate::value::Value;
use std::cmp::Ordering;

/// Closed set of allowed values
///
/// Strings also match case-insensitively. In lenient mode a value outside the
/// set is logged and passed through unchanged, so services can add members
/// without breaking older clients.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumTypeSpec {
    allowed_values: Vec<Value>,
}

impl EnumTypeSpec {
    #[must_use]
    pub fn new<I, V>(allowed_values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            allowed_values: allowed_values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn allowed_values(&self) -> &[Value] {
        &self.allowed_values
    }

    #[must_use]
    pub fn is_allowed(&self, value: &Value) -> bool {
        self.allowed_values.iter().any(|allowed| match (allowed, value) {
            (Value::String(allowed), Value::String(candidate)) => {
                allowed == candidate || allowed.to_lowercase() == candidate.to_lowercase()
            }
            (Value::Number(allowed), Value::Number(candidate)) => {
                numbers_equal(allowed, candidate)
            }
            _ => allowed == value,
        })
    }

    pub(super) fn apply(
        &self,
        direction: Direction,
        path: &PropertyPath,
        value: &Value,
        options: &SerializationOptions,
    ) -> Result<Value> {
        if self.is_allowed(value) {
            return Ok(value.clone());
        }
        let allowed = Value::Array(self.allowed_values.clone());
        fail_type_check(
            direction,
            path,
            value,
            &format!("one of the enum allowed values: {allowed}"),
            options,
        )
    }
}

/// Numeric equality regardless of integer or float representation
fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b) == Some(Ordering::Equal),
        _ => false,
    }
}
