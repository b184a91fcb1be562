use super::{Direction, fail_type_check};
use crate::error::Result;
use crate::options::SerializationOptions;
use crate::path::PropertyPath;
use crate::value::Value;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use bytes::Bytes;

pub(super) fn byte_array(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match (direction, value) {
        (Direction::Serialize, Value::Bytes(bytes)) => Ok(Value::String(STANDARD.encode(bytes))),
        (Direction::Serialize, _) => fail_type_check(direction, path, value, "a byte array", options),
        (Direction::Deserialize, Value::Bytes(_)) => Ok(value.clone()),
        (Direction::Deserialize, Value::String(text)) => match STANDARD.decode(text.trim()) {
            Ok(decoded) => Ok(Value::Bytes(Bytes::from(decoded))),
            Err(_) => fail_type_check(direction, path, value, "a base64-encoded string", options),
        },
        (Direction::Deserialize, _) => {
            fail_type_check(direction, path, value, "a base64-encoded string", options)
        }
    }
}

/// Base64 with `-`/`_` in place of `+`/`/`, padding stripped
pub(super) fn base64_url(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match (direction, value) {
        (Direction::Serialize, Value::Bytes(bytes)) => {
            Ok(Value::String(URL_SAFE_NO_PAD.encode(bytes)))
        }
        (Direction::Serialize, _) => fail_type_check(direction, path, value, "a byte array", options),
        (Direction::Deserialize, Value::Bytes(_)) => Ok(value.clone()),
        (Direction::Deserialize, Value::String(text)) => {
            match URL_SAFE_NO_PAD.decode(text.trim().trim_end_matches('=')) {
                Ok(decoded) => Ok(Value::Bytes(Bytes::from(decoded))),
                Err(_) => fail_type_check(
                    direction,
                    path,
                    value,
                    "a base64url-encoded string",
                    options,
                ),
            }
        }
        (Direction::Deserialize, _) => {
            fail_type_check(direction, path, value, "a base64url-encoded string", options)
        }
    }
}
