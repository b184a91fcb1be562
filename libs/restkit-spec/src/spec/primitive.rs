use super::{Direction, fail_type_check};
use crate::error::Result;
use crate::options::SerializationOptions;
use crate::path::PropertyPath;
use crate::value::Value;

/// XML carries every scalar as text, so deserialization accepts the textual
/// forms when the payload came from XML.
fn accepts_text(direction: Direction, options: &SerializationOptions) -> bool {
    direction == Direction::Deserialize && options.is_xml()
}

pub(super) fn boolean(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(text) if accepts_text(direction, options) && text == "true" => {
            Ok(Value::Bool(true))
        }
        Value::String(text) if accepts_text(direction, options) && text == "false" => {
            Ok(Value::Bool(false))
        }
        _ => fail_type_check(direction, path, value, "a boolean", options),
    }
}

pub(super) fn number(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(text) if accepts_text(direction, options) => match parse_number(text) {
            Some(parsed) => Ok(parsed),
            None => fail_type_check(direction, path, value, "a number", options),
        },
        _ => fail_type_check(direction, path, value, "a number", options),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::from(integer));
    }
    text.parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .map(Value::from)
}

pub(super) fn string(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match value {
        Value::String(_) => Ok(value.clone()),
        _ => fail_type_check(direction, path, value, "a string", options),
    }
}

pub(super) fn uuid(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match value {
        Value::String(text) if is_canonical_uuid(text) => Ok(value.clone()),
        _ => fail_type_check(direction, path, value, "a UUID string", options),
    }
}

fn is_canonical_uuid(text: &str) -> bool {
    text.len() == 36 && uuid::Uuid::try_parse(text).is_ok()
}

pub(super) fn stream(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match value {
        Value::Stream(_) | Value::Bytes(_) => Ok(value.clone()),
        _ => fail_type_check(direction, path, value, "a Stream", options),
    }
}

pub(super) fn object(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(value.clone()),
        _ => fail_type_check(direction, path, value, "an object", options),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::{PropertyPath, SerializationOptions, TypeSpec, Value};
    use serde_json::json;

    fn root() -> PropertyPath {
        PropertyPath::from_segments(["a", "property", "path"])
    }

    #[test]
    fn test_boolean_round_trip() {
        let options = SerializationOptions::strict();
        for flag in [true, false] {
            let wire = TypeSpec::Boolean
                .serialize(&root(), &Value::from(flag), &options)
                .unwrap();
            let back = TypeSpec::Boolean.deserialize(&root(), &wire, &options).unwrap();
            assert_eq!(back, Value::from(flag));
        }
    }

    #[test]
    fn test_boolean_rejects_string_in_json_mode() {
        let err = TypeSpec::Boolean
            .deserialize(&root(), &Value::from("true"), &SerializationOptions::strict())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Property a.property.path with value \"true\" must be a boolean."
        );
    }

    #[test]
    fn test_xml_scalars_are_parsed_from_text() {
        let options = SerializationOptions::strict().xml();
        assert_eq!(
            TypeSpec::Boolean
                .deserialize(&root(), &Value::from("false"), &options)
                .unwrap(),
            Value::from(false)
        );
        assert_eq!(
            TypeSpec::Number
                .deserialize(&root(), &Value::from("42"), &options)
                .unwrap(),
            Value::from(42)
        );
        assert_eq!(
            TypeSpec::Number
                .deserialize(&root(), &Value::from("1.25"), &options)
                .unwrap(),
            Value::from(1.25)
        );
    }

    #[test]
    fn test_number_strict_error() {
        let err = TypeSpec::Number
            .serialize(&root(), &Value::from("1"), &SerializationOptions::strict())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Property a.property.path with value \"1\" must be a number."
        );
    }

    #[test]
    fn test_uuid_requires_canonical_form() {
        let options = SerializationOptions::strict();
        let id = Value::from("e56c0c1e-5e3c-4a48-8c6e-5f2f0b1f4d2a");
        assert_eq!(TypeSpec::Uuid.serialize(&root(), &id, &options).unwrap(), id);

        let simple = Value::from("e56c0c1e5e3c4a488c6e5f2f0b1f4d2a");
        let err = TypeSpec::Uuid.serialize(&root(), &simple, &options).unwrap_err();
        assert!(err.to_string().ends_with("must be a UUID string."));
    }

    #[test]
    fn test_object_passthrough() {
        let options = SerializationOptions::strict();
        let value = Value::from(json!({"free": {"form": [1, 2]}}));
        assert_eq!(
            TypeSpec::Object.serialize(&root(), &value, &options).unwrap(),
            value
        );
        assert!(
            TypeSpec::Object
                .serialize(&root(), &Value::from(1), &options)
                .is_err()
        );
    }

    #[test]
    fn test_stream_accepts_binary_only() {
        let options = SerializationOptions::strict();
        let body = Value::Stream(bytes::Bytes::from_static(b"raw"));
        assert_eq!(TypeSpec::Stream.serialize(&root(), &body, &options).unwrap(), body);
        let err = TypeSpec::Stream
            .serialize(&root(), &Value::from("raw"), &options)
            .unwrap_err();
        assert!(err.to_string().ends_with("must be a Stream."));
    }
}
