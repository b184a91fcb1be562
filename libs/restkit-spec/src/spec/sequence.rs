use super::{Direction, ValueSpec, fail_type_check};
use crate::error::Result;
use crate::options::SerializationOptions;
use crate::path::PropertyPath;
use crate::value::Value;
use std::slice;

/// Ordered list whose elements share one spec
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceTypeSpec {
    element_spec: ValueSpec,
}

impl SequenceTypeSpec {
    #[must_use]
    pub fn new(element_spec: impl Into<ValueSpec>) -> Self {
        Self {
            element_spec: element_spec.into(),
        }
    }

    #[must_use]
    pub fn element_spec(&self) -> &ValueSpec {
        &self.element_spec
    }

    pub(super) fn apply(
        &self,
        direction: Direction,
        path: &PropertyPath,
        value: &Value,
        options: &SerializationOptions,
    ) -> Result<Value> {
        let xml_input = direction == Direction::Deserialize && options.is_xml();
        let items: &[Value] = match value {
            Value::Array(items) => items,
            // an XML list with no children parses as ""
            Value::String(text) if xml_input && text.is_empty() => &[],
            // an XML list with one child parses as that child
            _ if xml_input => slice::from_ref(value),
            _ => return fail_type_check(direction, path, value, "an array", options),
        };

        let element_spec = self.element_spec.resolve(path, options)?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                element_spec.apply(direction, &path.concat(&index.to_string(), None), item, options)
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::{PropertyPath, SerializationOptions, TypeSpec, Value};
    use serde_json::json;

    #[test]
    fn test_elements_use_index_in_path() {
        let spec = TypeSpec::sequence(TypeSpec::Number);
        let err = spec
            .serialize(
                &PropertyPath::from_segments(["list"]),
                &Value::from(json!([1, "two", 3])),
                &SerializationOptions::strict(),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Property list.1 with value \"two\" must be a number."
        );
    }

    #[test]
    fn test_non_array_rejected() {
        let err = TypeSpec::sequence(TypeSpec::String)
            .serialize(
                &PropertyPath::from_segments(["list"]),
                &Value::from("solo"),
                &SerializationOptions::strict(),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Property list with value \"solo\" must be an array."
        );
    }

    #[test]
    fn test_xml_single_child_and_empty_list() {
        let spec = TypeSpec::sequence(TypeSpec::String);
        let options = SerializationOptions::strict().xml();
        assert_eq!(
            spec.deserialize(&PropertyPath::root(), &Value::from("solo"), &options)
                .unwrap(),
            Value::from(json!(["solo"]))
        );
        assert_eq!(
            spec.deserialize(&PropertyPath::root(), &Value::from(""), &options)
                .unwrap(),
            Value::from(json!([]))
        );
    }

    #[test]
    fn test_nested_sequences_round_trip() {
        let spec = TypeSpec::sequence(TypeSpec::sequence(TypeSpec::Boolean));
        let options = SerializationOptions::strict();
        let input = Value::from(json!([[true], [false, true], []]));
        let wire = spec.serialize(&PropertyPath::root(), &input, &options).unwrap();
        assert_eq!(
            spec.deserialize(&PropertyPath::root(), &wire, &options).unwrap(),
            input
        );
    }
}
