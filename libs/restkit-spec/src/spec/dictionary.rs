use super::{Direction, ValueSpec, fail_type_check};
use crate::error::Result;
use crate::options::SerializationOptions;
use crate::path::PropertyPath;
use crate::value::{Map, Value};

/// String-keyed map whose values share one spec; keys are kept verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryTypeSpec {
    value_spec: ValueSpec,
}

impl DictionaryTypeSpec {
    #[must_use]
    pub fn new(value_spec: impl Into<ValueSpec>) -> Self {
        Self {
            value_spec: value_spec.into(),
        }
    }

    #[must_use]
    pub fn value_spec(&self) -> &ValueSpec {
        &self.value_spec
    }

    pub(super) fn apply(
        &self,
        direction: Direction,
        path: &PropertyPath,
        value: &Value,
        options: &SerializationOptions,
    ) -> Result<Value> {
        let Value::Object(entries) = value else {
            return fail_type_check(direction, path, value, "an object", options);
        };

        let value_spec = self.value_spec.resolve(path, options)?;
        let mut result = Map::with_capacity(entries.len());
        for (key, item) in entries {
            let converted = value_spec.apply(direction, &path.concat(key, None), item, options)?;
            result.insert(key.clone(), converted);
        }
        Ok(Value::Object(result))
    }
}
