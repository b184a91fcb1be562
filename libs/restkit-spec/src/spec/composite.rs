use super::{Direction, TypeSpec, ValueSpec, fail_missing_property, fail_type_check};
use crate::error::{Result, SerializationError};
use crate::options::SerializationOptions;
use crate::path::{PropertyPath, split_serialized_name};
use crate::value::{Map, Value};
use crate::xml::{ATTRIBUTES_KEY, CHARACTER_KEY};
use indexmap::IndexMap;
use std::sync::Arc;

/// One named field of a [`CompositeTypeSpec`]
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PropertySpec {
    pub value_spec: ValueSpec,
    pub required: bool,
    /// Value is fixed; `default_value` is emitted when the input lacks it
    pub constant: bool,
    pub default_value: Option<Value>,
    /// Server-populated; deserialized but never serialized
    pub readonly: bool,
    pub is_polymorphic_discriminator: bool,
    /// Wire name, dot separated for flattening (`properties.name`)
    pub serialized_name: Option<String>,
    pub xml_name: Option<String>,
    pub xml_element_name: Option<String>,
    pub xml_is_attribute: bool,
    pub xml_is_wrapped: bool,
}

impl PropertySpec {
    #[must_use]
    pub fn new(value_spec: impl Into<ValueSpec>) -> Self {
        Self {
            value_spec: value_spec.into(),
            required: false,
            constant: false,
            default_value: None,
            readonly: false,
            is_polymorphic_discriminator: false,
            serialized_name: None,
            xml_name: None,
            xml_element_name: None,
            xml_is_attribute: false,
            xml_is_wrapped: false,
        }
    }

    /// Property whose spec is looked up by name in the spec registry
    #[must_use]
    pub fn named(type_name: impl Into<String>) -> Self {
        Self::new(ValueSpec::named(type_name))
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn constant(mut self, value: impl Into<Value>) -> Self {
        self.constant = true;
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    #[must_use]
    pub fn polymorphic_discriminator(mut self) -> Self {
        self.is_polymorphic_discriminator = true;
        self
    }

    #[must_use]
    pub fn serialized_name(mut self, name: impl Into<String>) -> Self {
        self.serialized_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn xml_name(mut self, name: impl Into<String>) -> Self {
        self.xml_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn xml_element_name(mut self, name: impl Into<String>) -> Self {
        self.xml_element_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn xml_attribute(mut self) -> Self {
        self.xml_is_attribute = true;
        self
    }

    /// Wrapped XML list: `<xml_name><xml_element_name/>...</xml_name>`
    #[must_use]
    pub fn xml_wrapped(mut self, xml_name: impl Into<String>, element_name: impl Into<String>) -> Self {
        self.xml_is_wrapped = true;
        self.xml_name = Some(xml_name.into());
        self.xml_element_name = Some(element_name.into());
        self
    }

    /// Name this property has on the wire, possibly dotted
    fn wire_name(
        &self,
        name: &str,
        path: &PropertyPath,
        options: &SerializationOptions,
    ) -> Result<String> {
        if !options.is_xml() {
            return Ok(self.serialized_name.as_deref().unwrap_or(name).to_owned());
        }
        if self.xml_is_wrapped {
            return match (&self.xml_name, &self.xml_element_name) {
                (Some(wrapper), Some(element)) => Ok(format!("{wrapper}.{element}")),
                _ => Err(SerializationError::configuration(format!(
                    "Wrapped XML property at {path} requires both xmlName and xmlElementName."
                ))),
            };
        }
        Ok(self
            .xml_element_name
            .as_deref()
            .or(self.xml_name.as_deref())
            .or(self.serialized_name.as_deref())
            .unwrap_or(name)
            .to_owned())
    }
}

/// Record type with individually specified fields
///
/// Serialization walks the declared properties, not the input keys, so
/// undeclared input properties never reach the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeTypeSpec {
    type_name: String,
    property_specs: IndexMap<String, PropertySpec>,
}

impl CompositeTypeSpec {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            property_specs: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, property: PropertySpec) -> Self {
        self.property_specs.insert(name.into(), property);
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn property_specs(&self) -> &IndexMap<String, PropertySpec> {
        &self.property_specs
    }

    pub(super) fn apply(
        &self,
        direction: Direction,
        path: &PropertyPath,
        value: &Value,
        options: &SerializationOptions,
    ) -> Result<Value> {
        let empty = Map::new();
        let object = match value {
            Value::Object(object) => object,
            // empty XML elements parse as ""
            Value::String(text)
                if direction == Direction::Deserialize && options.is_xml() && text.is_empty() =>
            {
                &empty
            }
            _ => return fail_type_check(direction, path, value, "an object", options),
        };

        if let Some(subtype) = self.polymorphic_subtype(direction, path, object, options)? {
            return subtype.apply(direction, path, value, options);
        }

        match direction {
            Direction::Serialize => self.serialize_properties(path, object, options),
            Direction::Deserialize => self.deserialize_properties(path, object, options),
        }
    }

    /// Spec named by the discriminator value, when it differs from `self`
    fn polymorphic_subtype(
        &self,
        direction: Direction,
        path: &PropertyPath,
        object: &Map,
        options: &SerializationOptions,
    ) -> Result<Option<Arc<CompositeTypeSpec>>> {
        let Some((name, property)) = self
            .property_specs
            .iter()
            .find(|(_, property)| property.is_polymorphic_discriminator)
        else {
            return Ok(None);
        };
        let key = match direction {
            Direction::Serialize => name.clone(),
            Direction::Deserialize => property.wire_name(name, path, options)?,
        };
        let Some(discriminator) = object.get(&key).and_then(Value::as_str) else {
            return Ok(None);
        };
        Ok(options
            .resolve(discriminator)
            .filter(|subtype| subtype.type_name != self.type_name))
    }

    fn serialize_properties(
        &self,
        path: &PropertyPath,
        object: &Map,
        options: &SerializationOptions,
    ) -> Result<Value> {
        let direction = Direction::Serialize;
        let mut payload = Map::new();
        let mut attributes = Map::new();

        for (name, property) in &self.property_specs {
            let property_path = path.concat(name, None);
            let spec = property.value_spec.resolve(&property_path, options)?;

            let input = object.get(name).filter(|item| !item.is_null());
            let input = match (input, &property.default_value) {
                (Some(item), _) => item,
                (None, Some(default)) if property.constant => default,
                (None, _) => {
                    if property.required && !property.constant {
                        fail_missing_property(direction, spec.spec_type(), &property_path, options)?;
                    }
                    continue;
                }
            };

            if property.readonly {
                continue;
            }

            let wire_name = property.wire_name(name, path, options)?;
            let property_path = path.path_string_concat(name, &wire_name);
            let serialized = spec.apply(direction, &property_path, input, options)?;

            if options.is_xml() && property.xml_is_attribute {
                attributes.insert(wire_name, serialized);
            } else {
                insert_flattened(&mut payload, &split_serialized_name(&wire_name), serialized);
            }
        }

        if !attributes.is_empty() {
            payload.insert(ATTRIBUTES_KEY.to_owned(), Value::Object(attributes));
        }

        self.report_undeclared(direction, path, object.keys(), options);
        Ok(Value::Object(payload))
    }

    fn deserialize_properties(
        &self,
        path: &PropertyPath,
        object: &Map,
        options: &SerializationOptions,
    ) -> Result<Value> {
        let direction = Direction::Deserialize;
        let attributes = object.get(ATTRIBUTES_KEY).and_then(Value::as_object);
        let mut instance = Map::new();
        let mut consumed: Vec<String> = Vec::new();

        for (name, property) in &self.property_specs {
            let wire_name = property.wire_name(name, path, options)?;
            let property_path = path.path_string_concat(name, &wire_name);
            let spec = property.value_spec.resolve(&property_path, options)?;

            let segments = split_serialized_name(&wire_name);
            let found = if options.is_xml() && property.xml_is_attribute {
                attributes.and_then(|attributes| attributes.get(&wire_name))
            } else {
                if let Some(first) = segments.first() {
                    consumed.push(first.clone());
                }
                lookup_flattened(object, &segments)
            };

            match found.filter(|item| !item.is_null()) {
                Some(item) => {
                    let deserialized = spec.apply(direction, &property_path, item, options)?;
                    instance.insert(name.clone(), deserialized);
                }
                None if options.is_xml()
                    && property.xml_is_wrapped
                    && segments.first().is_some_and(|wrapper| object.contains_key(wrapper)) =>
                {
                    instance.insert(name.clone(), Value::Array(Vec::new()));
                }
                None => match &property.default_value {
                    Some(default) if property.constant => {
                        instance.insert(name.clone(), default.clone());
                    }
                    _ if property.required && !property.constant => {
                        fail_missing_property(
                            direction,
                            spec.spec_type(),
                            &path.concat(name, None),
                            options,
                        )?;
                    }
                    _ => {}
                },
            }
        }

        let undeclared = object.keys().filter(|key| {
            !consumed.contains(*key)
                && key.as_str() != ATTRIBUTES_KEY
                && key.as_str() != CHARACTER_KEY
        });
        self.report_undeclared(direction, path, undeclared, options);
        Ok(Value::Object(instance))
    }

    /// Undeclared properties are dropped; they are reported but never fatal
    fn report_undeclared<'a>(
        &self,
        direction: Direction,
        path: &PropertyPath,
        keys: impl Iterator<Item = &'a String>,
        options: &SerializationOptions,
    ) {
        let dropped: Vec<&str> = match direction {
            Direction::Serialize => keys
                .filter(|key| !self.property_specs.contains_key(key.as_str()))
                .map(String::as_str)
                .collect(),
            Direction::Deserialize => keys.map(String::as_str).collect(),
        };
        if dropped.is_empty() {
            return;
        }
        tracing::debug!(
            type_name = %self.type_name,
            path = %path,
            ?direction,
            strict = direction.strict_allowed_properties(options),
            dropped = ?dropped,
            "Dropping properties not declared by composite spec"
        );
    }
}

/// Write `value` under `segments`, creating intermediate objects
fn insert_flattened(target: &mut Map, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let entry = target
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_flattened(child, rest, value);
            }
        }
    }
}

/// Follow `segments` through nested objects; `None` if any link is absent
fn lookup_flattened<'a>(object: &'a Map, segments: &[String]) -> Option<&'a Value> {
    let (last, parents) = segments.split_last()?;
    let mut current = object;
    for segment in parents {
        current = current.get(segment)?.as_object()?;
    }
    current.get(last)
}

impl From<Arc<CompositeTypeSpec>> for TypeSpec {
    fn from(spec: Arc<CompositeTypeSpec>) -> Self {
        Self::Composite(spec)
    }
}
