//! Type specifications
//!
//! [`TypeSpec`] is a tagged union over every spec kind. Primitive kinds carry
//! no data; the recursive kinds (composite, sequence, dictionary, enum) hold
//! their definition behind an `Arc` so specs are cheap to clone and share.

mod binary;
mod composite;
mod dictionary;
mod enumeration;
mod primitive;
mod sequence;
pub(crate) mod temporal;

pub use composite::{CompositeTypeSpec, PropertySpec};
pub use dictionary::DictionaryTypeSpec;
pub use enumeration::EnumTypeSpec;
pub use sequence::SequenceTypeSpec;

use crate::error::{Result, SerializationError};
use crate::options::SerializationOptions;
use crate::path::PropertyPath;
use crate::value::Value;
use std::sync::Arc;

/// Declarative description of one logical type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Boolean,
    Number,
    String,
    /// Calendar date, `YYYY-MM-DD` on the wire
    Date,
    /// ISO-8601 date-time with millisecond precision
    DateTime,
    /// `Tue, 01 Jan 2019 00:00:00 GMT`
    DateTimeRfc1123,
    /// Whole seconds since the Unix epoch
    UnixTime,
    Uuid,
    /// Standard padded base64
    ByteArray,
    /// URL-safe base64 without padding
    Base64Url,
    Stream,
    /// Any object, passed through
    Object,
    /// ISO-8601 duration
    TimeSpan,
    Composite(Arc<CompositeTypeSpec>),
    Sequence(Arc<SequenceTypeSpec>),
    Dictionary(Arc<DictionaryTypeSpec>),
    Enum(Arc<EnumTypeSpec>),
}

impl TypeSpec {
    #[must_use]
    pub fn composite(spec: CompositeTypeSpec) -> Self {
        Self::Composite(Arc::new(spec))
    }

    #[must_use]
    pub fn sequence(element_spec: impl Into<ValueSpec>) -> Self {
        Self::Sequence(Arc::new(SequenceTypeSpec::new(element_spec)))
    }

    #[must_use]
    pub fn dictionary(value_spec: impl Into<ValueSpec>) -> Self {
        Self::Dictionary(Arc::new(DictionaryTypeSpec::new(value_spec)))
    }

    #[must_use]
    pub fn enumeration<I, V>(allowed_values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Enum(Arc::new(EnumTypeSpec::new(allowed_values)))
    }

    /// Variant tag, as used in diagnostics
    #[must_use]
    pub fn spec_type(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::DateTimeRfc1123 => "DateTimeRFC1123",
            Self::UnixTime => "UnixTime",
            Self::Uuid => "UUID",
            Self::ByteArray => "ByteArray",
            Self::Base64Url => "Base64Url",
            Self::Stream => "Stream",
            Self::Object => "Object",
            Self::TimeSpan => "TimeSpan",
            Self::Composite(_) => "Composite",
            Self::Sequence(_) => "Sequence",
            Self::Dictionary(_) => "Dictionary",
            Self::Enum(_) => "Enum",
        }
    }

    /// Convert an in-memory value to its wire form
    ///
    /// # Errors
    /// Returns [`SerializationError::Validation`] when the value has the wrong
    /// shape and strict type checking is enabled for serialization, and
    /// [`SerializationError::Configuration`] when the spec itself is broken.
    pub fn serialize(
        &self,
        path: &PropertyPath,
        value: &Value,
        options: &SerializationOptions,
    ) -> Result<Value> {
        self.apply(Direction::Serialize, path, value, options)
    }

    /// Convert a wire value to its in-memory form
    ///
    /// # Errors
    /// Same conditions as [`TypeSpec::serialize`], governed by the
    /// deserialization flags.
    pub fn deserialize(
        &self,
        path: &PropertyPath,
        value: &Value,
        options: &SerializationOptions,
    ) -> Result<Value> {
        self.apply(Direction::Deserialize, path, value, options)
    }

    pub(crate) fn apply(
        &self,
        direction: Direction,
        path: &PropertyPath,
        value: &Value,
        options: &SerializationOptions,
    ) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Boolean => primitive::boolean(direction, path, value, options),
            Self::Number => primitive::number(direction, path, value, options),
            Self::String => primitive::string(direction, path, value, options),
            Self::Uuid => primitive::uuid(direction, path, value, options),
            Self::Stream => primitive::stream(direction, path, value, options),
            Self::Object => primitive::object(direction, path, value, options),
            Self::Date => temporal::date(direction, path, value, options),
            Self::DateTime => temporal::date_time(direction, path, value, options),
            Self::DateTimeRfc1123 => temporal::date_time_rfc1123(direction, path, value, options),
            Self::UnixTime => temporal::unix_time(direction, path, value, options),
            Self::TimeSpan => temporal::time_span(direction, path, value, options),
            Self::ByteArray => binary::byte_array(direction, path, value, options),
            Self::Base64Url => binary::base64_url(direction, path, value, options),
            Self::Composite(spec) => spec.apply(direction, path, value, options),
            Self::Sequence(spec) => spec.apply(direction, path, value, options),
            Self::Dictionary(spec) => spec.apply(direction, path, value, options),
            Self::Enum(spec) => spec.apply(direction, path, value, options),
        }
    }
}

impl From<CompositeTypeSpec> for TypeSpec {
    fn from(spec: CompositeTypeSpec) -> Self {
        Self::composite(spec)
    }
}

/// Spec of a property, sequence element or dictionary value
///
/// `Named` entries are resolved through
/// [`SerializationOptions::composite_spec_dictionary`] on every call.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSpec {
    Inline(TypeSpec),
    Named(String),
}

impl ValueSpec {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub(crate) fn resolve(
        &self,
        path: &PropertyPath,
        options: &SerializationOptions,
    ) -> Result<TypeSpec> {
        match self {
            Self::Inline(spec) => Ok(spec.clone()),
            Self::Named(name) => options.resolve(name).map(TypeSpec::Composite).ok_or_else(|| {
                SerializationError::configuration(format!(
                    "Missing composite specification entry in composite type dictionary for type named \"{name}\" at {path}."
                ))
            }),
        }
    }
}

impl From<TypeSpec> for ValueSpec {
    fn from(spec: TypeSpec) -> Self {
        Self::Inline(spec)
    }
}

impl From<CompositeTypeSpec> for ValueSpec {
    fn from(spec: CompositeTypeSpec) -> Self {
        Self::Inline(TypeSpec::composite(spec))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Serialize,
    Deserialize,
}

impl Direction {
    fn strict_type_checking(self, options: &SerializationOptions) -> bool {
        match self {
            Self::Serialize => options.serialization_strict_type_checking,
            Self::Deserialize => options.deserialization_strict_type_checking,
        }
    }

    fn strict_missing_properties(self, options: &SerializationOptions) -> bool {
        match self {
            Self::Serialize => options.serialization_strict_missing_properties,
            Self::Deserialize => options.deserialization_strict_missing_properties,
        }
    }

    fn strict_allowed_properties(self, options: &SerializationOptions) -> bool {
        match self {
            Self::Serialize => options.serialization_strict_allowed_properties,
            Self::Deserialize => options.deserialization_strict_allowed_properties,
        }
    }
}

/// Strict: validation error. Lenient: warning, value returned unchanged.
pub(crate) fn fail_type_check(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    expected: &str,
    options: &SerializationOptions,
) -> Result<Value> {
    if direction.strict_type_checking(options) {
        return Err(SerializationError::validation(format!(
            "Property {path} with value {value} must be {expected}."
        )));
    }
    options.warn(&format!(
        "Property {path} with value {value} should be {expected}."
    ));
    Ok(value.clone())
}

pub(crate) fn fail_missing_property(
    direction: Direction,
    spec_type: &str,
    path: &PropertyPath,
    options: &SerializationOptions,
) -> Result<()> {
    let message = format!("Missing non-constant {spec_type} property at {path}.");
    if direction.strict_missing_properties(options) {
        return Err(SerializationError::validation(message));
    }
    options.warn(&message);
    Ok(())
}
