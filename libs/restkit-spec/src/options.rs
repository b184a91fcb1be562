use crate::spec::CompositeTypeSpec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Single-argument log function shared by specs and policies
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Wire format produced by serialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerializationOutputType {
    #[default]
    Json,
    Xml,
}

/// Resolves named composite specs at call time
///
/// Named property specs are looked up through the registry on every call,
/// so mutually recursive types can refer to each other by name.
pub trait SpecRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<CompositeTypeSpec>>;
}

/// Map-backed [`SpecRegistry`]
#[derive(Debug, Clone, Default)]
pub struct CompositeSpecDictionary {
    specs: HashMap<String, Arc<CompositeTypeSpec>>,
}

impl CompositeSpecDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec under its own type name
    pub fn insert(&mut self, spec: CompositeTypeSpec) -> Option<Arc<CompositeTypeSpec>> {
        self.specs.insert(spec.type_name().to_owned(), Arc::new(spec))
    }

    /// Register a spec under an explicit name (discriminator values, aliases)
    pub fn insert_named(
        &mut self,
        name: impl Into<String>,
        spec: Arc<CompositeTypeSpec>,
    ) -> Option<Arc<CompositeTypeSpec>> {
        self.specs.insert(name.into(), spec)
    }

    #[must_use]
    pub fn with(mut self, spec: CompositeTypeSpec) -> Self {
        self.insert(spec);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl SpecRegistry for CompositeSpecDictionary {
    fn resolve(&self, name: &str) -> Option<Arc<CompositeTypeSpec>> {
        self.specs.get(name).cloned()
    }
}

impl FromIterator<CompositeTypeSpec> for CompositeSpecDictionary {
    fn from_iter<I: IntoIterator<Item = CompositeTypeSpec>>(iter: I) -> Self {
        let mut dictionary = Self::new();
        for spec in iter {
            dictionary.insert(spec);
        }
        dictionary
    }
}

/// Options threaded through every spec call
///
/// Each strict flag decides, for one kind of mismatch and one direction,
/// whether the mismatch is a [`SerializationError::Validation`] or a logged
/// warning. Constructed once per request/response pass and read-only
/// afterwards.
///
/// [`SerializationError::Validation`]: crate::SerializationError::Validation
#[derive(Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SerializationOptions {
    pub output_type: SerializationOutputType,
    pub serialization_strict_type_checking: bool,
    pub serialization_strict_allowed_properties: bool,
    pub serialization_strict_missing_properties: bool,
    pub deserialization_strict_type_checking: bool,
    pub deserialization_strict_allowed_properties: bool,
    pub deserialization_strict_missing_properties: bool,
    pub composite_spec_dictionary: Option<Arc<dyn SpecRegistry>>,
    /// Receives lenient-mode warnings; `tracing::warn!` when unset
    pub log: Option<LogSink>,
}

impl fmt::Debug for SerializationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationOptions")
            .field("output_type", &self.output_type)
            .field(
                "serialization_strict_type_checking",
                &self.serialization_strict_type_checking,
            )
            .field(
                "serialization_strict_allowed_properties",
                &self.serialization_strict_allowed_properties,
            )
            .field(
                "serialization_strict_missing_properties",
                &self.serialization_strict_missing_properties,
            )
            .field(
                "deserialization_strict_type_checking",
                &self.deserialization_strict_type_checking,
            )
            .field(
                "deserialization_strict_allowed_properties",
                &self.deserialization_strict_allowed_properties,
            )
            .field(
                "deserialization_strict_missing_properties",
                &self.deserialization_strict_missing_properties,
            )
            .field(
                "composite_spec_dictionary",
                &self.composite_spec_dictionary.is_some(),
            )
            .field("log", &self.log.is_some())
            .finish()
    }
}

impl SerializationOptions {
    /// Every strict flag enabled, JSON output
    #[must_use]
    pub fn strict() -> Self {
        Self {
            serialization_strict_type_checking: true,
            serialization_strict_allowed_properties: true,
            serialization_strict_missing_properties: true,
            deserialization_strict_type_checking: true,
            deserialization_strict_allowed_properties: true,
            deserialization_strict_missing_properties: true,
            ..Self::default()
        }
    }

    /// Every strict flag disabled, JSON output
    #[must_use]
    pub fn lenient() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output_type(mut self, output_type: SerializationOutputType) -> Self {
        self.output_type = output_type;
        self
    }

    #[must_use]
    pub fn xml(self) -> Self {
        self.with_output_type(SerializationOutputType::Xml)
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn SpecRegistry>) -> Self {
        self.composite_spec_dictionary = Some(registry);
        self
    }

    #[must_use]
    pub fn with_dictionary(self, dictionary: CompositeSpecDictionary) -> Self {
        self.with_registry(Arc::new(dictionary))
    }

    #[must_use]
    pub fn with_log(mut self, log: LogSink) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn with_strict_type_checking(mut self, serialize: bool, deserialize: bool) -> Self {
        self.serialization_strict_type_checking = serialize;
        self.deserialization_strict_type_checking = deserialize;
        self
    }

    #[must_use]
    pub fn with_strict_missing_properties(mut self, serialize: bool, deserialize: bool) -> Self {
        self.serialization_strict_missing_properties = serialize;
        self.deserialization_strict_missing_properties = deserialize;
        self
    }

    #[must_use]
    pub fn with_strict_allowed_properties(mut self, serialize: bool, deserialize: bool) -> Self {
        self.serialization_strict_allowed_properties = serialize;
        self.deserialization_strict_allowed_properties = deserialize;
        self
    }

    #[must_use]
    pub fn is_xml(&self) -> bool {
        self.output_type == SerializationOutputType::Xml
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<Arc<CompositeTypeSpec>> {
        self.composite_spec_dictionary
            .as_ref()
            .and_then(|registry| registry.resolve(name))
    }

    pub(crate) fn warn(&self, message: &str) {
        match &self.log {
            Some(log) => log(message),
            None => tracing::warn!("{message}"),
        }
    }
}
