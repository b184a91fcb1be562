#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Type specifications for `RestKit` service clients
//!
//! A [`TypeSpec`] describes how one logical type moves between its wire form
//! (JSON, or XML parsed into the same [`Value`] shape) and its in-memory form.
//! Specs are plain data: composite specs reference each other by name through
//! a [`SpecRegistry`] supplied in [`SerializationOptions`], which is what lets
//! mutually recursive types be declared without forward references.
//!
//! Every spec call takes a [`PropertyPath`] for diagnostics and a
//! [`SerializationOptions`] that decides whether a shape mismatch is fatal
//! (strict) or only logged (lenient).
//!
//! # Example
//!
//! ```ignore
//! use restkit_spec::{CompositeTypeSpec, PropertyPath, PropertySpec, SerializationOptions, TypeSpec};
//!
//! let spec = TypeSpec::composite(
//!     CompositeTypeSpec::new("Pet")
//!         .with_property("name", PropertySpec::new(TypeSpec::String).required())
//!         .with_property("age", PropertySpec::new(TypeSpec::Number).serialized_name("details.age")),
//! );
//!
//! let wire = spec.serialize(&PropertyPath::root(), &value, &SerializationOptions::strict())?;
//! ```

mod error;
mod options;
mod path;
pub mod spec;
mod value;
pub mod xml;

pub use error::{Result, SerializationError};
pub use options::{
    CompositeSpecDictionary, LogSink, SerializationOptions, SerializationOutputType, SpecRegistry,
};
pub use path::{PropertyPath, split_serialized_name};
pub use spec::{
    CompositeTypeSpec, DictionaryTypeSpec, EnumTypeSpec, PropertySpec, SequenceTypeSpec,
    TypeSpec, ValueSpec,
};
pub use value::{Map, Value};
