use thiserror::Error;

/// Errors raised by type specifications and the XML codec
///
/// `Validation` is only produced when the matching strict flag is enabled in
/// [`SerializationOptions`](crate::SerializationOptions); in lenient mode the
/// same condition is logged and the value passes through. `Configuration`
/// errors describe a broken spec and are raised regardless of strictness.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SerializationError {
    /// Value does not have the shape the spec expects
    #[error("{message}")]
    Validation { message: String },

    /// Spec declaration is incomplete or refers to an unknown type
    #[error("{message}")]
    Configuration { message: String },

    /// XML document could not be parsed or written
    #[error("XML error: {message}")]
    Xml { message: String },
}

impl SerializationError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn xml(message: impl Into<String>) -> Self {
        Self::Xml {
            message: message.into(),
        }
    }

    /// Human readable message without any prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::Configuration { message }
            | Self::Xml { message } => message,
        }
    }

    /// Whether this error denotes a broken spec rather than bad data
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Result alias used throughout the spec engine
pub type Result<T> = std::result::Result<T, SerializationError>;
