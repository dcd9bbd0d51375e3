//! Error types for the QuickJS handle wrapper

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ShimError>;

/// Errors that can occur while driving an engine handle
#[derive(Debug, Error)]
pub enum ShimError {
    /// The underlying engine refused an operation (allocation, property set, ...)
    #[error("Engine error: {message}")]
    Engine { message: String },

    /// The value passed in is the exception marker returned by a failed call
    #[error("Value is the exception marker; fetch the pending exception instead")]
    ExceptionValue,

    /// The value's table slot has already been released
    #[error("Value {id:#018x} has already been released")]
    ReleasedValue { id: u64 },

    /// The value does not refer to a slot this handle ever allocated
    #[error("Value {id:#018x} does not belong to this handle")]
    UnknownValue { id: u64 },

    /// The record carries a tag outside the pinned set
    #[error("Invalid value tag: {tag}")]
    InvalidTag { tag: i64 },

    /// Coercion to a native type failed
    #[error("Cannot convert value to {target}: {message}")]
    Conversion {
        target: &'static str,
        message: String,
    },

    /// JSON encode/decode failure
    #[error("JSON error: {message}")]
    Json { message: String },

    /// A native callback reported failure
    #[error("Native function '{name}' failed: {message}")]
    Callback { name: String, message: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl ShimError {
    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    /// Create a conversion error for the given target type
    pub fn conversion(target: &'static str, msg: impl Into<String>) -> Self {
        Self::Conversion {
            target,
            message: msg.into(),
        }
    }

    /// Create a JSON error
    pub fn json(msg: impl Into<String>) -> Self {
        Self::Json {
            message: msg.into(),
        }
    }

    /// Create a callback error
    pub fn callback(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Callback {
            name: name.into(),
            message: msg.into(),
        }
    }
}

impl From<rquickjs::Error> for ShimError {
    fn from(err: rquickjs::Error) -> Self {
        Self::engine(err.to_string())
    }
}

impl From<figment::Error> for ShimError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
