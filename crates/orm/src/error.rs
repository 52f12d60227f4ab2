//! Errors

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Compilation errors.
///
/// None of these are transient: they mean the caller built an invalid request or a
/// table's descriptors have drifted from its record type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required filter, page or record was missing or malformed.
    #[error("invalid parameter: {description}")]
    InvalidParameter { description: String },

    /// A filter, sort or field whitelist referenced an unknown column.
    #[error("schema violation: {description}")]
    SchemaViolation { description: String },

    /// An operator or value is incompatible with the column's declared type.
    #[error("type mismatch: {description}")]
    TypeMismatch { description: String },

    /// A record field has no column annotation.
    #[error("missing annotation: field `{field}` of `{record}` has no column")]
    MissingAnnotation { record: &'static str, field: &'static str },
}

impl Error {
    /// Returns a short, stable code for the variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::MissingAnnotation { .. } => "missing_annotation",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParameter {
            description: err.to_string(),
        }
    }
}

/// Builds an [`Error::InvalidParameter`] from a format string.
#[macro_export]
macro_rules! invalid_parameter {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::InvalidParameter { description: format!($fmt, $($arg)*) }
    };
    ($desc:expr $(,)?) => {
        $crate::Error::InvalidParameter { description: format!($desc) }
    };
}

/// Builds an [`Error::SchemaViolation`] from a format string.
#[macro_export]
macro_rules! schema_violation {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::SchemaViolation { description: format!($fmt, $($arg)*) }
    };
    ($desc:expr $(,)?) => {
        $crate::Error::SchemaViolation { description: format!($desc) }
    };
}

/// Builds an [`Error::TypeMismatch`] from a format string.
#[macro_export]
macro_rules! type_mismatch {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::TypeMismatch { description: format!($fmt, $($arg)*) }
    };
    ($desc:expr $(,)?) => {
        $crate::Error::TypeMismatch { description: format!($desc) }
    };
}
