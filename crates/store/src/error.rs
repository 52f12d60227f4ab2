//! Errors

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Storage level error type.
///
/// Compilation errors pass through unchanged and are never worth retrying.
/// `AllocationExhausted` and `Storage` may be transient, but retrying is left to
/// the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request did not compile.
    #[error(transparent)]
    Orm(#[from] stratus_orm::Error),

    /// Identifiers could not be reserved.
    #[error("allocation exhausted for {kind}: {description}")]
    AllocationExhausted { kind: String, description: String },

    /// The driver failed to execute, commit or roll back.
    #[error("storage error: {description}")]
    Storage { description: String },

    /// The caller's context was cancelled before the statement was issued.
    #[error("operation canceled")]
    Canceled,
}

impl Error {
    /// Returns a short, stable code for the variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Orm(inner) => inner.code(),
            Self::AllocationExhausted { .. } => "allocation_exhausted",
            Self::Storage { .. } => "storage_error",
            Self::Canceled => "canceled",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        if let Some(inner) = err.downcast_ref::<Self>() {
            return inner.clone();
        }
        if let Some(inner) = err.downcast_ref::<stratus_orm::Error>() {
            return Self::Orm(inner.clone());
        }

        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(": ");
        Self::Storage { description: chain }
    }
}

/// Builds an [`Error::Storage`] from a format string.
#[macro_export]
macro_rules! storage_error {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Storage { description: format!($fmt, $($arg)*) }
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Storage { description: format!($desc) }
    };
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, anyhow};

    use super::*;

    #[test]
    fn context_chain_becomes_description() {
        let result: anyhow::Result<()> = Err(anyhow!("disk I/O error")).context("failed to execute statement");
        let err: Error = result.unwrap_err().into();
        assert_eq!(
            err,
            Error::Storage {
                description: "failed to execute statement: disk I/O error".to_string()
            }
        );
        assert_eq!(err.code(), "storage_error");
    }

    #[test]
    fn typed_errors_survive_anyhow() {
        let err: Error = anyhow::Error::new(Error::Canceled).into();
        assert_eq!(err, Error::Canceled);

        let orm = stratus_orm::Error::InvalidParameter {
            description: "filter is required".to_string(),
        };
        let err: Error = anyhow::Error::new(orm.clone()).into();
        assert_eq!(err, Error::Orm(orm));
        assert_eq!(err.code(), "invalid_parameter");
    }
}
