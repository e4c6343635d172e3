use crate::Error;
use thiserror::Error;

/// Distinguishable failure kinds raised by the core.
///
/// Backend and driver failures are not wrapped: they travel as plain [`Error`] values with
/// context attached, so `downcast_ref::<OrmError>()` returning `None` means "backend I/O".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Bad model tags, duplicate columns, missing primary key, unknown alias.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller broke a contract of the API (arity, unknown field, empty batch condition...).
    #[error("usage error: {0}")]
    Usage(String),

    /// A read of exactly one record matched nothing.
    #[error("no row found")]
    NotFound,

    /// A primary key value was required but the record holds the zero value.
    #[error("missing primary key value for model `{0}`")]
    MissingPrimaryKey(String),

    #[error("cannot convert value `{value}` for field `{field}`: {reason}")]
    Conversion {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse classification of an [`Error`] returned by any operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Usage,
    NotFound,
    Conversion,
    Backend,
}

impl OrmError {
    pub fn config(message: impl Into<String>) -> Error {
        Self::Config(message.into()).into()
    }

    pub fn usage(message: impl Into<String>) -> Error {
        Self::Usage(message.into()).into()
    }

    pub fn conversion(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Error {
        Self::Conversion {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrmError::Config(..) => ErrorKind::Config,
            OrmError::Usage(..) | OrmError::MissingPrimaryKey(..) => ErrorKind::Usage,
            OrmError::NotFound => ErrorKind::NotFound,
            OrmError::Conversion { .. } => ErrorKind::Conversion,
        }
    }

    /// Classify any error, looking through the context chain.
    pub fn kind_of(error: &Error) -> ErrorKind {
        error
            .chain()
            .find_map(|e| e.downcast_ref::<OrmError>())
            .map(OrmError::kind)
            .unwrap_or(ErrorKind::Backend)
    }

    pub fn is_not_found(error: &Error) -> bool {
        Self::kind_of(error) == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_context() {
        let error = Err::<(), _>(OrmError::usage("operator `between` needs 2 values, got 3"))
            .context("While compiling the condition")
            .unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Usage);
        assert_eq!(
            OrmError::kind_of(&Error::msg("connection reset")),
            ErrorKind::Backend
        );
        assert!(OrmError::is_not_found(&OrmError::NotFound.into()));
    }
}
