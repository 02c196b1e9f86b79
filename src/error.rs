//! Error taxonomy shared by registration, dispatch, and handlers.

use thiserror::Error;

use crate::http::StatusCode;

/// Errors produced by the routing core and by handlers.
///
/// Registration errors are returned synchronously and are expected to abort
/// start-up. Errors raised while a request is being handled are turned into
/// a status code with [`RestError::status`] and never escape the dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RestError {
    /// Null, empty, or malformed input, or a name over the length limits.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A fixed-size table (modules or patterns) is full.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// A buffer or table could not grow.
    #[error("allocation failure")]
    AllocationFailure,

    /// No module, pattern, method, segment, or query key matched.
    #[error("not found: {0}")]
    NotFound(String),

    /// Generic downstream failure.
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl RestError {
    /// Status a handler failure with this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BadRequest,
            Self::CapacityExceeded(_) => StatusCode::ServiceUnavailable,
            Self::AllocationFailure => StatusCode::InternalServerError,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::OperationFailed(_) => StatusCode::InternalServerError,
        }
    }

    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<std::collections::TryReserveError> for RestError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::AllocationFailure
    }
}

pub type RestResult<T> = Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(RestError::invalid("x").status(), StatusCode::BadRequest);
        assert_eq!(RestError::not_found("x").status(), StatusCode::NotFound);
        assert_eq!(
            RestError::AllocationFailure.status(),
            StatusCode::InternalServerError
        );
        assert_eq!(
            RestError::CapacityExceeded("modules").status(),
            StatusCode::ServiceUnavailable
        );
    }

    #[test]
    fn try_reserve_maps_to_allocation_failure() {
        let mut v: Vec<u8> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(RestError::from(err), RestError::AllocationFailure);
    }

    #[test]
    fn display_includes_detail() {
        let e = RestError::invalid("segment too long");
        assert_eq!(e.to_string(), "invalid argument: segment too long");
    }
}
