//! Error types for bridge operations

use crate::status::Status;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// An exception thrown into managed code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Exception {
    /// Human-readable message
    pub message: String,
    /// Optional machine-readable code (e.g. `ERR_NAPI_...`)
    pub code: Option<String>,
}

impl Exception {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Bridge operation failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Plain status failure (argument or type-expectation errors, etc.)
    #[error("{0}")]
    Status(Status),

    /// The host runtime lacks `FinalizationRegistry` / `WeakRef`
    #[error("{api}: The current runtime does not support \"FinalizationRegistry\" and \"WeakRef\". {detail}")]
    WeakRefUnsupported {
        /// Entry point that was called
        api: &'static str,
        /// What the caller must change
        detail: &'static str,
    },

    /// The host runtime lacks `BigInt`
    #[error("{api}: The current runtime does not support \"BigInt\". {detail}")]
    BigIntUnsupported {
        /// Entry point that was called
        api: &'static str,
        /// What the caller must change
        detail: &'static str,
    },

    /// Managed code threw
    #[error(transparent)]
    Thrown(#[from] Exception),
}

impl BridgeError {
    /// Status reported through the last-error slot
    pub fn status(&self) -> Status {
        match self {
            BridgeError::Status(status) => *status,
            BridgeError::WeakRefUnsupported { .. }
            | BridgeError::BigIntUnsupported { .. }
            | BridgeError::Thrown(_) => Status::PendingException,
        }
    }

    /// Exception to leave pending in the context, if this failure raises one
    pub fn to_exception(&self) -> Option<Exception> {
        match self {
            BridgeError::Status(_) => None,
            BridgeError::Thrown(exception) => Some(exception.clone()),
            other => Some(Exception::new(other.to_string())),
        }
    }
}

impl From<Status> for BridgeError {
    fn from(status: Status) -> Self {
        BridgeError::Status(status)
    }
}

/// Failures reported by a host runtime implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The runtime does not provide the requested primitive
    #[error("{0} is not supported by this runtime")]
    Unsupported(&'static str),

    /// The runtime refused the request (e.g. zero-copy not possible)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The target object no longer exists
    #[error("Object {0} has been collected")]
    Collected(u64),

    /// Managed code threw while servicing the request
    #[error("Uncaught exception: {0}")]
    Exception(Exception),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display_uses_table() {
        let err = BridgeError::from(Status::ObjectExpected);
        assert_eq!(err.to_string(), "An object was expected");
        assert_eq!(err.status(), Status::ObjectExpected);
        assert!(err.to_exception().is_none());
    }

    #[test]
    fn test_capability_errors_raise_exceptions() {
        let err = BridgeError::WeakRefUnsupported {
            api: "napi_add_finalizer",
            detail: "This API is unavailable",
        };
        assert_eq!(err.status(), Status::PendingException);

        let exception = err.to_exception().unwrap();
        assert!(exception.message.starts_with("napi_add_finalizer: The current runtime"));
        assert!(exception.message.ends_with("This API is unavailable"));
    }

    #[test]
    fn test_thrown_passes_exception_through() {
        let exception = Exception::new("boom").with_code("ERR_TEST");
        let err = BridgeError::from(exception.clone());
        assert_eq!(err.status(), Status::PendingException);
        assert_eq!(err.to_exception(), Some(exception));
        assert_eq!(err.to_string(), "boom");
    }
}
