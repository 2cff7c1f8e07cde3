use std::fmt;

use remrpc_identity::CorrelationId;
use remrpc_network::TransportError;
use thiserror::Error;

/// Error code carried by an `error` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unregistered,
    CallFailed,
    Protocol,
    Retval,
    /// Code not known locally, kept verbatim.
    Other(i64),
}

impl ErrorCode {
    pub fn as_i64(&self) -> i64 {
        match self {
            ErrorCode::Unregistered => 1,
            ErrorCode::CallFailed => 2,
            ErrorCode::Protocol => 3,
            ErrorCode::Retval => 4,
            ErrorCode::Other(code) => *code,
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(value: i64) -> Self {
        match value {
            1 => ErrorCode::Unregistered,
            2 => ErrorCode::CallFailed,
            3 => ErrorCode::Protocol,
            4 => ErrorCode::Retval,
            code => ErrorCode::Other(code),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Outcome of a failed call, as seen by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Call timed out")]
    Timeout,
    #[error("Call error ({code}): {detail}")]
    CallError { code: ErrorCode, detail: String },
    #[error("Return value error: {0}")]
    RetvalError(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Engine closed")]
    Closed,
    /// Arguments could not be converted before sending, nothing was published.
    #[error("Invalid call arguments: {0}")]
    InvalidArgument(String),
}

impl RpcError {
    /// Remote error code, only for [`RpcError::CallError`].
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RpcError::CallError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unpack error: {0}")]
    Unpack(String),
    #[error("Envelope is not an array")]
    NotArray,
    #[error("Unknown envelope tag {0:?}")]
    UnknownTag(String),
    #[error("Missing field {0}")]
    MissingField(&'static str),
    #[error("Invalid field {0}")]
    InvalidField(&'static str),
    /// `reply` or `error` with a valid serial but broken content, its waiter should still be woken.
    #[error("Malformed {field} in answer {serial}")]
    MalformedAnswer { serial: CorrelationId, field: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Function {0} not registered")]
    NotFound(String),
}

/// Failure raised while running a registered function. Every variant is reported to the caller as `CallFailed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("missing positional argument {0}")]
    MissingArgument(usize),
    #[error("takes {expected} positional arguments but {got} were given")]
    ArityMismatch { expected: usize, got: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Failed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed<E: fmt::Display>(err: E) -> Self {
        HandlerError::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, HandlerError, RpcError};

    #[test]
    fn error_code_should_keep_unknown_codes() {
        for code in 1..=4 {
            assert_eq!(ErrorCode::from(code).as_i64(), code);
        }
        assert_eq!(ErrorCode::from(1), ErrorCode::Unregistered);
        assert_eq!(ErrorCode::from(42), ErrorCode::Other(42));
        assert_eq!(ErrorCode::Other(-7).as_i64(), -7);
    }

    #[test]
    fn rpc_error_should_expose_code() {
        let err = RpcError::CallError {
            code: ErrorCode::CallFailed,
            detail: "boom".to_string(),
        };
        assert_eq!(err.code(), Some(ErrorCode::CallFailed));
        assert_eq!(err.to_string(), "Call error (2): boom");
        assert_eq!(RpcError::Timeout.code(), None);
    }

    #[test]
    fn handler_error_should_describe_failure() {
        assert_eq!(HandlerError::ArityMismatch { expected: 2, got: 3 }.to_string(), "takes 2 positional arguments but 3 were given");
        assert_eq!(HandlerError::failed("division by zero").to_string(), "division by zero");
    }
}
