use crate::store::types::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Range out of bounds: offset {offset} + length {length} exceeds store size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("Store capacity exceeded: {requested} pages requested, limit is {limit}")]
    CapacityExceeded { requested: u64, limit: u64 },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: String,
    },

    #[error("Short read: requested {requested} bytes at offset {offset}, got {actual}")]
    ShortRead {
        offset: u64,
        requested: u64,
        actual: u64,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Classify for the wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            StoreError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            StoreError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            StoreError::UnknownMethod(_) => ErrorKind::UnknownMethod,
            StoreError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            _ => ErrorKind::Internal,
        }
    }

    /// Rebuild an error received from a remote host
    pub fn from_remote(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotAuthorized => StoreError::NotAuthorized(message),
            ErrorKind::UnknownMethod => StoreError::UnknownMethod(message),
            _ => StoreError::Remote(format!("{kind:?}: {message}")),
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
