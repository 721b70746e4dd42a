use crate::store::error::{StoreError, StoreResult};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Allocation unit of the store host (64 KiB)
pub const PAGE_SIZE: u64 = 65536;

/// Number of whole pages needed to hold `len` bytes
pub fn pages_for(len: u64) -> u64 {
    len.div_ceil(PAGE_SIZE)
}

/// Names accepted by the generic `call` primitive
pub mod methods {
    pub const BACKUP: &str = "backup";
    pub const RESTORE: &str = "restore";
    pub const AUTHORIZE: &str = "authorize";
    pub const STABLE_AUTHORIZE: &str = "stable_authorize";
    pub const DEAUTHORIZE: &str = "deauthorize";
    pub const GET_AUTHORIZED: &str = "get_authorized";
    pub const WHOAMI: &str = "whoami";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub updated_time_msecs: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

/// A structured record keyed by principal text
pub type Record = (String, Profile);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRequest {
    Size,
    Read { offset: u64, length: u64 },
    Write { offset: u64, data: Bytes },
    Call { method: String, args: Vec<u8> },
}

impl StoreRequest {
    pub fn name(&self) -> &str {
        match self {
            StoreRequest::Size => "size",
            StoreRequest::Read { .. } => "read",
            StoreRequest::Write { .. } => "write",
            StoreRequest::Call { method, .. } => method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotAuthorized,
    OutOfBounds,
    CapacityExceeded,
    UnknownMethod,
    InvalidArguments,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreResponse {
    Size(u64),
    Data(Bytes),
    Ack,
    Reply(Vec<u8>),
    Error { kind: ErrorKind, message: String },
}

impl StoreResponse {
    pub fn from_error(err: &StoreError) -> Self {
        StoreResponse::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn into_size(self) -> StoreResult<u64> {
        match self {
            StoreResponse::Size(size) => Ok(size),
            other => Err(other.unexpected("size")),
        }
    }

    pub fn into_data(self) -> StoreResult<Bytes> {
        match self {
            StoreResponse::Data(data) => Ok(data),
            other => Err(other.unexpected("data")),
        }
    }

    pub fn into_ack(self) -> StoreResult<()> {
        match self {
            StoreResponse::Ack => Ok(()),
            other => Err(other.unexpected("ack")),
        }
    }

    pub fn into_reply(self) -> StoreResult<Vec<u8>> {
        match self {
            StoreResponse::Reply(reply) => Ok(reply),
            other => Err(other.unexpected("reply")),
        }
    }

    fn unexpected(self, expected: &'static str) -> StoreError {
        match self {
            StoreResponse::Error { kind, message } => StoreError::from_remote(kind, message),
            other => StoreError::UnexpectedResponse {
                expected,
                actual: other.variant_name().to_string(),
            },
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            StoreResponse::Size(_) => "size",
            StoreResponse::Data(_) => "data",
            StoreResponse::Ack => "ack",
            StoreResponse::Reply(_) => "reply",
            StoreResponse::Error { .. } => "error",
        }
    }
}

/// Encode `call` arguments or replies
pub fn encode<T: Serialize + ?Sized>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Decode `call` arguments or replies
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(bincode::deserialize(bytes)?)
}
