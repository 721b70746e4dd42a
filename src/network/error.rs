use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("QUIC error: {0}")]
    QuicError(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Max retries exceeded ({attempts} attempts): {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl NetworkError {
    /// Whether a fresh attempt on a new connection might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetworkError::ConnectionFailed(_)
                | NetworkError::ConnectionClosed(_)
                | NetworkError::SendFailed(_)
                | NetworkError::ReceiveFailed(_)
                | NetworkError::Timeout(_)
                | NetworkError::IoError(_)
                | NetworkError::QuicError(_)
        )
    }
}

impl From<quinn::ConnectionError> for NetworkError {
    fn from(err: quinn::ConnectionError) -> Self {
        NetworkError::QuicError(err.to_string())
    }
}

impl From<quinn::ConnectError> for NetworkError {
    fn from(err: quinn::ConnectError) -> Self {
        NetworkError::ConnectionFailed(err.to_string())
    }
}

impl From<quinn::WriteError> for NetworkError {
    fn from(err: quinn::WriteError) -> Self {
        NetworkError::SendFailed(err.to_string())
    }
}

impl From<quinn::ReadError> for NetworkError {
    fn from(err: quinn::ReadError) -> Self {
        NetworkError::ReceiveFailed(err.to_string())
    }
}

impl From<bincode::Error> for NetworkError {
    fn from(err: bincode::Error) -> Self {
        NetworkError::SerializationError(err.to_string())
    }
}

impl From<NetworkError> for StoreError {
    fn from(err: NetworkError) -> Self {
        StoreError::Transport(err.to_string())
    }
}

pub type NetworkResult<T> = Result<T, NetworkError>;
