//! Wire format: one request and one response per bidirectional stream, each
//! a `u32` big-endian length followed by a bincode body

use crate::network::error::{NetworkError, NetworkResult};
use crate::store::StoreRequest;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame body (256 MiB)
pub const MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

/// Largest block payload that still fits a frame next to the envelope fields
pub const MAX_BLOCK_LEN: u64 = MAX_FRAME_LEN - 4096;

/// A request as sent by a client: bearer token plus the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub token: [u8; 32],
    pub body: StoreRequest,
}

/// Write one frame; returns the number of bytes put on the wire
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> NetworkResult<usize>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(value)?;
    if body.len() as u64 > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge {
            len: body.len() as u64,
            max: MAX_FRAME_LEN,
        });
    }

    writer
        .write_u32(body.len() as u32)
        .await
        .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
    writer
        .write_all(&body)
        .await
        .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

    Ok(body.len() + 4)
}

/// Read one frame; returns the value and the number of bytes consumed
pub async fn read_frame<R, T>(reader: &mut R) -> NetworkResult<(T, usize)>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader
        .read_u32()
        .await
        .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))? as u64;

    if len > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

    Ok((bincode::deserialize(&body)?, body.len() + 4))
}
