use crate::store::error::StoreResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Capability set of an authenticated remote store client.
///
/// Implementations authenticate every call themselves; callers only see the
/// four primitives.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Current total byte length of the store
    async fn size(&self) -> StoreResult<u64>;

    /// Exactly `length` bytes starting at `offset`
    async fn read_range(&self, offset: u64, length: u64) -> StoreResult<Bytes>;

    /// Overwrite `[offset, offset + data.len())`; atomic per call
    async fn write_range(&self, offset: u64, data: Bytes) -> StoreResult<()>;

    /// Generic method call with bincode-encoded arguments and reply
    async fn call(&self, method: &str, args: Vec<u8>) -> StoreResult<Vec<u8>>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<T> {
    async fn size(&self) -> StoreResult<u64> {
        (**self).size().await
    }

    async fn read_range(&self, offset: u64, length: u64) -> StoreResult<Bytes> {
        (**self).read_range(offset, length).await
    }

    async fn write_range(&self, offset: u64, data: Bytes) -> StoreResult<()> {
        (**self).write_range(offset, data).await
    }

    async fn call(&self, method: &str, args: Vec<u8>) -> StoreResult<Vec<u8>> {
        (**self).call(method, args).await
    }
}
