#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pagesync::auth::Principal;
use pagesync::store::{
    InMemoryPages, LocalClient, RemoteStore, StoreError, StoreResult, StoreService,
};
use parking_lot::Mutex;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const MIB: u64 = 1 << 20;

type WriteHook = Box<dyn Fn(u64) + Send + Sync>;

/// In-memory store that records every write call and can inject failures
pub struct RecordingStore {
    inner: LocalClient,
    writes: Mutex<Vec<(u64, u64)>>,
    size_calls: AtomicU64,
    fail_write_at: Option<u64>,
    fail_size: bool,
    on_write: Option<WriteHook>,
}

impl RecordingStore {
    pub fn new() -> Self {
        let owner = Principal::from_token(&[42u8; 32]);
        let service = Arc::new(StoreService::new(InMemoryPages::new()).with_controller(owner));
        Self {
            inner: LocalClient::new(service, owner),
            writes: Mutex::new(Vec::new()),
            size_calls: AtomicU64::new(0),
            fail_write_at: None,
            fail_size: false,
            on_write: None,
        }
    }

    /// Reject the write that starts at `offset`
    pub fn failing_write_at(mut self, offset: u64) -> Self {
        self.fail_write_at = Some(offset);
        self
    }

    pub fn failing_size(mut self) -> Self {
        self.fail_size = true;
        self
    }

    /// Run `hook` after each successful write
    pub fn on_write(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_write = Some(Box::new(hook));
        self
    }

    /// `(offset, length)` of every write attempt, in call order
    pub fn writes(&self) -> Vec<(u64, u64)> {
        self.writes.lock().clone()
    }

    pub fn size_calls(&self) -> u64 {
        self.size_calls.load(Ordering::SeqCst)
    }

    pub fn service(&self) -> &Arc<StoreService> {
        self.inner.service()
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    async fn size(&self) -> StoreResult<u64> {
        self.size_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_size {
            return Err(StoreError::Transport("size unavailable".into()));
        }
        self.inner.size().await
    }

    async fn read_range(&self, offset: u64, length: u64) -> StoreResult<Bytes> {
        self.inner.read_range(offset, length).await
    }

    async fn write_range(&self, offset: u64, data: Bytes) -> StoreResult<()> {
        self.writes.lock().push((offset, data.len() as u64));
        if self.fail_write_at == Some(offset) {
            return Err(StoreError::Transport("connection reset".into()));
        }
        self.inner.write_range(offset, data).await?;
        if let Some(hook) = &self.on_write {
            hook(offset);
        }
        Ok(())
    }

    async fn call(&self, method: &str, args: Vec<u8>) -> StoreResult<Vec<u8>> {
        self.inner.call(method, args).await
    }
}

/// Deterministic pseudo-random bytes
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

pub fn init_crypto() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
