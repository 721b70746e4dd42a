use crate::auth::Principal;
use crate::store::client::RemoteStore;
use crate::store::error::{StoreError, StoreResult};
use crate::store::service::StoreService;
use crate::store::types::{StoreRequest, StoreResponse};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// In-process client for a [`StoreService`], acting as `caller`
#[derive(Clone)]
pub struct LocalClient {
    service: Arc<StoreService>,
    caller: Principal,
}

impl LocalClient {
    pub fn new(service: Arc<StoreService>, caller: Principal) -> Self {
        Self { service, caller }
    }

    pub fn service(&self) -> &Arc<StoreService> {
        &self.service
    }

    async fn execute(&self, request: StoreRequest) -> StoreResult<StoreResponse> {
        let service = self.service.clone();
        let caller = self.caller;
        tokio::task::spawn_blocking(move || service.handle(&caller, request))
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for LocalClient {
    async fn size(&self) -> StoreResult<u64> {
        self.execute(StoreRequest::Size).await?.into_size()
    }

    async fn read_range(&self, offset: u64, length: u64) -> StoreResult<Bytes> {
        self.execute(StoreRequest::Read { offset, length })
            .await?
            .into_data()
    }

    async fn write_range(&self, offset: u64, data: Bytes) -> StoreResult<()> {
        self.execute(StoreRequest::Write { offset, data })
            .await?
            .into_ack()
    }

    async fn call(&self, method: &str, args: Vec<u8>) -> StoreResult<Vec<u8>> {
        self.execute(StoreRequest::Call {
            method: method.to_string(),
            args,
        })
        .await?
        .into_reply()
    }
}
