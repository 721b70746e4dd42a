use crate::auth::Identity;
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::protocol::RequestEnvelope;
use crate::network::quic_transport::QuicTransport;
use crate::network::types::{ConnectionConfig, NetworkStats};
use crate::store::{RemoteStore, StoreRequest, StoreResponse, StoreResult};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use bytes::Bytes;
use quinn::Connection;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Authenticated [`RemoteStore`] over QUIC.
///
/// Each call is one request stream carrying the caller's bearer token. Failed
/// attempts are retried with exponential backoff on a fresh connection until
/// `max_retry_elapsed` runs out; every request is safe to repeat.
pub struct QuicStoreClient {
    transport: QuicTransport,
    remote_addr: SocketAddr,
    token: [u8; 32],
    connection: Mutex<Option<Connection>>,
}

impl QuicStoreClient {
    pub async fn connect(
        remote_addr: SocketAddr,
        identity: &Identity,
        config: ConnectionConfig,
    ) -> NetworkResult<Self> {
        let transport = QuicTransport::client(config)?;
        let client = Self {
            transport,
            remote_addr,
            token: *identity.token(),
            connection: Mutex::new(None),
        };

        client.connection().await?;
        debug!("Connected to store at {}", remote_addr);
        Ok(client)
    }

    /// Resolve `host:port` and connect to the first address
    pub async fn connect_host(
        host: &str,
        identity: &Identity,
        config: ConnectionConfig,
    ) -> NetworkResult<Self> {
        let remote_addr = tokio::net::lookup_host(host)
            .await
            .map_err(|e| NetworkError::InvalidAddress(format!("{host}: {e}")))?
            .next()
            .ok_or_else(|| NetworkError::InvalidAddress(format!("{host}: no addresses")))?;

        Self::connect(remote_addr, identity, config).await
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn stats(&self) -> NetworkStats {
        self.transport.stats()
    }

    pub fn close(&self) {
        self.transport.close();
    }

    async fn connection(&self) -> NetworkResult<Connection> {
        let mut slot = self.connection.lock().await;

        if let Some(conn) = slot.as_ref() {
            if conn.close_reason().is_none() {
                return Ok(conn.clone());
            }
            self.transport.forget(conn);
        }

        let conn = self.transport.connect(self.remote_addr).await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn drop_connection(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.close(0u32.into(), b"retry");
            self.transport.forget(&conn);
        }
    }

    async fn attempt(&self, envelope: &RequestEnvelope) -> NetworkResult<StoreResponse> {
        let conn = self.connection().await?;
        let timeout = self.transport.config().request_timeout;

        tokio::time::timeout(timeout, self.transport.request(&conn, envelope))
            .await
            .map_err(|_| NetworkError::Timeout(timeout))?
    }

    async fn execute(&self, body: StoreRequest) -> NetworkResult<StoreResponse> {
        let envelope = RequestEnvelope {
            token: self.token,
            body,
        };

        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(self.transport.config().max_retry_elapsed),
            ..Default::default()
        };
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.attempt(&envelope).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            "{} request failed, retrying in {:?}: {}",
                            envelope.body.name(),
                            duration,
                            e
                        );
                        self.transport.record_retry();
                        self.drop_connection().await;
                        tokio::time::sleep(duration).await;
                    }
                    None => {
                        return Err(NetworkError::MaxRetriesExceeded {
                            attempts,
                            last_error: e.to_string(),
                        })
                    }
                },
            }
        }
    }
}

#[async_trait]
impl RemoteStore for QuicStoreClient {
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
