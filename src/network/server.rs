use crate::auth::Principal;
use crate::metrics::recorder;
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::quic_transport::QuicTransport;
use crate::network::types::{ConnectionConfig, NetworkStats};
use crate::store::{StoreError, StoreResponse, StoreService};
use quinn::{Connection, RecvStream, SendStream};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Serves a [`StoreService`] to QUIC clients
pub struct StoreServer {
    transport: Arc<QuicTransport>,
    service: Arc<StoreService>,
}

impl StoreServer {
    pub fn bind(config: ConnectionConfig, service: Arc<StoreService>) -> NetworkResult<Self> {
        let transport = Arc::new(QuicTransport::server(config)?);
        Ok(Self { transport, service })
    }

    pub fn local_addr(&self) -> NetworkResult<SocketAddr> {
        self.transport.local_addr()
    }

    /// DER of the server's self-signed certificate
    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.transport.certificate_der()
    }

    pub fn stats(&self) -> NetworkStats {
        self.transport.stats()
    }

    /// Accept connections until `shutdown` resolves, then flush the store
    pub async fn serve<F>(&self, shutdown: F) -> NetworkResult<()>
    where
        F: Future<Output = ()>,
    {
        info!("Store server listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                incoming = self.transport.accept_incoming() => {
                    let Some(incoming) = incoming else {
                        break;
                    };

                    let transport = self.transport.clone();
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        match transport.establish(incoming).await {
                            Ok(conn) => handle_connection(transport, service, conn).await,
                            Err(e) => warn!("Handshake failed: {}", e),
                        }
                    });
                }
            }
        }

        self.transport.close();
        self.service
            .flush()
            .map_err(|e| NetworkError::IoError(std::io::Error::other(e.to_string())))?;
        Ok(())
    }
}

async fn handle_connection(
    transport: Arc<QuicTransport>,
    service: Arc<StoreService>,
    conn: Connection,
) {
    let peer = conn.remote_address();
    debug!("Connection from {}", peer);
    recorder::set_active_connections(transport.stats().active_connections);

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let transport = transport.clone();
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_stream(&transport, service, send, recv).await {
                        warn!("Request from {} failed: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                debug!("Connection from {} closed: {}", peer, e);
                break;
            }
        }
    }

    transport.forget(&conn);
    recorder::set_active_connections(transport.stats().active_connections);
}

async fn handle_stream(
    transport: &QuicTransport,
    service: Arc<StoreService>,
    mut send: SendStream,
    mut recv: RecvStream,
) -> NetworkResult<()> {
    let envelope = transport.receive_request(&mut recv).await?;
    let caller = Principal::from_token(&envelope.token);
    let method = envelope.body.name().to_string();
    let start = Instant::now();

    let handler = service.clone();
    let response = tokio::task::spawn_blocking(move || handler.handle(&caller, envelope.body))
        .await
        .unwrap_or_else(|e| {
            StoreResponse::from_error(&StoreError::Remote(format!("handler panicked: {e}")))
        });

    let ok = !matches!(response, StoreResponse::Error { .. });
    recorder::record_request_served(&method, ok, start.elapsed());
    if method == "write" && ok {
        recorder::set_store_size(service.size());
    }
    debug!("{} {} from {}", method, if ok { "ok" } else { "error" }, caller);

    transport.send_response(&mut send, &response).await
}
