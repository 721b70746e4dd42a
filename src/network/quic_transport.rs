use crate::network::error::{NetworkError, NetworkResult};
use crate::network::protocol::{read_frame, write_frame, RequestEnvelope};
use crate::network::types::{ConnectionConfig, NetworkStats};
use crate::store::StoreResponse;
use dashmap::DashMap;
use quinn::{Connection, Endpoint, Incoming, RecvStream, SendStream, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;

pub struct QuicTransport {
    endpoint: Endpoint,
    config: ConnectionConfig,
    connections: Arc<DashMap<SocketAddr, Connection>>,
    stats: Arc<parking_lot::RwLock<NetworkStats>>,
    /// DER of the self-signed certificate, server endpoints only
    certificate_der: Option<Vec<u8>>,
}

impl QuicTransport {
    /// Listening endpoint with a freshly generated self-signed certificate
    pub fn server(config: ConnectionConfig) -> NetworkResult<Self> {
        let (endpoint, cert_der) = Self::make_server_endpoint(&config)?;

        Ok(Self {
            endpoint,
            config,
            connections: Arc::new(DashMap::new()),
            stats: Arc::new(parking_lot::RwLock::new(NetworkStats::default())),
            certificate_der: Some(cert_der),
        })
    }

    /// Outgoing-only endpoint
    pub fn client(config: ConnectionConfig) -> NetworkResult<Self> {
        if config.insecure_skip_verify {
            tracing::warn!(
                "SECURITY WARNING: TLS certificate verification is DISABLED. \
                 Only use this against a test server with a self-signed certificate."
            );
        }

        let endpoint = Self::make_client_endpoint(&config)?;

        Ok(Self {
            endpoint,
            config,
            connections: Arc::new(DashMap::new()),
            stats: Arc::new(parking_lot::RwLock::new(NetworkStats::default())),
            certificate_der: None,
        })
    }

    fn transport_config(config: &ConnectionConfig) -> NetworkResult<quinn::TransportConfig> {
        let idle_timeout = quinn::IdleTimeout::try_from(config.max_idle_timeout)
            .map_err(|e| NetworkError::QuicError(e.to_string()))?;

        let mut transport_config = quinn::TransportConfig::default();
        transport_config
            .max_concurrent_bidi_streams(config.max_concurrent_streams.into())
            .max_concurrent_uni_streams(0_u8.into())
            .max_idle_timeout(Some(idle_timeout))
            .keep_alive_interval(Some(config.keep_alive_interval));

        Ok(transport_config)
    }

    fn make_server_endpoint(config: &ConnectionConfig) -> NetworkResult<(Endpoint, Vec<u8>)> {
        let cert = rcgen::generate_simple_self_signed(vec![config.server_name.clone()])
            .map_err(|e| NetworkError::CertificateError(e.to_string()))?;
        let cert_der = cert.cert.der().to_vec();
        let priv_key = rustls::pki_types::PrivateKeyDer::try_from(cert.key_pair.serialize_der())
            .map_err(|e| NetworkError::CertificateError(e.to_string()))?;

        let mut server_config = ServerConfig::with_single_cert(
            vec![rustls::pki_types::CertificateDer::from(cert_der.clone())],
            priv_key,
        )
        .map_err(|e| NetworkError::CertificateError(e.to_string()))?;
        server_config.transport_config(Arc::new(Self::transport_config(config)?));

        let endpoint = Endpoint::server(server_config, config.bind_addr)
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok((endpoint, cert_der))
    }

    /// Insecure mode accepts any certificate; otherwise the configured extra
    /// certificate plus system roots (webpki roots as fallback) are trusted
    fn make_client_endpoint(config: &ConnectionConfig) -> NetworkResult<Endpoint> {
        let mut endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        let crypto = if config.insecure_skip_verify {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
                .with_no_client_auth()
        } else {
            let mut root_store = rustls::RootCertStore::empty();

            if let Some(der) = &config.trusted_cert_der {
                root_store
                    .add(rustls::pki_types::CertificateDer::from(der.clone()))
                    .map_err(|e| NetworkError::CertificateError(e.to_string()))?;
            }

            match rustls_native_certs::load_native_certs() {
                Ok(certs) => {
                    for cert in certs {
                        if let Err(e) = root_store.add(cert) {
                            tracing::warn!("Failed to add certificate to root store: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load native certificates: {}. Using webpki roots.",
                        e
                    );
                }
            }

            if root_store.is_empty() {
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }

            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        let mut client_config = quinn::ClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
                .map_err(|e| NetworkError::CertificateError(e.to_string()))?,
        ));
        client_config.transport_config(Arc::new(Self::transport_config(config)?));
        endpoint.set_default_client_config(client_config);

        Ok(endpoint)
    }

    pub async fn connect(&self, remote_addr: SocketAddr) -> NetworkResult<Connection> {
        let conn = self
            .endpoint
            .connect(remote_addr, &self.config.server_name)?
            .await?;

        self.track(conn.clone());
        Ok(conn)
    }

    /// Next incoming connection attempt; `None` once the endpoint is closed
    pub async fn accept_incoming(&self) -> Option<Incoming> {
        self.endpoint.accept().await
    }

    /// Finish the handshake of an incoming connection
    pub async fn establish(&self, incoming: Incoming) -> NetworkResult<Connection> {
        let conn = incoming.await?;
        self.track(conn.clone());
        Ok(conn)
    }

    pub async fn accept(&self) -> NetworkResult<Connection> {
        let incoming = self
            .accept_incoming()
            .await
            .ok_or_else(|| NetworkError::ConnectionClosed("Endpoint closed".into()))?;
        self.establish(incoming).await
    }

    fn track(&self, conn: Connection) {
        self.connections.insert(conn.remote_address(), conn);
        self.stats.write().active_connections = self.connections.len();
    }

    pub fn forget(&self, conn: &Connection) {
        self.connections.remove(&conn.remote_address());
        self.stats.write().active_connections = self.connections.len();
    }

    /// One request/response exchange on a new bidirectional stream
    pub async fn request(
        &self,
        conn: &Connection,
        envelope: &RequestEnvelope,
    ) -> NetworkResult<StoreResponse> {
        let (mut send, mut recv) = conn.open_bi().await?;

        let sent = write_frame(&mut send, envelope).await?;
        send.finish()
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        let (response, received) = read_frame(&mut recv).await?;

        {
            let mut stats = self.stats.write();
            stats.total_bytes_sent += sent as u64;
            stats.total_bytes_received += received as u64;
            stats.requests_sent += 1;
        }

        Ok(response)
    }

    /// Read the request frame of an accepted stream
    pub async fn receive_request(&self, recv: &mut RecvStream) -> NetworkResult<RequestEnvelope> {
        let (envelope, received) = read_frame(recv).await?;
        self.stats.write().total_bytes_received += received as u64;
        Ok(envelope)
    }

    /// Answer an accepted stream and close our side
    pub async fn send_response(
        &self,
        send: &mut SendStream,
        response: &StoreResponse,
    ) -> NetworkResult<()> {
        let sent = write_frame(send, response).await?;
        send.finish()
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        let mut stats = self.stats.write();
        stats.total_bytes_sent += sent as u64;
        stats.requests_served += 1;
        Ok(())
    }

    pub(crate) fn record_retry(&self) {
        self.stats.write().retransmissions += 1;
    }

    pub fn local_addr(&self) -> NetworkResult<SocketAddr> {
        self.endpoint.local_addr().map_err(NetworkError::IoError)
    }

    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.certificate_der.as_deref()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats.read().clone()
    }

    pub fn close(&self) {
        for entry in self.connections.iter() {
            entry.value().close(0u32.into(), b"closing");
        }
        self.connections.clear();
        self.endpoint.close(0u32.into(), b"shutdown");
    }

    /// Wait until every connection has been closed cleanly
    pub async fn wait_idle(&self) {
        self.endpoint.wait_idle().await;
    }
}

impl Drop for QuicTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// Accepts any certificate. Testing only.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
