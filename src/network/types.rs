use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub bind_addr: SocketAddr,
    pub max_idle_timeout: Duration,
    pub keep_alive_interval: Duration,
    /// Concurrent request streams per connection
    pub max_concurrent_streams: u32,
    /// Name presented in the TLS handshake and put in the server certificate
    pub server_name: String,
    /// Accept any server certificate (testing with self-signed certs only)
    pub insecure_skip_verify: bool,
    /// Extra DER certificate trusted by the client, e.g. a server's self-signed one
    pub trusted_cert_der: Option<Vec<u8>>,
    /// Deadline for one request attempt
    pub request_timeout: Duration,
    /// Total time the client keeps retrying a failed request
    pub max_retry_elapsed: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            max_idle_timeout: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(5),
            max_concurrent_streams: 100,
            server_name: "localhost".to_string(),
            insecure_skip_verify: false,
            trusted_cert_der: None,
            request_timeout: Duration::from_secs(30),
            max_retry_elapsed: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub requests_sent: u64,
    pub requests_served: u64,
    pub retransmissions: u64,
    pub active_connections: usize,
}
