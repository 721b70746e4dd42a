pub mod client;
pub mod error;
pub mod protocol;
pub mod quic_transport;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use client::QuicStoreClient;
pub use error::{NetworkError, NetworkResult};
pub use protocol::{RequestEnvelope, MAX_BLOCK_LEN, MAX_FRAME_LEN};
pub use quic_transport::QuicTransport;
pub use rate_limiter::WriteThrottle;
pub use server::StoreServer;
pub use types::{ConnectionConfig, NetworkStats};
