//! Write bandwidth throttling using the governor crate

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Caps the rate at which block payloads are handed to the remote store.
///
/// Budget is tracked in 1 KiB units.
pub struct WriteThrottle {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    bytes_per_second: u64,
}

impl WriteThrottle {
    /// `bytes_per_second == 0` means unlimited
    pub fn new(bytes_per_second: u64) -> Self {
        if bytes_per_second == 0 {
            return Self::unlimited();
        }

        let kb_per_second = (bytes_per_second / 1024).clamp(1, u32::MAX as u64) as u32;
        let quota = Quota::per_second(NonZeroU32::new(kb_per_second).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: Some(Arc::new(RateLimiter::direct(quota))),
            bytes_per_second,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            bytes_per_second: 0,
        }
    }

    pub fn from_limit(limit: Option<u64>) -> Self {
        limit.map(Self::new).unwrap_or_else(Self::unlimited)
    }

    /// Wait until `bytes` more may be sent
    pub async fn wait_for_bytes(&self, bytes: u64) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let kb_units = bytes.div_ceil(1024).max(1);
        for _ in 0..kb_units {
            limiter.until_ready().await;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }
}

impl Default for WriteThrottle {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl Clone for WriteThrottle {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            bytes_per_second: self.bytes_per_second,
        }
    }
}
