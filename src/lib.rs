//! pagesync: block-level synchronization of a remote paged store with local
//! snapshot files
//!
//! A push compares the local snapshot with a reference snapshot in fixed-size
//! blocks and writes only the blocks that changed. Pull, verification and
//! record backup/restore cover the remaining ways of moving a store's
//! content. The store itself is reached through the [`store::RemoteStore`]
//! capability, implemented over QUIC ([`network::QuicStoreClient`]) and
//! in-process ([`store::LocalClient`]).

pub mod auth;
pub mod config;
pub mod metrics;
pub mod network;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use auth::{Identity, Principal};
pub use store::{RemoteStore, StoreError};
pub use sync::{DiffSyncEngine, SyncConfig, SyncError, SyncReport};
