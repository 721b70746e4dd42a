//! Remote paged store: client capability, host service and backing memory

pub mod calls;
pub mod client;
pub mod error;
pub mod local;
pub mod memory;
pub mod service;
pub mod types;

pub use client::RemoteStore;
pub use error::{StoreError, StoreResult};
pub use local::LocalClient;
pub use memory::{FilePages, InMemoryPages, PageMemory};
pub use service::StoreService;
pub use types::{
    methods, pages_for, ErrorKind, Profile, Record, StoreRequest, StoreResponse, PAGE_SIZE,
};
