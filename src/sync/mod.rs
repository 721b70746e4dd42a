//! Block-level snapshot synchronization
//!
//! A push partitions the local snapshot into fixed-size blocks, compares each
//! one with the same range of an optional reference snapshot and writes only
//! the blocks that changed. Pull, verification and record transfer cover the
//! other directions of moving a store's content.

pub mod engine;
pub mod error;
pub mod plan;
pub mod pull;
pub mod records;
pub mod state;
pub mod types;
pub mod verify;

pub use engine::DiffSyncEngine;
pub use error::{SyncError, SyncResult};
pub use plan::{BlockPlan, BlockRange};
pub use pull::{PullReport, SnapshotPuller};
pub use records::{backup_records, read_records_file, restore_records, write_records_file};
pub use state::{PassEvent, PassState, PassStateMachine};
pub use types::{BlockOutcome, SyncConfig, SyncEvent, SyncReport, DEFAULT_BLOCK_SIZE};
pub use verify::{SnapshotVerifier, VerifyReport};
