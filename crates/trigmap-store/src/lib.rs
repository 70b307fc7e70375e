//! # trigmap-store
//!
//! Data access layer for the trigger and map engines.
//!
//! This crate provides:
//! - the gateway traits the core consumes (`DataAccess`,
//!   `DependencyWriter`, `PermissionOracle`)
//! - `TriggerRelations`, the trigger → item → host join every consumer uses
//! - `MemoryStore`, the canonical in-memory implementation
//! - JSONL snapshot read/write and lock-scoped atomic mutation
//!
//! ## Data model
//!
//! ```text
//! JSONL snapshot (on disk, one kind-tagged record per line)
//!     ↕  load / save
//! MemoryStore (deterministic in-memory projection)
//!     ↓  DataAccess / PermissionOracle
//! trigger query engine, dependency resolver, map aggregator
//! ```

pub mod atomic_store;
pub mod error;
pub mod gateway;
pub mod jsonl;
pub mod memory;
pub mod relations;

pub use atomic_store::{AtomicStoreMutationError, mutate_store_jsonl, store_lock_path};
pub use error::StoreError;
pub use gateway::{
    DataAccess, DependencyWriter, EdgeDirection, HostFetch, ItemFetch, PermissionOracle,
    TriggerFetch,
};
pub use jsonl::{
    JsonlError, StoreRecord, read_records, read_records_from_path, write_records,
    write_records_to_path,
};
pub use memory::{MemoryStore, STORE_SNAPSHOT_REF_PREFIX, store_snapshot_ref};
pub use relations::{TriggerRelations, permitted_trigger_ids};
