//! Remote store boundary
//!
//! Contracts for the object store (photo blobs) and record store
//! (habit/completion rows), with HTTP implementations for production and
//! in-memory implementations for tests and offline use.

pub mod memory;
pub mod object_store;
pub mod record_store;

pub use memory::{MemoryObjectStore, MemoryRecordStore};
pub use object_store::{HttpObjectStore, ObjectStore};
pub use record_store::{HttpRecordStore, RecordStore};
