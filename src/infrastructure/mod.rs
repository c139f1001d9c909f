//! Storage backends and fixture-backed collaborators.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
