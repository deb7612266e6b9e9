//! # Infrastructure Adapters
//!
//! Infrastructure implementations of the pipeline's cache capability.

pub mod memory_cache_store;

pub use memory_cache_store::InMemoryCacheStore;
