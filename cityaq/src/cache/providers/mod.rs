//! Backing store implementations.
//!
//! - [`MemoryCacheProvider`]: bounded in-memory store using moka
//! - [`DiskCacheProvider`]: durable one-file-per-entry store

mod disk;
mod memory;

pub use disk::DiskCacheProvider;
pub use memory::MemoryCacheProvider;
