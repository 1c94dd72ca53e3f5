//! Reference record stores for the golden-value engine.
//!
//! - [`MemoryStore`]: process-lifetime store behind a `parking_lot::RwLock`
//! - [`FileStore`]: JSON document on disk, with key and row digests verified on load

#![forbid(unsafe_code)]

pub mod digest;
pub mod file;
pub mod memory;
mod table;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use table::TableSummary;
