//! # tephra
//!
//! An embedded, single-writer ordered key-value store for fixed-width
//! integer keys and values:
//! - Log-structured merge tree: memtable, immutable sorted runs, and
//!   size-tiered compaction into deeper levels
//! - Paged B-tree layout per run with a Bloom filter for early rejection
//! - Extendible-hashing buffer pool with CLOCK eviction and
//!   sequential-flooding protection in front of all page reads
//! - Logical deletes as tombstone sentinels reconciled during merges

pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod hasher;
pub mod memtable;
pub mod sstable;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use store::{Database, Stats};
pub use types::{Key, SearchMode, Value, TOMBSTONE};
