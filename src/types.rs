//! Core width and sentinel definitions shared by every layer.
//!
//! Keys and values are fixed-width signed integers of the same width; the
//! on-disk page layout hard-codes `ENTRY_SIZE` and is not portable across
//! builds with a different width or endianness.

/// Key type stored by the engine.
pub type Key = i64;

/// Value type stored by the engine.
pub type Value = i64;

/// One key-value pair.
pub type Entry = (Key, Value);

/// Reserved sentinel marking a logical delete. `Database::put` rejects it
/// as a user value; `Database::delete` is the only writer of it.
pub const TOMBSTONE: Value = Value::MIN;

/// Size of a serialized key in bytes.
pub const KEY_SIZE: usize = std::mem::size_of::<Key>();

/// Size of a serialized pair in bytes.
pub const ENTRY_SIZE: usize = std::mem::size_of::<Key>() + std::mem::size_of::<Value>();

/// Size of every file page and cache frame in bytes. Run files are always
/// a whole number of pages.
pub const PAGE_SIZE: usize = 4096;

/// Which read path a sorted run uses for point lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Descend the internal pages from the root.
    #[default]
    Tree,
    /// Binary-search the leaf region as a sorted array of pages, never
    /// touching internal pages.
    Binary,
}
