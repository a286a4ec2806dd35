use std::path::PathBuf;

use crate::types::SearchMode;

/// Configuration for a tephra database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base data directory; a database named `n` lives at `dir/n` (default: `data`)
    pub dir: PathBuf,

    /// Memtable capacity in entries (default: 4096)
    pub memtable_max_entries: usize,

    /// Bloom filter bits per entry; the target false-positive rate is
    /// `exp(-bits * ln(2)^2)` (default: 10, roughly 0.8%)
    pub bloom_bits_per_entry: usize,

    /// Maximum number of 4 KiB pages held by the cache (default: 1024)
    pub cache_pages_max: usize,

    /// Scans touching more pages than this are demoted to preferred-victim
    /// status (default: 64)
    pub cache_flood_threshold_pages: usize,

    /// Initial global depth of the cache directory (default: 3)
    pub cache_initial_depth: usize,

    /// Maximum global depth of the cache directory (default: 12)
    pub cache_max_depth: usize,

    /// Cached pages per directory bucket (default: 4)
    pub cache_bucket_pages: usize,

    /// Point-lookup read path for sorted runs (default: tree descent)
    pub search_mode: SearchMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            memtable_max_entries: 4096,
            bloom_bits_per_entry: 10,
            cache_pages_max: 1024,
            cache_flood_threshold_pages: 64,
            cache_initial_depth: 3,
            cache_max_depth: 12,
            cache_bucket_pages: 4,
            search_mode: SearchMode::Tree,
        }
    }
}

impl Config {
    /// Create a new config rooted at the given base directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set memtable capacity in entries.
    pub fn memtable_max_entries(mut self, entries: usize) -> Self {
        self.memtable_max_entries = entries;
        self
    }

    /// Set Bloom filter bits per entry.
    pub fn bloom_bits_per_entry(mut self, bits: usize) -> Self {
        self.bloom_bits_per_entry = bits;
        self
    }

    /// Set page cache capacity in pages.
    pub fn cache_pages_max(mut self, pages: usize) -> Self {
        self.cache_pages_max = pages;
        self
    }

    /// Set the sequential-flooding demotion threshold.
    pub fn cache_flood_threshold_pages(mut self, pages: usize) -> Self {
        self.cache_flood_threshold_pages = pages;
        self
    }

    /// Set cache directory geometry: initial depth, maximum depth, and
    /// pages per bucket.
    pub fn cache_geometry(mut self, initial: usize, max: usize, bucket_pages: usize) -> Self {
        self.cache_initial_depth = initial;
        self.cache_max_depth = max;
        self.cache_bucket_pages = bucket_pages;
        self
    }

    /// Set the point-lookup read path.
    pub fn search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    /// Target false-positive rate derived from `bloom_bits_per_entry`.
    pub fn bloom_fpr(&self) -> f64 {
        let ln2 = std::f64::consts::LN_2;
        (-(self.bloom_bits_per_entry as f64) * ln2 * ln2).exp()
    }
}
