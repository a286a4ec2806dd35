//! One immutable sorted run.
//!
//! A `Table` serves point lookups and range scans over its file, fetching
//! every tree page through the shared buffer pool: try the cache, on miss
//! read the page from disk and insert it. Header and filter are parsed
//! once at open and kept in memory.

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use crate::buffer::{BufferPool, PageId, ScanGuard};
use crate::error::Result;
use crate::filter::{BloomFilter, Membership};
use crate::types::{Entry, Key, SearchMode, Value, PAGE_SIZE};
use crate::{errdata, errinput};

use super::builder::Builder;
use super::layout::{decode_node, Header, Node};

pub struct Table {
    path: PathBuf,
    /// Page-identity string shared by every `PageId` of this file.
    file: Arc<str>,
    header: Header,
    leaf_pages: u64,
    min_key: Key,
    max_key: Key,
    filter: BloomFilter,
    pool: Rc<RefCell<BufferPool>>,
    mode: SearchMode,
}

impl Table {
    /// Opens a run file: parses and validates the header, loads the filter
    /// region, and reads the boundary keys. Any validation failure marks
    /// the run corrupt and the caller skips it.
    pub fn open(
        path: impl AsRef<Path>,
        pool: Rc<RefCell<BufferPool>>,
        mode: SearchMode,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut header_page = [0u8; PAGE_SIZE];
        file.read_exact(&mut header_page)
            .map_err(|err| crate::error::Error::InvalidData(format!("short header: {err}")))?;
        let header = Header::decode(&header_page, file_len)?;

        let mut filter_bytes = vec![0u8; header.filter_length as usize];
        file.seek(SeekFrom::Start(header.filter_offset))?;
        file.read_exact(&mut filter_bytes)
            .map_err(|err| crate::error::Error::InvalidData(format!("short filter: {err}")))?;
        let filter =
            BloomFilter::from_bytes(filter_bytes, header.filter_bits, header.filter_probes);
        drop(file);

        let leaf_pages = header.leaf_pages();
        let mut table = Self {
            file: path.to_string_lossy().into_owned().into(),
            path,
            header,
            leaf_pages,
            min_key: 0,
            max_key: 0,
            filter,
            pool,
            mode,
        };

        let first = table.read_leaf(0)?;
        let last = table.read_leaf(leaf_pages - 1)?;
        table.min_key = first[0].0;
        table.max_key = last[last.len() - 1].0;
        if table.min_key > table.max_key {
            return errdata!(
                "boundary keys out of order: {} > {}",
                table.min_key,
                table.max_key
            );
        }
        Ok(table)
    }

    /// Point lookup. Rejects by the key bounds, then the filter, and only
    /// then descends; tombstone values are returned as stored.
    pub fn get(&self, key: Key) -> Result<Option<Value>> {
        if key < self.min_key || key > self.max_key {
            return Ok(None);
        }
        if self.filter.might_contain(key) == Membership::DefinitelyAbsent {
            return Ok(None);
        }
        match self.mode {
            SearchMode::Tree => self.get_tree(key),
            SearchMode::Binary => self.get_binary(key),
        }
    }

    /// Returns all pairs with `lo <= key <= hi` in ascending key order,
    /// tombstones included. Empty intervals cost no page I/O.
    pub fn range_scan(&self, lo: Key, hi: Key) -> Result<Vec<Entry>> {
        if lo > hi {
            return errinput!("scan range {lo} > {hi}");
        }
        if hi < self.min_key || lo > self.max_key {
            return Ok(Vec::new());
        }

        let guard = ScanGuard::begin(&self.pool);
        let start_leaf = match self.mode {
            SearchMode::Tree => self.descend_to_leaf(lo.max(self.min_key))?,
            SearchMode::Binary => self.leaf_index_for(lo.max(self.min_key))?,
        };

        let mut out = Vec::new();
        for index in start_leaf..self.leaf_pages {
            let id = self.page_id(self.leaf_offset(index));
            let page = self.read_page(&id)?;
            guard.touch(&id);
            let _pin = PagePin::acquire(&self.pool, &id);

            let Node::Leaf(entries) = decode_node(&page)? else {
                return errdata!("leaf region page {index} is not a leaf");
            };
            let start = if index == start_leaf {
                entries.partition_point(|&(key, _)| key < lo)
            } else {
                0
            };
            for &(key, value) in &entries[start..] {
                if key > hi {
                    return Ok(out);
                }
                out.push((key, value));
            }
        }
        Ok(out)
    }

    /// Streaming cursor over every pair in key order.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            table: self,
            guard: ScanGuard::begin(&self.pool),
            next_leaf: 0,
            entries: Vec::new().into_iter(),
            pin: None,
        }
    }

    /// Merges two runs into a new one at `target_level`, written to `path`.
    /// On equal keys the younger input wins; tombstones are carried through
    /// unconditionally.
    pub fn merge(
        older: &Table,
        younger: &Table,
        target_level: u64,
        path: impl AsRef<Path>,
    ) -> Result<Table> {
        let expected = (older.entry_count() + younger.entry_count()) as usize;
        let mut builder = Builder::new(&path, target_level, younger.header.fpr, expected)?;

        let mut a = older.cursor();
        let mut b = younger.cursor();
        let mut x = a.next()?;
        let mut y = b.next()?;
        loop {
            match (x, y) {
                (None, None) => break,
                (Some((key, value)), None) => {
                    builder.add(key, value)?;
                    x = a.next()?;
                }
                (None, Some((key, value))) => {
                    builder.add(key, value)?;
                    y = b.next()?;
                }
                (Some((ka, va)), Some((kb, vb))) => {
                    if ka < kb {
                        builder.add(ka, va)?;
                        x = a.next()?;
                    } else if kb < ka {
                        builder.add(kb, vb)?;
                        y = b.next()?;
                    } else {
                        builder.add(kb, vb)?;
                        x = a.next()?;
                        y = b.next()?;
                    }
                }
            }
        }
        builder.finish()?;
        Table::open(path, older.pool.clone(), older.mode)
    }

    pub fn min_key(&self) -> Key {
        self.min_key
    }

    pub fn max_key(&self) -> Key {
        self.max_key
    }

    pub fn entry_count(&self) -> u64 {
        self.header.entry_count
    }

    pub fn level(&self) -> u64 {
        self.header.level
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descends internal pages from the root and searches the leaf.
    fn get_tree(&self, key: Key) -> Result<Option<Value>> {
        let mut offset = self.header.root_offset;
        loop {
            let page = self.read_page(&self.page_id(offset))?;
            match decode_node(&page)? {
                Node::Leaf(entries) => {
                    return Ok(entries
                        .binary_search_by_key(&key, |&(k, _)| k)
                        .ok()
                        .map(|pos| entries[pos].1));
                }
                Node::Internal { keys, children } => {
                    let child = keys.partition_point(|&separator| separator < key);
                    if child == children.len() {
                        return Ok(None);
                    }
                    offset = children[child];
                }
            }
        }
    }

    /// Binary-searches the leaf region as a sorted array of pages keyed by
    /// their last key, never touching internal pages.
    fn get_binary(&self, key: Key) -> Result<Option<Value>> {
        let entries = self.read_leaf(self.leaf_index_for(key)?)?;
        Ok(entries
            .binary_search_by_key(&key, |&(k, _)| k)
            .ok()
            .map(|pos| entries[pos].1))
    }

    /// Tree descent with `key`, returning the index of the target leaf.
    fn descend_to_leaf(&self, key: Key) -> Result<u64> {
        let mut offset = self.header.root_offset;
        loop {
            if self.is_leaf_offset(offset) {
                return Ok((offset - self.header.leaf_start) / PAGE_SIZE as u64);
            }
            let page = self.read_page(&self.page_id(offset))?;
            match decode_node(&page)? {
                Node::Leaf(_) => {
                    return errdata!("leaf page at {offset} inside internal region");
                }
                Node::Internal { keys, children } => {
                    let child = keys.partition_point(|&separator| separator < key);
                    // Bounds were checked; clamp to the rightmost child.
                    offset = children[child.min(children.len() - 1)];
                }
            }
        }
    }

    /// First leaf index whose last key is at least `key`.
    fn leaf_index_for(&self, key: Key) -> Result<u64> {
        let (mut lo, mut hi) = (0u64, self.leaf_pages - 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entries = self.read_leaf(mid)?;
            if entries[entries.len() - 1].0 >= key {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    fn read_leaf(&self, index: u64) -> Result<Vec<Entry>> {
        let offset = self.leaf_offset(index);
        let page = self.read_page(&self.page_id(offset))?;
        match decode_node(&page)? {
            Node::Leaf(entries) => Ok(entries),
            Node::Internal { .. } => {
                errdata!("expected leaf at page index {index}")
            }
        }
    }

    fn leaf_offset(&self, index: u64) -> u64 {
        self.header.leaf_start + index * PAGE_SIZE as u64
    }

    fn is_leaf_offset(&self, offset: u64) -> bool {
        offset >= self.header.leaf_start
            && offset < self.header.leaf_start + self.leaf_pages * PAGE_SIZE as u64
    }

    fn page_id(&self, offset: u64) -> PageId {
        PageId::new(self.file.clone(), offset)
    }

    /// Fetches a page: cache first, then disk with insertion back into the
    /// cache. A failed insertion (e.g. everything pinned) does not fail
    /// the read.
    fn read_page(&self, id: &PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut buf = [0u8; PAGE_SIZE];
        if self.pool.borrow_mut().get(id, &mut buf) {
            return Ok(buf);
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(id.offset))?;
        file.read_exact(&mut buf)?;
        drop(file);

        if let Err(err) = self.pool.borrow_mut().put(id, &buf) {
            tracing::debug!(file = %id.file, offset = id.offset, error = %err,
                "Page not cached after read");
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("path", &self.path)
            .field("level", &self.header.level)
            .field("entries", &self.header.entry_count)
            .field("min_key", &self.min_key)
            .field("max_key", &self.max_key)
            .finish()
    }
}

/// Streaming iterator over a run's pairs, leaf by leaf in file order. The
/// current leaf stays pinned until the cursor advances past it or drops.
pub struct Cursor<'a> {
    table: &'a Table,
    guard: ScanGuard,
    next_leaf: u64,
    entries: std::vec::IntoIter<Entry>,
    pin: Option<PagePin>,
}

impl Cursor<'_> {
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Entry>> {
        loop {
            if let Some(entry) = self.entries.next() {
                return Ok(Some(entry));
            }
            if self.next_leaf >= self.table.leaf_pages {
                self.pin = None;
                return Ok(None);
            }
            let id = self.table.page_id(self.table.leaf_offset(self.next_leaf));
            let page = self.table.read_page(&id)?;
            self.guard.touch(&id);
            self.pin = Some(PagePin::acquire(&self.table.pool, &id));

            let Node::Leaf(entries) = decode_node(&page)? else {
                return errdata!("leaf region page {} is not a leaf", self.next_leaf);
            };
            self.entries = entries.into_iter();
            self.next_leaf += 1;
        }
    }
}

/// Pin held on a cached page, released on drop so every exit path unpins.
struct PagePin {
    pool: Rc<RefCell<BufferPool>>,
    id: Option<PageId>,
}

impl PagePin {
    fn acquire(pool: &Rc<RefCell<BufferPool>>, id: &PageId) -> Self {
        let pinned = pool.borrow_mut().pin(id);
        Self {
            pool: pool.clone(),
            id: pinned.then(|| id.clone()),
        }
    }
}

impl Drop for PagePin {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.pool.borrow_mut().unpin(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::builder::build_run;
    use crate::sstable::layout::LEAF_CAPACITY;
    use crate::types::TOMBSTONE;
    use tempfile::TempDir;

    fn test_pool() -> Rc<RefCell<BufferPool>> {
        Rc::new(RefCell::new(BufferPool::new(2, 10, 4, 256)))
    }

    fn build_table(
        dir: &TempDir,
        name: &str,
        pairs: Vec<Entry>,
        mode: SearchMode,
    ) -> (Rc<RefCell<BufferPool>>, Table) {
        let path = dir.path().join(name);
        let expected = pairs.len();
        build_run(&path, 0, 0.01, expected, pairs).expect("build failed");
        let pool = test_pool();
        let table = Table::open(&path, pool.clone(), mode).expect("open failed");
        (pool, table)
    }

    fn dense_pairs(n: i64) -> Vec<Entry> {
        (0..n).map(|i| (i, i * 10)).collect()
    }

    #[test]
    fn test_open_reads_bounds() {
        let dir = TempDir::new().unwrap();
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(1000), SearchMode::Tree);
        assert_eq!(table.min_key(), 0);
        assert_eq!(table.max_key(), 999);
        assert_eq!(table.entry_count(), 1000);
        assert_eq!(table.level(), 0);
    }

    #[test]
    fn test_get_tree_mode() {
        let dir = TempDir::new().unwrap();
        let n = LEAF_CAPACITY as i64 * 4 + 7;
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(n), SearchMode::Tree);

        for key in [0, 1, LEAF_CAPACITY as i64, n / 2, n - 1] {
            assert_eq!(table.get(key).unwrap(), Some(key * 10), "key {key}");
        }
        assert_eq!(table.get(-1).unwrap(), None);
        assert_eq!(table.get(n).unwrap(), None);
    }

    #[test]
    fn test_get_binary_mode() {
        let dir = TempDir::new().unwrap();
        let n = LEAF_CAPACITY as i64 * 4 + 7;
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(n), SearchMode::Binary);

        for key in [0, LEAF_CAPACITY as i64 - 1, LEAF_CAPACITY as i64, n - 1] {
            assert_eq!(table.get(key).unwrap(), Some(key * 10), "key {key}");
        }
        assert_eq!(table.get(n + 100).unwrap(), None);
    }

    #[test]
    fn test_get_sparse_absent_keys() {
        let dir = TempDir::new().unwrap();
        let pairs: Vec<Entry> = (0..500).map(|i| (i * 3, i)).collect();
        let (_pool, table) = build_table(&dir, "a.sst", pairs, SearchMode::Tree);

        assert_eq!(table.get(3).unwrap(), Some(1));
        assert_eq!(table.get(4).unwrap(), None);
        assert_eq!(table.get(5).unwrap(), None);
    }

    #[test]
    fn test_range_scan_within_one_leaf() {
        let dir = TempDir::new().unwrap();
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(100), SearchMode::Tree);

        assert_eq!(
            table.range_scan(10, 12).unwrap(),
            vec![(10, 100), (11, 110), (12, 120)]
        );
        assert_eq!(table.range_scan(50, 50).unwrap(), vec![(50, 500)]);
    }

    #[test]
    fn test_range_scan_across_leaves() {
        let dir = TempDir::new().unwrap();
        let n = LEAF_CAPACITY as i64 * 3;
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(n), SearchMode::Tree);

        let lo = LEAF_CAPACITY as i64 - 2;
        let hi = LEAF_CAPACITY as i64 + 2;
        let got = table.range_scan(lo, hi).unwrap();
        let want: Vec<Entry> = (lo..=hi).map(|i| (i, i * 10)).collect();
        assert_eq!(got, want);

        // Full scan returns everything in order.
        assert_eq!(table.range_scan(0, n).unwrap().len(), n as usize);
    }

    #[test]
    fn test_range_scan_empty_intervals() {
        let dir = TempDir::new().unwrap();
        let pairs: Vec<Entry> = (100..200).map(|i| (i, i)).collect();
        let (pool, table) = build_table(&dir, "a.sst", pairs, SearchMode::Tree);
        let cached_before = pool.borrow().page_count();

        assert_eq!(table.range_scan(0, 99).unwrap(), vec![]);
        assert_eq!(table.range_scan(200, 300).unwrap(), vec![]);
        // No tree pages were fetched for the misses.
        assert_eq!(pool.borrow().page_count(), cached_before);
    }

    #[test]
    fn test_range_scan_rejects_inverted_bounds() {
        let dir = TempDir::new().unwrap();
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(10), SearchMode::Tree);
        assert!(table.range_scan(5, 4).is_err());
    }

    #[test]
    fn test_binary_mode_range_scan() {
        let dir = TempDir::new().unwrap();
        let n = LEAF_CAPACITY as i64 * 2 + 10;
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(n), SearchMode::Binary);

        let got = table.range_scan(250, 260).unwrap();
        let want: Vec<Entry> = (250..=260).map(|i| (i, i * 10)).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_cursor_streams_everything() {
        let dir = TempDir::new().unwrap();
        let n = LEAF_CAPACITY as i64 * 2 + 5;
        let (_pool, table) = build_table(&dir, "a.sst", dense_pairs(n), SearchMode::Tree);

        let mut cursor = table.cursor();
        let mut count = 0i64;
        while let Some((key, value)) = cursor.next().unwrap() {
            assert_eq!(key, count);
            assert_eq!(value, count * 10);
            count += 1;
        }
        assert_eq!(count, n);
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.sst");
        std::fs::write(&path, vec![0xabu8; 3 * PAGE_SIZE]).unwrap();

        let err = Table::open(&path, test_pool(), SearchMode::Tree).unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidData(_)));
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trunc.sst");
        build_run(&path, 0, 0.01, 1000, dense_pairs(1000)).unwrap();

        let full = std::fs::read(&path).unwrap();
        std::fs::write(&path, &full[..full.len() - PAGE_SIZE]).unwrap();
        assert!(Table::open(&path, test_pool(), SearchMode::Tree).is_err());
    }

    #[test]
    fn test_reads_populate_cache() {
        let dir = TempDir::new().unwrap();
        let (pool, table) = build_table(&dir, "a.sst", dense_pairs(1000), SearchMode::Tree);

        let before = pool.borrow().page_count();
        table.get(500).unwrap();
        assert!(pool.borrow().page_count() > before);

        // A repeated lookup is served from the cache: page count stable.
        let after = pool.borrow().page_count();
        table.get(500).unwrap();
        assert_eq!(pool.borrow().page_count(), after);
    }

    #[test]
    fn test_merge_younger_wins_and_keeps_tombstones() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool();

        let older_path = dir.path().join("older.sst");
        build_run(&older_path, 0, 0.01, 3, vec![(1, 100), (2, 200), (3, 300)]).unwrap();
        let older = Table::open(&older_path, pool.clone(), SearchMode::Tree).unwrap();

        let younger_path = dir.path().join("younger.sst");
        build_run(&younger_path, 0, 0.01, 2, vec![(2, 999), (4, TOMBSTONE)]).unwrap();
        let younger = Table::open(&younger_path, pool.clone(), SearchMode::Tree).unwrap();

        let merged_path = dir.path().join("merged.sst");
        let merged = Table::merge(&older, &younger, 1, &merged_path).unwrap();

        assert_eq!(merged.level(), 1);
        assert_eq!(merged.entry_count(), 4);
        assert_eq!(
            merged.range_scan(Key::MIN, Key::MAX).unwrap(),
            vec![(1, 100), (2, 999), (3, 300), (4, TOMBSTONE)]
        );
        // The merged run's filter covers every surviving key.
        for key in [1, 2, 3, 4] {
            assert!(merged.get(key).unwrap().is_some(), "key {key} lost");
        }
    }

    #[test]
    fn test_merge_large_runs() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool();

        let n = LEAF_CAPACITY as i64 * 2;
        let older_path = dir.path().join("older.sst");
        let evens: Vec<Entry> = (0..n).map(|i| (i * 2, i)).collect();
        build_run(&older_path, 0, 0.01, evens.len(), evens).unwrap();
        let older = Table::open(&older_path, pool.clone(), SearchMode::Tree).unwrap();

        let younger_path = dir.path().join("younger.sst");
        let odds: Vec<Entry> = (0..n).map(|i| (i * 2 + 1, -i)).collect();
        build_run(&younger_path, 0, 0.01, odds.len(), odds).unwrap();
        let younger = Table::open(&younger_path, pool.clone(), SearchMode::Tree).unwrap();

        let merged = Table::merge(&older, &younger, 1, dir.path().join("merged.sst")).unwrap();
        assert_eq!(merged.entry_count(), 2 * n as u64);

        let all = merged.range_scan(Key::MIN, Key::MAX).unwrap();
        assert_eq!(all.len(), 2 * n as usize);
        assert!(all.windows(2).all(|w| w[0].0 < w[1].0), "keys out of order");
    }
}
