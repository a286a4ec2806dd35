//! Page cache: an extendible-hashing directory of buckets over a
//! generational frame table, with CLOCK eviction, write-back of dirty
//! pages, and sequential-flooding protection.
//!
//! The pool is the sole owner of cached page bytes. `get` copies out into
//! the caller's buffer; no reference to a frame survives a cache call.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::Result;
use crate::types::PAGE_SIZE;
use crate::{errdata, errinput};

use super::page::{EvictionPriority, Frame, FrameRef, FrameTable, PageId};

/// Callback invoked with a dirty page's identity and bytes strictly before
/// its frame is reused.
pub type WriteBack = Box<dyn FnMut(&PageId, &[u8]) -> Result<()>>;

#[derive(Debug)]
struct Bucket {
    local_depth: usize,
    pages: Vec<FrameRef>,
}

impl Bucket {
    fn new(local_depth: usize) -> Self {
        Self {
            local_depth,
            pages: Vec::new(),
        }
    }

    fn find(&self, id: &PageId, frames: &FrameTable) -> Option<FrameRef> {
        self.pages
            .iter()
            .copied()
            .find(|&fref| frames.get(fref).is_some_and(|frame| &frame.id == id))
    }

    fn remove(&mut self, fref: FrameRef) -> bool {
        if let Some(pos) = self.pages.iter().position(|&r| r == fref) {
            self.pages.remove(pos);
            return true;
        }
        false
    }
}

#[derive(Debug, Default)]
struct ScanState {
    count: usize,
    pages: HashSet<PageId>,
}

pub struct BufferPool {
    directory: Vec<Rc<RefCell<Bucket>>>,
    global_depth: usize,
    initial_depth: usize,
    max_depth: usize,
    bucket_pages: usize,
    max_pages: usize,
    eviction: bool,
    frames: FrameTable,
    /// Clock ring of frame references; stale entries are compacted lazily
    /// by the eviction scan.
    ring: Vec<FrameRef>,
    hand: usize,
    write_back: Option<WriteBack>,
    flood_threshold: usize,
    next_scan: u64,
    scans: HashMap<u64, ScanState>,
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("global_depth", &self.global_depth)
            .field("directory_size", &self.directory.len())
            .field("page_count", &self.frames.len())
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl BufferPool {
    /// Creates a pool with the given directory geometry and page capacity.
    /// Eviction is enabled; no write-back callback is installed.
    pub fn new(
        initial_depth: usize,
        max_depth: usize,
        bucket_pages: usize,
        max_pages: usize,
    ) -> Self {
        let directory = (0..1usize << initial_depth)
            .map(|_| Rc::new(RefCell::new(Bucket::new(initial_depth))))
            .collect();
        Self {
            directory,
            global_depth: initial_depth,
            initial_depth,
            max_depth,
            bucket_pages: bucket_pages.max(1),
            max_pages: max_pages.max(1),
            eviction: true,
            frames: FrameTable::new(),
            ring: Vec::new(),
            hand: 0,
            write_back: None,
            flood_threshold: usize::MAX,
            next_scan: 0,
            scans: HashMap::new(),
        }
    }

    /// Installs the dirty-page write-back callback.
    pub fn write_back(mut self, callback: WriteBack) -> Self {
        self.write_back = Some(callback);
        self
    }

    /// Enables or disables eviction under capacity pressure.
    pub fn eviction(mut self, enabled: bool) -> Self {
        self.eviction = enabled;
        self
    }

    /// Sets the scan page count above which a finished scan's pages are
    /// demoted to preferred-victim status.
    pub fn flood_threshold(mut self, pages: usize) -> Self {
        self.flood_threshold = pages;
        self
    }

    /// Inserts or overwrites a page. Overwriting refreshes the bytes and
    /// sets the reference bit. A fresh insert may evict one victim first;
    /// a full bucket splits until the directory saturates.
    pub fn put(&mut self, id: &PageId, bytes: &[u8]) -> Result<()> {
        if bytes.len() != PAGE_SIZE {
            return errinput!("page must be {PAGE_SIZE} bytes, got {}", bytes.len());
        }

        let hash = id.hash();
        if let Some(fref) = self.bucket_at(hash).borrow().find(id, &self.frames) {
            let Some(frame) = self.frames.get_mut(fref) else {
                return errdata!("stale frame reference for {}:{}", id.file, id.offset);
            };
            frame.data.copy_from_slice(bytes);
            frame.valid = true;
            frame.reference = true;
            return Ok(());
        }

        if self.frames.len() >= self.max_pages {
            if !self.eviction {
                return Err(crate::error::Error::CacheFull(
                    "at capacity with eviction disabled".into(),
                ));
            }
            self.evict_one()?;
        }

        loop {
            let bucket = self.bucket_at(hash);
            if bucket.borrow().pages.len() < self.bucket_pages {
                break;
            }
            let local_depth = bucket.borrow().local_depth;
            if local_depth == self.global_depth && self.global_depth == self.max_depth {
                return Err(crate::error::Error::CacheFull(format!(
                    "directory saturated at depth {}",
                    self.max_depth
                )));
            }
            self.split_bucket(hash);
        }

        let fref = self.frames.insert(Frame::new(id.clone(), bytes));
        self.bucket_at(hash).borrow_mut().pages.push(fref);
        self.ring.push(fref);
        Ok(())
    }

    /// Copies the page's bytes into `buf` if present and valid, setting the
    /// reference bit. Never loads from disk.
    pub fn get(&mut self, id: &PageId, buf: &mut [u8]) -> bool {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let Some(fref) = self.find_ref(id) else {
            return false;
        };
        let Some(frame) = self.frames.get_mut(fref) else {
            return false;
        };
        if !frame.valid {
            return false;
        }
        frame.reference = true;
        buf.copy_from_slice(frame.data.as_ref());
        true
    }

    /// Returns true if a valid entry for the page is cached.
    pub fn contains(&self, id: &PageId) -> bool {
        self.find_ref(id)
            .and_then(|fref| self.frames.get(fref))
            .is_some_and(|frame| frame.valid)
    }

    /// Removes the entry and its clock slot.
    pub fn remove(&mut self, id: &PageId) -> bool {
        let Some(fref) = self.find_ref(id) else {
            return false;
        };
        self.bucket_at(id.hash()).borrow_mut().remove(fref);
        self.frames.remove(fref);
        if let Some(pos) = self.ring.iter().position(|&r| r == fref) {
            self.ring.remove(pos);
            if pos < self.hand {
                self.hand -= 1;
            }
        }
        true
    }

    /// Increments the page's pin count. Pinned pages are never evicted.
    pub fn pin(&mut self, id: &PageId) -> bool {
        match self.find_ref(id).and_then(|fref| self.frames.get_mut(fref)) {
            Some(frame) => {
                frame.pin_count += 1;
                true
            }
            None => false,
        }
    }

    /// Decrements the page's pin count; fails on a zero count.
    pub fn unpin(&mut self, id: &PageId) -> bool {
        match self.find_ref(id).and_then(|fref| self.frames.get_mut(fref)) {
            Some(frame) if frame.pin_count > 0 => {
                frame.pin_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Marks the page dirty; it will be written back before eviction.
    pub fn mark_dirty(&mut self, id: &PageId) -> bool {
        match self.find_ref(id).and_then(|fref| self.frames.get_mut(fref)) {
            Some(frame) => {
                frame.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Resets to the initial directory size and empty state.
    pub fn clear(&mut self) {
        self.directory = (0..1usize << self.initial_depth)
            .map(|_| Rc::new(RefCell::new(Bucket::new(self.initial_depth))))
            .collect();
        self.global_depth = self.initial_depth;
        self.frames.clear();
        self.ring.clear();
        self.hand = 0;
        self.scans.clear();
    }

    /// Opens a scan context for flooding accounting.
    pub fn begin_scan(&mut self) -> u64 {
        let id = self.next_scan;
        self.next_scan += 1;
        self.scans.insert(id, ScanState::default());
        id
    }

    /// Records a page access under the given scan.
    pub fn touch(&mut self, scan_id: u64, id: &PageId) {
        if let Some(scan) = self.scans.get_mut(&scan_id) {
            scan.count += 1;
            scan.pages.insert(id.clone());
        }
    }

    /// Closes a scan context. A scan that touched more pages than the flood
    /// threshold demotes every page it recorded to preferred-victim status;
    /// shorter scans leave priorities untouched.
    pub fn end_scan(&mut self, scan_id: u64) {
        let Some(scan) = self.scans.remove(&scan_id) else {
            return;
        };
        if scan.count <= self.flood_threshold {
            return;
        }
        tracing::debug!(
            scan_id = scan_id,
            pages = scan.count,
            threshold = self.flood_threshold,
            "Demoting flooding scan's pages"
        );
        for id in &scan.pages {
            if let Some(frame) = self.find_ref(id).and_then(|fref| self.frames.get_mut(fref)) {
                frame.priority = EvictionPriority::ScanLow;
            }
        }
    }

    /// Number of directory entries (2^global_depth).
    pub fn directory_size(&self) -> usize {
        self.directory.len()
    }

    pub fn global_depth(&self) -> usize {
        self.global_depth
    }

    /// Number of currently cached pages.
    pub fn page_count(&self) -> usize {
        self.frames.len()
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.max_pages
    }

    /// Number of scan contexts currently open.
    pub fn active_scans(&self) -> usize {
        self.scans.len()
    }

    /// Number of distinct buckets behind the directory; below the
    /// directory size whenever buckets are still shared after a doubling.
    pub fn unique_buckets(&self) -> usize {
        let mut seen: Vec<*const Bucket> = self
            .directory
            .iter()
            .map(|bucket| bucket.as_ptr() as *const Bucket)
            .collect();
        seen.sort();
        seen.dedup();
        seen.len()
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash & ((1u64 << self.global_depth) - 1)) as usize
    }

    fn bucket_at(&self, hash: u64) -> Rc<RefCell<Bucket>> {
        self.directory[self.bucket_index(hash)].clone()
    }

    fn find_ref(&self, id: &PageId) -> Option<FrameRef> {
        self.directory[self.bucket_index(id.hash())]
            .borrow()
            .find(id, &self.frames)
    }

    /// Doubles the directory; new entries mirror the old ones so every
    /// bucket is initially shared by two pointers.
    fn double_directory(&mut self) {
        let old_size = self.directory.len();
        for i in 0..old_size {
            self.directory.push(self.directory[i].clone());
        }
        self.global_depth += 1;
        tracing::debug!(
            global_depth = self.global_depth,
            directory_size = self.directory.len(),
            "Doubled cache directory"
        );
    }

    /// Splits the bucket addressed by `hash`, doubling the directory first
    /// if the bucket is at global depth. Existing pages redistribute by the
    /// newly exposed hash bit; every directory entry naming the old bucket
    /// is rewired to one of the two replacements.
    fn split_bucket(&mut self, hash: u64) {
        let old_bucket = self.bucket_at(hash);
        let local_depth = old_bucket.borrow().local_depth;

        if local_depth == self.global_depth {
            if self.global_depth >= self.max_depth {
                return;
            }
            self.double_directory();
        }

        let new_depth = local_depth + 1;
        let split_bit = 1u64 << local_depth;
        let bucket0 = Rc::new(RefCell::new(Bucket::new(new_depth)));
        let bucket1 = Rc::new(RefCell::new(Bucket::new(new_depth)));

        for &fref in &old_bucket.borrow().pages {
            let Some(frame) = self.frames.get(fref) else {
                continue;
            };
            if frame.id.hash() & split_bit != 0 {
                bucket1.borrow_mut().pages.push(fref);
            } else {
                bucket0.borrow_mut().pages.push(fref);
            }
        }

        for i in 0..self.directory.len() {
            if Rc::ptr_eq(&self.directory[i], &old_bucket) {
                self.directory[i] = if i as u64 & split_bit != 0 {
                    bucket1.clone()
                } else {
                    bucket0.clone()
                };
            }
        }
    }

    /// CLOCK scan: skip pinned frames, clear set reference bits, evict the
    /// first unset candidate. A scan-demoted page is taken immediately even
    /// with its reference bit set. Gives up after two full revolutions.
    fn evict_one(&mut self) -> Result<()> {
        let mut scanned = 0;
        while !self.ring.is_empty() && scanned < self.ring.len() * 2 {
            if self.hand >= self.ring.len() {
                self.hand = 0;
            }
            let fref = self.ring[self.hand];

            let Some(frame) = self.frames.get(fref) else {
                // Stale slot left by remove(); compact without advancing.
                self.ring.remove(self.hand);
                continue;
            };

            if frame.pin_count > 0 {
                self.hand = (self.hand + 1) % self.ring.len();
                scanned += 1;
                continue;
            }
            if frame.valid && frame.reference && frame.priority != EvictionPriority::ScanLow {
                if let Some(frame) = self.frames.get_mut(fref) {
                    frame.reference = false;
                }
                self.hand = (self.hand + 1) % self.ring.len();
                scanned += 1;
                continue;
            }

            return self.evict_at(fref);
        }
        Err(crate::error::Error::CacheFull(
            "no evictable page found".into(),
        ))
    }

    fn evict_at(&mut self, fref: FrameRef) -> Result<()> {
        let Some(frame) = self.frames.get(fref) else {
            return errdata!("clock slot vanished during eviction");
        };
        let id = frame.id.clone();

        // Write-back happens strictly before the slot is reused.
        if frame.valid && frame.dirty {
            if let Some(callback) = self.write_back.as_mut() {
                callback(&id, frame.data.as_ref())?;
            }
        }

        self.bucket_at(id.hash()).borrow_mut().remove(fref);
        self.frames.remove(fref);
        if let Some(pos) = self.ring.iter().position(|&r| r == fref) {
            self.ring.remove(pos);
            if pos < self.hand {
                self.hand -= 1;
            }
        }
        tracing::trace!(file = %id.file, offset = id.offset, "Evicted page");
        Ok(())
    }
}

/// Scoped scan context: `end_scan` runs on drop, so early returns and
/// error paths cannot leak the accounting.
pub struct ScanGuard {
    pool: Rc<RefCell<BufferPool>>,
    id: u64,
}

impl ScanGuard {
    pub fn begin(pool: &Rc<RefCell<BufferPool>>) -> Self {
        let id = pool.borrow_mut().begin_scan();
        Self {
            pool: pool.clone(),
            id,
        }
    }

    pub fn touch(&self, id: &PageId) {
        self.pool.borrow_mut().touch(self.id, id);
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.pool.borrow_mut().end_scan(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_id(offset: u64) -> PageId {
        PageId::new("pool_test.sst", offset)
    }

    fn page_bytes(fill: u8) -> Vec<u8> {
        vec![fill; PAGE_SIZE]
    }

    fn small_pool(max_pages: usize) -> BufferPool {
        BufferPool::new(1, 8, 4, max_pages)
    }

    #[test]
    fn test_put_get_round_trip() {
        let mut pool = small_pool(4);
        let id = page_id(0);
        pool.put(&id, &page_bytes(0xab)).expect("put failed");

        let mut buf = page_bytes(0);
        assert!(pool.get(&id, &mut buf));
        assert_eq!(buf, page_bytes(0xab));
        assert!(pool.contains(&id));
        assert_eq!(pool.page_count(), 1);
    }

    #[test]
    fn test_put_overwrites_existing() {
        let mut pool = small_pool(4);
        let id = page_id(0);
        pool.put(&id, &page_bytes(1)).unwrap();
        pool.put(&id, &page_bytes(2)).unwrap();

        let mut buf = page_bytes(0);
        assert!(pool.get(&id, &mut buf));
        assert_eq!(buf, page_bytes(2));
        assert_eq!(pool.page_count(), 1);
    }

    #[test]
    fn test_put_rejects_short_pages() {
        let mut pool = small_pool(4);
        assert!(pool.put(&page_id(0), &[0u8; 100]).is_err());
    }

    #[test]
    fn test_get_missing_page() {
        let mut pool = small_pool(4);
        let mut buf = page_bytes(0);
        assert!(!pool.get(&page_id(0), &mut buf));
        assert!(!pool.contains(&page_id(0)));
    }

    #[test]
    fn test_remove() {
        let mut pool = small_pool(4);
        let id = page_id(0);
        pool.put(&id, &page_bytes(1)).unwrap();

        assert!(pool.remove(&id));
        assert!(!pool.contains(&id));
        assert!(!pool.remove(&id));
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_clock_second_chance() {
        let mut pool = small_pool(2);
        let (a, b, c) = (page_id(0), page_id(4096), page_id(8192));
        pool.put(&a, &page_bytes(1)).unwrap();
        pool.put(&b, &page_bytes(2)).unwrap();

        // Reference a; the clock should clear its bit and evict b.
        let mut buf = page_bytes(0);
        assert!(pool.get(&a, &mut buf));

        pool.put(&c, &page_bytes(3)).unwrap();
        assert!(pool.contains(&a));
        assert!(!pool.contains(&b));
        assert!(pool.contains(&c));
        assert_eq!(pool.page_count(), 2);
    }

    #[test]
    fn test_eviction_disabled_fails_at_capacity() {
        let mut pool = small_pool(2).eviction(false);
        pool.put(&page_id(0), &page_bytes(1)).unwrap();
        pool.put(&page_id(4096), &page_bytes(2)).unwrap();

        let err = pool.put(&page_id(8192), &page_bytes(3)).unwrap_err();
        assert!(matches!(err, crate::error::Error::CacheFull(_)));
        // Overwriting a resident page still works at capacity.
        pool.put(&page_id(0), &page_bytes(9)).unwrap();
    }

    #[test]
    fn test_all_pinned_fails() {
        let mut pool = small_pool(2);
        let (a, b) = (page_id(0), page_id(4096));
        pool.put(&a, &page_bytes(1)).unwrap();
        pool.put(&b, &page_bytes(2)).unwrap();
        assert!(pool.pin(&a));
        assert!(pool.pin(&b));

        let err = pool.put(&page_id(8192), &page_bytes(3)).unwrap_err();
        assert!(matches!(err, crate::error::Error::CacheFull(_)));

        // Unpinning one page unblocks the insert.
        assert!(pool.unpin(&b));
        pool.put(&page_id(8192), &page_bytes(3)).unwrap();
        assert!(pool.contains(&a));
        assert!(!pool.contains(&b));
    }

    #[test]
    fn test_unpin_on_zero_count_fails() {
        let mut pool = small_pool(2);
        let id = page_id(0);
        pool.put(&id, &page_bytes(1)).unwrap();

        assert!(!pool.unpin(&id));
        assert!(pool.pin(&id));
        assert!(pool.unpin(&id));
        assert!(!pool.unpin(&id));
    }

    #[test]
    fn test_dirty_page_written_back_before_reuse() {
        let written: Rc<RefCell<Vec<(PageId, Vec<u8>)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = written.clone();
        let mut pool = small_pool(1).write_back(Box::new(move |id, bytes| {
            sink.borrow_mut().push((id.clone(), bytes.to_vec()));
            Ok(())
        }));

        let id = page_id(0);
        pool.put(&id, &page_bytes(0xcd)).unwrap();
        assert!(pool.mark_dirty(&id));

        // Capacity 1: the next insert must evict and write back first.
        pool.put(&page_id(4096), &page_bytes(1)).unwrap();

        let written = written.borrow();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, id);
        assert_eq!(written[0].1, page_bytes(0xcd));
    }

    #[test]
    fn test_clean_page_not_written_back() {
        let written: Rc<RefCell<Vec<PageId>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = written.clone();
        let mut pool = small_pool(1).write_back(Box::new(move |id, _| {
            sink.borrow_mut().push(id.clone());
            Ok(())
        }));

        pool.put(&page_id(0), &page_bytes(1)).unwrap();
        pool.put(&page_id(4096), &page_bytes(2)).unwrap();
        assert!(written.borrow().is_empty());
    }

    #[test]
    fn test_directory_splits_under_load() {
        let mut pool = BufferPool::new(1, 16, 2, 256);
        assert_eq!(pool.directory_size(), 2);

        for i in 0..64 {
            pool.put(&page_id(i * PAGE_SIZE as u64), &page_bytes(i as u8))
                .unwrap();
        }

        assert!(pool.global_depth() > 1);
        assert_eq!(pool.directory_size(), 1 << pool.global_depth());
        assert_eq!(pool.page_count(), 64);

        // Every inserted page is still addressable after the splits.
        let mut buf = page_bytes(0);
        for i in 0..64 {
            let id = page_id(i * PAGE_SIZE as u64);
            assert!(pool.get(&id, &mut buf), "page {i} lost after split");
            assert_eq!(buf, page_bytes(i as u8));
        }
    }

    #[test]
    fn test_directory_saturation_fails() {
        // Depth pinned at zero with a one-page bucket: the second distinct
        // page cannot be placed.
        let mut pool = BufferPool::new(0, 0, 1, 16);
        pool.put(&page_id(0), &page_bytes(1)).unwrap();
        let err = pool.put(&page_id(4096), &page_bytes(2)).unwrap_err();
        assert!(matches!(err, crate::error::Error::CacheFull(_)));
    }

    #[test]
    fn test_flooding_scan_demotes_pages() {
        let mut pool = small_pool(4).flood_threshold(2);
        let ids: Vec<PageId> = (0..4).map(|i| page_id(i * PAGE_SIZE as u64)).collect();
        for (i, id) in ids.iter().enumerate() {
            pool.put(id, &page_bytes(i as u8)).unwrap();
        }

        // Reference everything so the clock would normally second-chance all.
        let mut buf = page_bytes(0);
        for id in &ids {
            assert!(pool.get(id, &mut buf));
        }

        // A three-page scan exceeds the threshold of two.
        let scan = pool.begin_scan();
        pool.touch(scan, &ids[1]);
        pool.touch(scan, &ids[2]);
        pool.touch(scan, &ids[3]);
        pool.end_scan(scan);

        // The next insert takes a demoted page despite its reference bit,
        // leaving the hot page resident.
        pool.put(&page_id(100 * PAGE_SIZE as u64), &page_bytes(0xff))
            .unwrap();
        assert!(pool.contains(&ids[0]));
        let evicted = ids[1..].iter().filter(|id| !pool.contains(id)).count();
        assert_eq!(evicted, 1);
    }

    #[test]
    fn test_short_scan_leaves_priorities() {
        let mut pool = small_pool(2).flood_threshold(2);
        let (a, b) = (page_id(0), page_id(4096));
        pool.put(&a, &page_bytes(1)).unwrap();
        pool.put(&b, &page_bytes(2)).unwrap();

        let mut buf = page_bytes(0);
        assert!(pool.get(&a, &mut buf));

        // Two pages touched, threshold two: no demotion.
        let scan = pool.begin_scan();
        pool.touch(scan, &a);
        pool.touch(scan, &b);
        pool.end_scan(scan);

        // Normal clock behavior: a keeps its second chance, b is evicted.
        pool.put(&page_id(8192), &page_bytes(3)).unwrap();
        assert!(pool.contains(&a));
        assert!(!pool.contains(&b));
    }

    #[test]
    fn test_clear_resets_directory_and_state() {
        let mut pool = BufferPool::new(1, 16, 2, 256);
        for i in 0..32 {
            pool.put(&page_id(i * PAGE_SIZE as u64), &page_bytes(0)).unwrap();
        }
        assert!(pool.global_depth() > 1);

        pool.clear();
        assert_eq!(pool.global_depth(), 1);
        assert_eq!(pool.directory_size(), 2);
        assert_eq!(pool.page_count(), 0);
        assert!(!pool.contains(&page_id(0)));

        // Reusable after clear.
        pool.put(&page_id(0), &page_bytes(7)).unwrap();
        assert!(pool.contains(&page_id(0)));
    }

    #[test]
    fn test_buckets_shared_after_doubling() {
        let mut pool = BufferPool::new(1, 16, 2, 256);
        assert_eq!(pool.unique_buckets(), 2);

        for i in 0..16 {
            pool.put(&page_id(i * PAGE_SIZE as u64), &page_bytes(0)).unwrap();
        }

        // Only overflowing buckets split, so some directory entries still
        // alias a shared bucket.
        assert!(pool.global_depth() > 1);
        assert!(pool.unique_buckets() <= pool.directory_size());
        assert!(pool.unique_buckets() >= 2);
    }

    #[test]
    fn test_scan_guard_ends_scan_on_drop() {
        let pool = Rc::new(RefCell::new(small_pool(4).flood_threshold(1)));
        let id = page_id(0);
        pool.borrow_mut().put(&id, &page_bytes(1)).unwrap();

        {
            let guard = ScanGuard::begin(&pool);
            guard.touch(&id);
            guard.touch(&page_id(4096));
            assert_eq!(pool.borrow().active_scans(), 1);
        }
        assert_eq!(pool.borrow().active_scans(), 0);
    }
}
