//! On-disk page layout of a sorted run.
//!
//! A run file is, in page order: one header page, a contiguous leaf region
//! in ascending key order, zero or more internal layers built bottom-up
//! until a single root page remains, and the filter region. All integers
//! are platform-native; the format is the engine's private one and is not
//! portable across builds with different widths or endianness.

use byteorder::{ByteOrder, NativeEndian};

use crate::error::Result;
use crate::errdata;
use crate::types::{Entry, Key, ENTRY_SIZE, KEY_SIZE, PAGE_SIZE};

/// Bytes of node bookkeeping at the start of every leaf and internal page:
/// an `is_leaf` flag byte, seven pad bytes, and a `count` u64.
pub const NODE_HEADER_SIZE: usize = 16;

/// Pairs per leaf page.
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - NODE_HEADER_SIZE) / ENTRY_SIZE;

/// Children per internal page.
pub const INTERNAL_CAPACITY: usize = (PAGE_SIZE - NODE_HEADER_SIZE - 8) / (KEY_SIZE + 8);

/// Parsed header page of a run file.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub root_offset: u64,
    pub leaf_start: u64,
    pub entry_count: u64,
    pub level: u64,
    pub fpr: f64,
    pub filter_offset: u64,
    pub filter_length: u64,
    pub filter_probes: u64,
    pub filter_bits: u64,
}

impl Header {
    /// Serializes the header into a full page, zero padded.
    pub fn encode(&self) -> [u8; PAGE_SIZE] {
        let mut page = [0u8; PAGE_SIZE];
        NativeEndian::write_u64(&mut page[0..8], self.root_offset);
        NativeEndian::write_u64(&mut page[8..16], self.leaf_start);
        NativeEndian::write_u64(&mut page[16..24], self.entry_count);
        NativeEndian::write_u64(&mut page[24..32], self.level);
        NativeEndian::write_f64(&mut page[32..40], self.fpr);
        NativeEndian::write_u64(&mut page[40..48], self.filter_offset);
        NativeEndian::write_u64(&mut page[48..56], self.filter_length);
        NativeEndian::write_u64(&mut page[56..64], self.filter_probes);
        NativeEndian::write_u64(&mut page[64..72], self.filter_bits);
        page
    }

    /// Parses and validates a header page against the file's byte length.
    /// A header that fails any plausibility check marks the run corrupt.
    pub fn decode(page: &[u8], file_len: u64) -> Result<Self> {
        if page.len() != PAGE_SIZE {
            return errdata!("header page is {} bytes, want {PAGE_SIZE}", page.len());
        }
        if file_len % PAGE_SIZE as u64 != 0 {
            return errdata!("run file length {file_len} is not a whole number of pages");
        }

        let header = Self {
            root_offset: NativeEndian::read_u64(&page[0..8]),
            leaf_start: NativeEndian::read_u64(&page[8..16]),
            entry_count: NativeEndian::read_u64(&page[16..24]),
            level: NativeEndian::read_u64(&page[24..32]),
            fpr: NativeEndian::read_f64(&page[32..40]),
            filter_offset: NativeEndian::read_u64(&page[40..48]),
            filter_length: NativeEndian::read_u64(&page[48..56]),
            filter_probes: NativeEndian::read_u64(&page[56..64]),
            filter_bits: NativeEndian::read_u64(&page[64..72]),
        };

        if header.entry_count == 0 {
            return errdata!("run declares zero entries");
        }
        if header.leaf_start != PAGE_SIZE as u64 {
            return errdata!("leaf region starts at {}, want {PAGE_SIZE}", header.leaf_start);
        }
        if !(header.fpr > 0.0 && header.fpr < 1.0) {
            return errdata!("implausible false-positive rate {}", header.fpr);
        }

        let leaf_pages = header.entry_count.div_ceil(LEAF_CAPACITY as u64);
        let leaf_end = header.leaf_start + leaf_pages * PAGE_SIZE as u64;
        if header.filter_offset < leaf_end || header.filter_offset % PAGE_SIZE as u64 != 0 {
            return errdata!("filter offset {} inside tree region", header.filter_offset);
        }
        let filter_pages = header.filter_length.div_ceil(PAGE_SIZE as u64);
        if header.filter_offset + filter_pages * PAGE_SIZE as u64 > file_len {
            return errdata!("filter region extends past end of file");
        }
        if header.filter_bits == 0 || header.filter_probes == 0 {
            return errdata!("filter parameters are zero");
        }
        if header.filter_length != header.filter_bits.div_ceil(8) {
            return errdata!(
                "filter length {} does not match {} bits",
                header.filter_length,
                header.filter_bits
            );
        }
        if header.root_offset < header.leaf_start
            || header.root_offset >= header.filter_offset
            || header.root_offset % PAGE_SIZE as u64 != 0
        {
            return errdata!("root offset {} outside tree region", header.root_offset);
        }

        Ok(header)
    }

    /// Number of pages in the leaf region.
    pub fn leaf_pages(&self) -> u64 {
        self.entry_count.div_ceil(LEAF_CAPACITY as u64)
    }
}

/// A decoded tree page.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Vec<Entry>),
    Internal { keys: Vec<Key>, children: Vec<u64> },
}

/// Serializes a leaf page holding the given pairs, zero padded.
pub fn encode_leaf(entries: &[Entry]) -> [u8; PAGE_SIZE] {
    debug_assert!(!entries.is_empty() && entries.len() <= LEAF_CAPACITY);
    let mut page = [0u8; PAGE_SIZE];
    page[0] = 1;
    NativeEndian::write_u64(&mut page[8..16], entries.len() as u64);
    let mut at = NODE_HEADER_SIZE;
    for &(key, value) in entries {
        NativeEndian::write_i64(&mut page[at..at + 8], key);
        NativeEndian::write_i64(&mut page[at + 8..at + 16], value);
        at += ENTRY_SIZE;
    }
    page
}

/// Serializes an internal page: separator keys then child offsets, as two
/// parallel arrays. `keys[i]` is the maximum key under `children[i]`.
pub fn encode_internal(keys: &[Key], children: &[u64]) -> [u8; PAGE_SIZE] {
    debug_assert!(!keys.is_empty() && keys.len() <= INTERNAL_CAPACITY);
    debug_assert_eq!(keys.len(), children.len());
    let mut page = [0u8; PAGE_SIZE];
    NativeEndian::write_u64(&mut page[8..16], keys.len() as u64);
    let mut at = NODE_HEADER_SIZE;
    for &key in keys {
        NativeEndian::write_i64(&mut page[at..at + 8], key);
        at += KEY_SIZE;
    }
    for &child in children {
        NativeEndian::write_u64(&mut page[at..at + 8], child);
        at += 8;
    }
    page
}

/// Parses a tree page, leaf or internal.
pub fn decode_node(page: &[u8]) -> Result<Node> {
    if page.len() != PAGE_SIZE {
        return errdata!("tree page is {} bytes, want {PAGE_SIZE}", page.len());
    }
    let count = NativeEndian::read_u64(&page[8..16]) as usize;
    match page[0] {
        1 => {
            if count == 0 || count > LEAF_CAPACITY {
                return errdata!("leaf page declares {count} entries");
            }
            let mut entries = Vec::with_capacity(count);
            let mut at = NODE_HEADER_SIZE;
            for _ in 0..count {
                let key = NativeEndian::read_i64(&page[at..at + 8]);
                let value = NativeEndian::read_i64(&page[at + 8..at + 16]);
                entries.push((key, value));
                at += ENTRY_SIZE;
            }
            Ok(Node::Leaf(entries))
        }
        0 => {
            if count == 0 || count > INTERNAL_CAPACITY {
                return errdata!("internal page declares {count} children");
            }
            let mut keys = Vec::with_capacity(count);
            let mut at = NODE_HEADER_SIZE;
            for _ in 0..count {
                keys.push(NativeEndian::read_i64(&page[at..at + 8]));
                at += KEY_SIZE;
            }
            let mut children = Vec::with_capacity(count);
            for _ in 0..count {
                children.push(NativeEndian::read_u64(&page[at..at + 8]));
                at += 8;
            }
            Ok(Node::Internal { keys, children })
        }
        flag => errdata!("unknown node flag {flag}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_header() -> Header {
        Header {
            root_offset: 2 * PAGE_SIZE as u64,
            leaf_start: PAGE_SIZE as u64,
            entry_count: 100,
            level: 0,
            fpr: 0.01,
            filter_offset: 3 * PAGE_SIZE as u64,
            filter_length: 120,
            filter_probes: 7,
            filter_bits: 959,
        }
    }

    #[test]
    fn test_capacities() {
        assert_eq!(LEAF_CAPACITY, 255);
        assert_eq!(INTERNAL_CAPACITY, 254);
    }

    #[test]
    fn test_header_round_trip() {
        let header = valid_header();
        let page = header.encode();
        let decoded = Header::decode(&page, 4 * PAGE_SIZE as u64).expect("decode failed");
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_rejects_zero_entries() {
        let mut header = valid_header();
        header.entry_count = 0;
        assert!(Header::decode(&header.encode(), 4 * PAGE_SIZE as u64).is_err());
    }

    #[test]
    fn test_header_rejects_ragged_file() {
        let header = valid_header();
        assert!(Header::decode(&header.encode(), 4 * PAGE_SIZE as u64 + 17).is_err());
    }

    #[test]
    fn test_header_rejects_filter_past_eof() {
        let header = valid_header();
        assert!(Header::decode(&header.encode(), 3 * PAGE_SIZE as u64).is_err());
    }

    #[test]
    fn test_header_rejects_misplaced_root() {
        let mut header = valid_header();
        header.root_offset = header.filter_offset;
        assert!(Header::decode(&header.encode(), 4 * PAGE_SIZE as u64).is_err());

        header.root_offset = 0;
        assert!(Header::decode(&header.encode(), 4 * PAGE_SIZE as u64).is_err());
    }

    #[test]
    fn test_header_rejects_garbage() {
        let garbage = [0xffu8; PAGE_SIZE];
        assert!(Header::decode(&garbage, 4 * PAGE_SIZE as u64).is_err());
    }

    #[test]
    fn test_leaf_round_trip() {
        let entries: Vec<Entry> = (0..10).map(|i| (i, i * 100)).collect();
        let page = encode_leaf(&entries);
        assert_eq!(decode_node(&page).unwrap(), Node::Leaf(entries));
    }

    #[test]
    fn test_full_leaf_fits() {
        let entries: Vec<Entry> = (0..LEAF_CAPACITY as i64).map(|i| (i, -i)).collect();
        let page = encode_leaf(&entries);
        match decode_node(&page).unwrap() {
            Node::Leaf(decoded) => assert_eq!(decoded, entries),
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_internal_round_trip() {
        let keys: Vec<Key> = vec![10, 20, 30];
        let children: Vec<u64> = vec![4096, 8192, 12288];
        let page = encode_internal(&keys, &children);
        assert_eq!(
            decode_node(&page).unwrap(),
            Node::Internal { keys, children }
        );
    }

    #[test]
    fn test_decode_rejects_bad_flag() {
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 7;
        NativeEndian::write_u64(&mut page[8..16], 1);
        assert!(decode_node(&page).is_err());
    }

    #[test]
    fn test_decode_rejects_overlong_count() {
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 1;
        NativeEndian::write_u64(&mut page[8..16], LEAF_CAPACITY as u64 + 1);
        assert!(decode_node(&page).is_err());
    }
}
