//! Bottom-up construction of a sorted run file.
//!
//! Pairs stream in ascending key order. Leaves are written as they fill,
//! recording each leaf's last key and offset; internal layers are then
//! built over the previous layer until a single root page remains, the
//! filter region follows, and the header is written last by seeking back
//! to page 0.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::error::Result;
use crate::filter::BloomFilter;
use crate::types::{Entry, Key, Value, PAGE_SIZE};
use crate::{errdata, errinput};

use super::layout::{encode_internal, encode_leaf, Header, INTERNAL_CAPACITY, LEAF_CAPACITY};

pub struct Builder {
    file: File,
    path: PathBuf,
    level: u64,
    fpr: f64,
    filter: BloomFilter,
    leaf_buf: Vec<Entry>,
    /// (last key, file offset) of every written leaf, in order.
    leaves: Vec<(Key, u64)>,
    last_key: Option<Key>,
    entry_count: u64,
    offset: u64,
}

impl Builder {
    /// Creates the run file and reserves the header page. `expected`
    /// sizes the filter; it may overestimate the final entry count.
    pub fn new(path: impl AsRef<Path>, level: u64, fpr: f64, expected: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path)?;
        file.write_all(&[0u8; PAGE_SIZE])?;

        Ok(Self {
            file,
            path,
            level,
            fpr,
            filter: BloomFilter::new(expected, fpr),
            leaf_buf: Vec::with_capacity(LEAF_CAPACITY),
            leaves: Vec::new(),
            last_key: None,
            entry_count: 0,
            offset: PAGE_SIZE as u64,
        })
    }

    /// Appends a pair. Keys must arrive strictly ascending and unique.
    pub fn add(&mut self, key: Key, value: Value) -> Result<()> {
        if let Some(last) = self.last_key {
            if key <= last {
                return errdata!("key {key} not above predecessor {last}");
            }
        }
        self.last_key = Some(key);
        self.filter.add(key);
        self.leaf_buf.push((key, value));
        self.entry_count += 1;
        if self.leaf_buf.len() == LEAF_CAPACITY {
            self.flush_leaf()?;
        }
        Ok(())
    }

    /// Writes the internal layers, filter region, and header, consuming
    /// the builder. Fails on an empty run.
    pub fn finish(mut self) -> Result<PathBuf> {
        if self.entry_count == 0 {
            return errinput!("cannot build an empty run");
        }
        if !self.leaf_buf.is_empty() {
            self.flush_leaf()?;
        }

        // Build internal layers over the leaf offsets until one page
        // remains; a single-leaf run keeps that leaf as its root.
        let mut layer = std::mem::take(&mut self.leaves);
        while layer.len() > 1 {
            let mut next = Vec::new();
            let chunks: Vec<Vec<(Key, u64)>> = layer
                .iter()
                .copied()
                .chunks(INTERNAL_CAPACITY)
                .into_iter()
                .map(|chunk| chunk.collect())
                .collect();
            for group in chunks {
                let keys: Vec<Key> = group.iter().map(|&(key, _)| key).collect();
                let children: Vec<u64> = group.iter().map(|&(_, offset)| offset).collect();
                self.file.write_all(&encode_internal(&keys, &children))?;
                next.push((keys[keys.len() - 1], self.offset));
                self.offset += PAGE_SIZE as u64;
            }
            layer = next;
        }
        let root_offset = layer[0].1;

        // Filter region, zero padded to a whole page.
        let filter_offset = self.offset;
        let filter_bytes = self.filter.as_bytes();
        let filter_pages = filter_bytes.len().div_ceil(PAGE_SIZE);
        let mut region = vec![0u8; filter_pages * PAGE_SIZE];
        region[..filter_bytes.len()].copy_from_slice(filter_bytes);
        self.file.write_all(&region)?;
        self.offset += region.len() as u64;

        let header = Header {
            root_offset,
            leaf_start: PAGE_SIZE as u64,
            entry_count: self.entry_count,
            level: self.level,
            fpr: self.fpr,
            filter_offset,
            filter_length: filter_bytes.len() as u64,
            filter_probes: self.filter.num_probes(),
            filter_bits: self.filter.num_bits(),
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.encode())?;
        self.file.flush()?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entry_count,
            leaves = header.leaf_pages(),
            level = self.level,
            "Built sorted run"
        );
        Ok(self.path)
    }

    fn flush_leaf(&mut self) -> Result<()> {
        let last = self.leaf_buf[self.leaf_buf.len() - 1].0;
        self.file.write_all(&encode_leaf(&self.leaf_buf))?;
        self.leaves.push((last, self.offset));
        self.offset += PAGE_SIZE as u64;
        self.leaf_buf.clear();
        Ok(())
    }
}

/// Builds a run at `path` from an ascending pair stream in one call.
pub fn build_run(
    path: impl AsRef<Path>,
    level: u64,
    fpr: f64,
    expected: usize,
    pairs: impl IntoIterator<Item = Entry>,
) -> Result<PathBuf> {
    let mut builder = Builder::new(path, level, fpr, expected)?;
    for (key, value) in pairs {
        builder.add(key, value)?;
    }
    builder.finish()
}
