//! The LSM engine.
//!
//! A `Database` owns the memtable, the levels of sorted runs, and the
//! shared page cache. Writes land in the memtable; a full memtable flushes
//! to a new level-0 run and the compaction policy then merges the two
//! oldest runs of any level holding two or more, pushing the result one
//! level deeper. Reads walk the visibility order youngest to oldest and a
//! tombstone hit resolves as absent without consulting older sources.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::buffer::{BufferPool, PageId};
use crate::config::Config;
use crate::errinput;
use crate::error::{Error, Result};
use crate::memtable::{InsertOutcome, Memtable};
use crate::sstable::{build_run, Table};
use crate::types::{Entry, Key, Value, TOMBSTONE};

use super::level::Level;

/// Compaction triggers when a level holds this many runs.
const COMPACTION_TRIGGER: usize = 2;

pub struct Database {
    name: String,
    dir: PathBuf,
    config: Config,
    memtable: Option<Memtable>,
    levels: Vec<Level>,
    pool: Rc<RefCell<BufferPool>>,
    counter: u64,
    open: bool,
}

impl Database {
    /// Creates a closed database handle; `open` makes it usable.
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let name = name.into();
        let dir = config.dir.join(&name);
        let pool = BufferPool::new(
            config.cache_initial_depth,
            config.cache_max_depth,
            config.cache_bucket_pages,
            config.cache_pages_max,
        )
        .flood_threshold(config.cache_flood_threshold_pages)
        .write_back(Box::new(write_back_page));

        Self {
            name,
            dir,
            config,
            memtable: None,
            levels: Vec::new(),
            pool: Rc::new(RefCell::new(pool)),
            counter: 0,
            open: false,
        }
    }

    /// Opens the database: ensures the directory exists, allocates the
    /// memtable, and loads every parseable run from disk. Corrupt runs are
    /// skipped with a warning, not fatal.
    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::AlreadyOpen);
        }
        fs::create_dir_all(&self.dir)?;
        self.memtable = Some(Memtable::new(self.config.memtable_max_entries));
        self.load_runs()?;
        self.open = true;

        tracing::info!(
            name = %self.name,
            runs = self.levels.iter().map(Level::len).sum::<usize>(),
            levels = self.levels.len(),
            "Opened database"
        );
        Ok(())
    }

    /// Closes the database, flushing a non-empty memtable first. Levels
    /// stay resident so the handle can be reopened.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::AlreadyClosed);
        }
        if self.memtable.as_ref().is_some_and(|m| !m.is_empty()) {
            self.flush()?;
        }
        self.memtable = None;
        self.open = false;
        tracing::info!(name = %self.name, "Closed database");
        Ok(())
    }

    /// Inserts or replaces a pair. The tombstone sentinel is rejected as a
    /// user value. A full memtable flushes and the insert retries once.
    pub fn put(&mut self, key: Key, value: Value) -> Result<()> {
        if value == TOMBSTONE {
            return errinput!("value {value} is reserved as the delete marker");
        }
        self.write(key, value)
    }

    /// Logically deletes a key by writing the tombstone sentinel.
    pub fn delete(&mut self, key: Key) -> Result<()> {
        self.write(key, TOMBSTONE)
    }

    /// Point lookup in visibility order: memtable, then every level's runs
    /// newest to oldest. The first hit wins; a tombstone hit is absent.
    pub fn get(&self, key: Key) -> Result<Option<Value>> {
        let memtable = self.memtable.as_ref().ok_or(Error::NotOpen)?;
        if let Some(value) = memtable.get(key) {
            return Ok(live(value));
        }
        for level in &self.levels {
            for run in level.runs.iter().rev() {
                if let Some(value) = run.get(key)? {
                    return Ok(live(value));
                }
            }
        }
        Ok(None)
    }

    /// Range scan over `lo..=hi`: every source from oldest to youngest is
    /// folded into a key-indexed accumulator so younger writes overwrite
    /// older ones, then tombstoned keys are dropped.
    pub fn scan(&self, lo: Key, hi: Key) -> Result<Vec<Entry>> {
        let memtable = self.memtable.as_ref().ok_or(Error::NotOpen)?;
        if lo > hi {
            return errinput!("scan range {lo} > {hi}");
        }

        let mut acc = BTreeMap::new();
        for level in self.levels.iter().rev() {
            for run in &level.runs {
                if hi < run.min_key() || lo > run.max_key() {
                    continue;
                }
                for (key, value) in run.range_scan(lo, hi)? {
                    acc.insert(key, value);
                }
            }
        }
        for (key, value) in memtable.range(lo, hi) {
            acc.insert(key, value);
        }

        Ok(acc
            .into_iter()
            .filter(|&(_, value)| value != TOMBSTONE)
            .collect())
    }

    /// Diagnostic snapshot; available whether open or closed.
    pub fn stats(&self) -> Stats {
        Stats {
            name: self.name.clone(),
            open: self.open,
            memtable_entries: self.memtable.as_ref().map_or(0, Memtable::len),
            memtable_capacity: self.config.memtable_max_entries,
            runs_per_level: self.levels.iter().map(Level::len).collect(),
            cached_pages: self.pool.borrow().page_count(),
            cache_capacity: self.pool.borrow().max_pages(),
            dir: self.dir.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Materializes the memtable as a new level-0 run, then runs the
    /// compaction policy. A no-op on an empty memtable.
    pub fn flush(&mut self) -> Result<()> {
        let memtable = self.memtable.as_ref().ok_or(Error::NotOpen)?;
        let (Some(first), Some(last)) = (memtable.first_key(), memtable.last_key()) else {
            return Ok(());
        };
        let snapshot = memtable.range(first, last);

        let path = self.next_run_path(0);
        build_run(
            &path,
            0,
            self.config.bloom_fpr(),
            snapshot.len(),
            snapshot.iter().copied(),
        )?;
        let run = Table::open(&path, self.pool.clone(), self.config.search_mode)?;

        if self.levels.is_empty() {
            self.levels.push(Level::new(0));
        }
        tracing::info!(
            name = %self.name,
            path = %path.display(),
            entries = run.entry_count(),
            "Flushed memtable to level 0"
        );
        self.levels[0].runs.push(run);
        if let Some(memtable) = self.memtable.as_mut() {
            memtable.clear();
        }

        self.compact()
    }

    fn write(&mut self, key: Key, value: Value) -> Result<()> {
        let memtable = self.memtable.as_mut().ok_or(Error::NotOpen)?;
        match memtable.insert(key, value) {
            InsertOutcome::Inserted | InsertOutcome::Updated => Ok(()),
            InsertOutcome::Full => {
                self.flush()?;
                let memtable = self.memtable.as_mut().ok_or(Error::NotOpen)?;
                match memtable.insert(key, value) {
                    InsertOutcome::Inserted | InsertOutcome::Updated => Ok(()),
                    InsertOutcome::Full => Err(Error::Full),
                }
            }
        }
    }

    /// Size-tiered policy, trigger 2: while any level holds two or more
    /// runs, merge its two oldest into the next level down and continue
    /// upward, so a cascade settles in one pass.
    fn compact(&mut self) -> Result<()> {
        let mut level = 0;
        while level < self.levels.len() {
            while self.levels[level].len() >= COMPACTION_TRIGGER {
                let older = self.levels[level].runs.remove(0);
                let younger = self.levels[level].runs.remove(0);
                let target = level + 1;
                let path = self.next_run_path(target);

                match Table::merge(&older, &younger, target as u64, &path) {
                    Ok(merged) => {
                        while self.levels.len() <= target {
                            let number = self.levels.len();
                            self.levels.push(Level::new(number));
                        }
                        tracing::info!(
                            source_level = level,
                            target_level = target,
                            entries = merged.entry_count(),
                            "Compacted two runs"
                        );
                        self.levels[target].runs.push(merged);
                        for run in [older, younger] {
                            if let Err(err) = fs::remove_file(run.path()) {
                                tracing::warn!(
                                    path = %run.path().display(),
                                    error = %err,
                                    "Failed to delete compacted run file"
                                );
                            }
                        }
                    }
                    Err(err) => {
                        // Put the pair back where it was and report; the
                        // engine stays usable.
                        let _ = fs::remove_file(&path);
                        self.levels[level].runs.insert(0, younger);
                        self.levels[level].runs.insert(0, older);
                        tracing::warn!(level = level, error = %err, "Compaction failed");
                        return Err(err);
                    }
                }
            }
            level += 1;
        }
        Ok(())
    }

    /// Loads runs by directory enumeration: files matching the run naming
    /// pattern are opened and placed on their recorded level, ordered by
    /// (timestamp, counter) so the last run of a level is the youngest.
    /// Unknown files are ignored; unreadable runs are skipped.
    fn load_runs(&mut self) -> Result<()> {
        let mut found: Vec<(usize, u64, u64, PathBuf)> = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((level, timestamp, counter)) = parse_run_filename(name) else {
                continue;
            };
            self.counter = self.counter.max(counter + 1);
            found.push((level, timestamp, counter, path));
        }
        found.sort_by_key(|&(level, timestamp, counter, _)| (level, timestamp, counter));

        self.levels = Vec::new();
        for (level, _, _, path) in found {
            let run = match Table::open(&path, self.pool.clone(), self.config.search_mode) {
                Ok(run) => run,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Skipping corrupt run");
                    continue;
                }
            };
            while self.levels.len() <= level {
                let number = self.levels.len();
                self.levels.push(Level::new(number));
            }
            self.levels[level].runs.push(run);
        }
        Ok(())
    }

    fn next_run_path(&mut self, level: usize) -> PathBuf {
        self.counter += 1;
        self.dir.join(format!(
            "sst_L{}_{}_{}.sst",
            level,
            timestamp_ms(),
            self.counter
        ))
    }
}

fn live(value: Value) -> Option<Value> {
    (value != TOMBSTONE).then_some(value)
}

fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Parses `sst_L<level>_<timestamp_ms>_<counter>.sst`.
fn parse_run_filename(name: &str) -> Option<(usize, u64, u64)> {
    let rest = name.strip_prefix("sst_L")?.strip_suffix(".sst")?;
    let mut parts = rest.split('_');
    let level = parts.next()?.parse().ok()?;
    let timestamp = parts.next()?.parse().ok()?;
    let counter = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((level, timestamp, counter))
}

/// Writes an evicted dirty page back to its file at the recorded offset.
/// The file handle is opened per call and closed on return.
fn write_back_page(id: &PageId, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(id.file.as_ref())?;
    file.seek(SeekFrom::Start(id.offset))?;
    file.write_all(bytes)?;
    Ok(())
}

/// Diagnostic counters for the `stats` shell command.
#[derive(Debug, Clone)]
pub struct Stats {
    pub name: String,
    pub open: bool,
    pub memtable_entries: usize,
    pub memtable_capacity: usize,
    pub runs_per_level: Vec<usize>,
    pub cached_pages: usize,
    pub cache_capacity: usize,
    pub dir: PathBuf,
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Database Statistics ===")?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Status: {}", if self.open { "Open" } else { "Closed" })?;
        writeln!(
            f,
            "Memtable: {}/{} entries",
            self.memtable_entries, self.memtable_capacity
        )?;
        for (level, count) in self.runs_per_level.iter().enumerate() {
            writeln!(f, "Level {level}: {count} run(s)")?;
        }
        writeln!(
            f,
            "Cache: {}/{} pages",
            self.cached_pages, self.cache_capacity
        )?;
        write!(f, "Directory: {}", self.dir.display())
    }
}
