use std::sync::Arc;

use crate::hasher::hash64;
use crate::types::PAGE_SIZE;

/// Identity of one 4 KiB page: the owning file and the byte offset of the
/// page start within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    pub file: Arc<str>,
    pub offset: u64,
}

impl PageId {
    pub fn new(file: impl Into<Arc<str>>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }

    /// 64-bit hash mixing the file identity and the offset. The directory
    /// indexes by the low bits of this value.
    pub fn hash(&self) -> u64 {
        let mut buf = Vec::with_capacity(self.file.len() + 8);
        buf.extend_from_slice(self.file.as_bytes());
        buf.extend_from_slice(&self.offset.to_ne_bytes());
        hash64(&buf, 0)
    }
}

/// Eviction preference of a cached page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPriority {
    #[default]
    Normal,
    /// Demoted by a flooding scan; the next eviction pass takes it even if
    /// its reference bit is set.
    ScanLow,
}

/// One cached page and its replacement metadata.
#[derive(Debug)]
pub struct Frame {
    pub id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
    pub valid: bool,
    pub reference: bool,
    pub pin_count: u32,
    pub dirty: bool,
    pub priority: EvictionPriority,
}

impl Frame {
    pub fn new(id: PageId, bytes: &[u8]) -> Self {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data.copy_from_slice(bytes);
        Self {
            id,
            data,
            valid: true,
            reference: false,
            pin_count: 0,
            dirty: false,
            priority: EvictionPriority::Normal,
        }
    }
}

/// Reference to a frame slot, valid only while the generation matches.
/// Buckets and the clock ring store these instead of raw pointers, so a
/// slot reused after eviction can never be mistaken for the old page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef {
    pub slot: usize,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    frame: Option<Frame>,
}

/// Generational slot arena owning every cached page buffer.
#[derive(Debug, Default)]
pub struct FrameTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl FrameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame: Frame) -> FrameRef {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        self.slots[slot].frame = Some(frame);
        self.live += 1;
        FrameRef {
            slot,
            generation: self.slots[slot].generation,
        }
    }

    pub fn get(&self, fref: FrameRef) -> Option<&Frame> {
        let slot = self.slots.get(fref.slot)?;
        if slot.generation != fref.generation {
            return None;
        }
        slot.frame.as_ref()
    }

    pub fn get_mut(&mut self, fref: FrameRef) -> Option<&mut Frame> {
        let slot = self.slots.get_mut(fref.slot)?;
        if slot.generation != fref.generation {
            return None;
        }
        slot.frame.as_mut()
    }

    /// Frees the slot and bumps its generation, invalidating every
    /// outstanding reference to it.
    pub fn remove(&mut self, fref: FrameRef) -> Option<Frame> {
        let slot = self.slots.get_mut(fref.slot)?;
        if slot.generation != fref.generation {
            return None;
        }
        let frame = slot.frame.take()?;
        slot.generation += 1;
        self.free.push(fref.slot);
        self.live -= 1;
        Some(frame)
    }

    /// Number of live frames.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}
