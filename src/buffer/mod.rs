pub mod page;
pub mod pool;

pub use page::{EvictionPriority, Frame, FrameRef, FrameTable, PageId};
pub use pool::{BufferPool, ScanGuard, WriteBack};
