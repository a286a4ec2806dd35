pub mod builder;
pub mod layout;
pub mod table;

pub use builder::{build_run, Builder};
pub use layout::{Header, Node, INTERNAL_CAPACITY, LEAF_CAPACITY, NODE_HEADER_SIZE};
pub use table::{Cursor, Table};
