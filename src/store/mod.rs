pub mod database;
pub mod level;

pub use database::{Database, Stats};
pub use level::Level;
