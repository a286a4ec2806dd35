use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Tephra errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// close() was called on a database that is already closed.
    AlreadyClosed,
    /// open() was called on a database that is already open.
    AlreadyOpen,
    /// The page cache could not make room: every frame pinned, eviction
    /// disabled at capacity, or the directory saturated at its maximum
    /// global depth.
    CacheFull(String),
    /// The memtable cannot accept an entry and flushing did not free space.
    Full,
    /// Invalid data, typically decoding errors, corruption, or unexpected internal values.
    InvalidData(String),
    /// Invalid user input, typically parser or argument errors.
    InvalidInput(String),
    /// An IO error.
    IO(String),
    /// An operation was attempted on a database that is not open.
    NotOpen,
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::AlreadyClosed => write!(f, "database is already closed"),
            Error::AlreadyOpen => write!(f, "database is already open"),
            Error::CacheFull(msg) => write!(f, "page cache full: {msg}"),
            Error::Full => write!(f, "memtable full"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::NotOpen => write!(f, "database is not open"),
        }
    }
}

/// Constructs an Error::InvalidData for the given format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::error::Error::InvalidData(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)).into() };
}

/// A Tephra Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}
