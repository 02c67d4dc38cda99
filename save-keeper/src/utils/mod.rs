//! Utility modules for the save keeper.

pub mod errors;
pub mod logger;

pub use errors::{ErrorKind, KeeperError, Result};
