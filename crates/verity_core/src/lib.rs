//! VERITY Core Types
//!
//! Hashes, node identifiers and millisecond time shared by every crate.
//! Pure types, no I/O beyond reading the system clock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hash;
pub mod id;
pub mod time;

// Re-exports
pub use hash::{Hash, HashError};
pub use id::NodeId;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
