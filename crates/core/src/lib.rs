//! `imagen-core` -- domain types and pure logic shared by every imagen crate.
//!
//! Nothing in here touches the network, the broker, or the reference
//! document on disk.  Modules that need I/O (`imagen-store`,
//! `imagen-queue`, `imagen-engine`, `imagen-worker`) build on top of these
//! types and functions.

pub mod admission;
pub mod catalog;
pub mod error;
pub mod imaging;
pub mod naming;
pub mod params;
pub mod progress;
pub mod prompt;
pub mod references;
pub mod retry;
pub mod types;
