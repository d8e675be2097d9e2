//! precache - cache-first offline worker
//!
//! Precaches a fixed asset list into a named, versioned bucket at install
//! time, then answers requests from that bucket before falling back to the
//! network.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod ui;
pub mod worker;

pub use error::{PrecacheError, PrecacheResult};
