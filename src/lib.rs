//! modeltier - model artifact cache tier
//!
//! Validates identifiers before they reach the filesystem, places fetched
//! artifacts onto a fast local storage tier with crash-safe atomic renames,
//! and decides which models stay resident using LRU eviction plus usage
//! pattern prediction.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod placement;
pub mod provider;
pub mod validate;

pub use error::{TierError, TierResult};
