//! LRU and predictive cache state for the cache tier
//!
//! [`CacheStateManager`] decides what stays resident. It keeps entries in
//! recency order, tracks per-model usage histograms, evicts least recently
//! used entries once the tier is over its target size, and hints at models
//! likely to be requested in the next hour.
//!
//! # Persisted state
//!
//! | File | Contents |
//! |------|----------|
//! | `<root>/cache/cache_metadata.json` | Resident entries |
//! | `<root>/cache/usage_patterns.json` | Per-model histograms |
//! | `<root>/cache/.delete_<id>-<hash>` | Deletion marker for an evicted artifact |

pub mod entry;
pub mod index;
pub mod manager;
pub mod persist;
pub mod prefetch;
pub mod reclaim;
pub mod tasks;

pub use entry::{CacheEntry, UsagePattern};
pub use index::{CacheIndex, CacheStats, Eviction};
pub use manager::{CacheStateManager, ClearReport, LoadOutcome};
pub use prefetch::{LogTrigger, PrefetchTrigger};
pub use reclaim::{DeletionMarker, ReclaimReport};
pub use tasks::BackgroundTasks;
