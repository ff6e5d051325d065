//! Atomic artifact placement
//!
//! Every artifact reaches the cache tier the same way: validate the
//! identifier and target, take the host-wide lock, fetch into a staging
//! directory, verify it, then rename it into place. Readers never see a
//! partially written artifact.

pub mod clean;
pub mod coordinator;
pub mod fetcher;
pub mod lock;
pub mod staging;

pub use clean::{CleanReport, Leftover, LeftoverKind};
pub use coordinator::{PlacedArtifact, PlacementCoordinator};
pub use fetcher::{FetcherRegistry, ProviderFetcher};
pub use lock::PlacementLock;
pub use staging::{ArtifactShape, StagingArea};
