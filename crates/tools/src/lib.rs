//! Developer tooling: read-only inspection of snapshots and the rewind
//! timeline.
//!
//! # Invariants
//! - Tools never mutate the world or the timeline.

pub mod inspector;

pub use inspector::{EntityInfo, TimelineSummary, WorldInspector, WorldSummary};
