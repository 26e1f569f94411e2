//! Shared types for the chronosta time core.
//!
//! # Invariants
//! - Entity ids are allocated by the owning world, never randomly, so replays
//!   allocate identical ids.
//! - Era ids form a fixed, closed set.

pub mod types;

pub use glam::Vec2;
pub use types::{Aabb, EntityId, EraId};
