//! Era registry: per-era rule sets and the cyclic era order.
//!
//! # Invariants
//! - Definitions are immutable after load and shared by `Arc`.
//! - Every [`EraId`] has exactly one definition.
//! - Era behaviour is data; the simulation applies it uniformly.

pub mod definition;
pub mod registry;

pub use chronosta_common::EraId;
pub use definition::{
    EnemyBehavior, EnemyProfile, EraDefinition, PowerDefinition, PowerEffect, SpawnRule,
    TileMaterial, TileRules,
};
pub use registry::{EraError, EraRegistry};
