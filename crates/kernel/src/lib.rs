//! Chronosta kernel: world snapshots, the pure step function, era transitions
//! and level loading.
//!
//! # Invariants
//! - `step` is pure: identical (snapshot, input, era rules, terrain) produce
//!   bit-identical snapshots and events.
//! - Entity ids are allocated from a per-world counter and never reused.
//! - An era switch changes rules and entity tags, never positions or
//!   velocities.

pub mod collision;
pub mod events;
pub mod level;
pub mod sim;
pub mod transition;
pub mod world;

pub use events::SimEvent;
pub use level::{
    EnemyPlacement, HazardPlacement, Level, LevelError, PLAYER_HALF_EXTENTS, Terrain, Tile,
};
pub use sim::{Step, StepContext, step};
pub use transition::{
    SwitchDirection, SwitchError, SwitchGuard, TransitionLock, switch_era, transition_lock,
};
pub use world::{
    ActivePower, CheckpointMeta, EnemyState, Entity, EntityKind, EntityState, Faction,
    HazardState, PlayerState, PowerState, ProjectileState, World,
};
