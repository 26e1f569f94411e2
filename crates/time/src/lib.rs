//! Chronosta time: the fixed-step clock, the rewind timeline and the
//! time-mode state machine.
//!
//! # Invariants
//! - The clock never emits more than `max_steps` ticks per `advance`.
//! - Timeline ticks are strictly increasing and its length never exceeds
//!   capacity.
//! - Rewinding replaces the live snapshot with a stored one; it never runs
//!   the simulation.

pub mod clock;
pub mod controller;
pub mod timeline;

pub use clock::{ClockConfig, FixedClock, TickBatch};
pub use controller::{RewindStep, TimeConfig, TimeController, TimeMode};
pub use timeline::{TimelineBuffer, TimelineConfig};

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("cannot rewind {requested} ticks, only {available} stored behind the head")]
    Empty { requested: usize, available: usize },
    #[error("clock fell behind; discarded {discarded:?} of simulation time")]
    Overflow { discarded: Duration },
    #[error("{request} rejected while {mode}")]
    Rejected {
        request: &'static str,
        mode: TimeMode,
    },
}

#[cfg(test)]
pub(crate) mod test_support {
    use chronosta_common::EraId;
    use chronosta_era::EraDefinition;
    use chronosta_input::TickInput;
    use chronosta_kernel::{StepContext, Terrain, World, step};
    use std::sync::Arc;

    /// Snapshots of an empty world at ticks 1..=n.
    pub fn history(n: usize) -> Vec<Arc<World>> {
        let era = EraDefinition::builtin(EraId::Medieval);
        let terrain = Terrain::default();
        let ctx = StepContext {
            era: &era,
            terrain: &terrain,
            dt: 1.0 / 60.0,
        };
        let mut world = World::new("history", EraId::Medieval, 1);
        (0..n)
            .map(|_| {
                world = step(&world, &TickInput::default(), &ctx).world;
                Arc::new(world.clone())
            })
            .collect()
    }
}
