//! Chronosta game session: the single-threaded loop tying the clock, time
//! controller, timeline, era registry and checkpoints around the pure
//! simulation step.
//!
//! # Invariants
//! - The session owns the only mutable copy of the live world; readers get
//!   `Arc<World>` snapshots.
//! - Refused or failed requests surface as [`GameEvent::Reported`] and never
//!   stop the loop.
//! - A completed checkpoint load is applied between frames: world and era
//!   replaced, timeline cleared, time mode back to normal.

pub mod config;
pub mod events;
pub mod session;

pub use config::{ConfigError, EraConfig, GameConfig, SaveConfig};
pub use events::{EventSink, GameEvent, LogSink, Report};
pub use session::{FrameStats, FrameView, GameSession};
