use chronosta_common::{EntityId, EraId};
use chronosta_era::EnemyBehavior;
use serde::{Deserialize, Serialize};

/// Discrete notification produced while advancing the world.
///
/// Consumers (audio, UI) receive these fire-and-forget; the simulation never
/// reads them back, so dropping them cannot change the outcome of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    Jumped,
    PowerUsed { era: EraId },
    PowerEnded { era: EraId },
    SlamImpact { hits: u32 },
    EraSwitched { from: EraId, to: EraId },
    EnemySpawned { id: EntityId, behavior: EnemyBehavior },
    EnemyDied { id: EntityId, behavior: EnemyBehavior },
    ProjectileFired { id: EntityId, by: EntityId },
    /// A hostile projectile bounced off the shield and now hurts enemies.
    ProjectileDeflected { id: EntityId },
    PlayerHurt { amount: f32, health: f32 },
    PlayerDefeated,
    CheckpointReached { index: usize },
    /// The player entered the level goal. Emitted once per level.
    LevelCompleted,
}
