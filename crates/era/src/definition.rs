use chronosta_common::{EraId, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Surface material of a terrain tile. Which materials are solid depends on
/// the active era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileMaterial {
    /// Bedrock; solid in every era.
    Stone,
    /// Overgrowth that only exists before civilisation.
    Vine,
    /// Bridges and scaffolds built in the middle ages.
    Timber,
    /// Energy barriers of the far future.
    Forcefield,
}

/// Tile rule set of an era.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRules {
    pub solid: BTreeSet<TileMaterial>,
}

impl TileRules {
    pub fn is_solid(&self, material: TileMaterial) -> bool {
        self.solid.contains(&material)
    }

    fn of(materials: &[TileMaterial]) -> Self {
        Self {
            solid: materials.iter().copied().collect(),
        }
    }
}

/// Movement and attack pattern of an enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyBehavior {
    /// Walks toward the player and charges when close.
    Charger,
    /// Keeps its distance and fires arrows.
    Archer,
    /// Flies, fires energy bolts and blinks away when approached.
    Drone,
}

/// Stats an enemy is spawned with. Copied into the entity at spawn time so
/// the simulation never has to look up an inactive era.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyProfile {
    pub behavior: EnemyBehavior,
    pub health: f32,
    /// Cruise speed in units per second.
    pub speed: f32,
    /// Speed while charging (chargers only).
    pub charge_speed: f32,
    /// Distance at which the enemy engages the player.
    pub range: f32,
    /// Ticks between attacks or charges.
    pub attack_cooldown_ticks: u32,
    pub contact_damage: f32,
    pub projectile_damage: f32,
    pub half_extents: Vec2,
    pub score: u32,
}

/// Periodic spawning of one enemy type while its era is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnRule {
    pub profile: EnemyProfile,
    /// Spawn every this many ticks (0 disables the rule).
    pub every_ticks: u32,
    /// Skip spawning while this many enemies of the era are alive.
    pub max_alive: u32,
}

/// What a power does while active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PowerEffect {
    /// Launch upward, then damage every enemy within `radius` on landing.
    Slam { impulse: f32, radius: f32, damage: f32 },
    /// Ignore all incoming damage.
    Shield,
    /// Freeze enemies and hostile projectiles within `radius`.
    Stasis { radius: f32 },
}

/// Era power: effect plus its costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerDefinition {
    pub effect: PowerEffect,
    pub cooldown_ticks: u32,
    pub duration_ticks: u32,
    pub stamina_cost: f32,
}

/// Immutable rule set of one era.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraDefinition {
    pub id: EraId,
    /// Downward acceleration in units per second squared.
    pub gravity: f32,
    /// Horizontal velocity damping per second on the ground.
    pub friction: f32,
    pub max_fall_speed: f32,
    pub power: PowerDefinition,
    pub spawn_table: Vec<SpawnRule>,
    pub tiles: TileRules,
    /// Background tint, for renderers.
    pub color: [u8; 3],
}

impl EraDefinition {
    /// Built-in rules for `id`.
    pub fn builtin(id: EraId) -> Self {
        match id {
            EraId::Prehistoric => Self {
                id,
                gravity: 1400.0,
                friction: 10.0,
                max_fall_speed: 900.0,
                power: PowerDefinition {
                    effect: PowerEffect::Slam {
                        impulse: 700.0,
                        radius: 120.0,
                        damage: 80.0,
                    },
                    cooldown_ticks: 900,
                    duration_ticks: 90,
                    stamina_cost: 20.0,
                },
                spawn_table: vec![SpawnRule {
                    profile: Self::native_enemy(id),
                    every_ticks: 600,
                    max_alive: 3,
                }],
                tiles: TileRules::of(&[TileMaterial::Stone, TileMaterial::Vine]),
                color: [139, 69, 19],
            },
            EraId::Medieval => Self {
                id,
                gravity: 1200.0,
                friction: 8.0,
                max_fall_speed: 800.0,
                power: PowerDefinition {
                    effect: PowerEffect::Shield,
                    cooldown_ticks: 180,
                    duration_ticks: 90,
                    stamina_cost: 20.0,
                },
                spawn_table: vec![SpawnRule {
                    profile: Self::native_enemy(id),
                    every_ticks: 720,
                    max_alive: 2,
                }],
                tiles: TileRules::of(&[TileMaterial::Stone, TileMaterial::Timber]),
                color: [128, 128, 128],
            },
            EraId::Futuristic => Self {
                id,
                gravity: 900.0,
                friction: 4.0,
                max_fall_speed: 700.0,
                power: PowerDefinition {
                    effect: PowerEffect::Stasis { radius: 250.0 },
                    cooldown_ticks: 3600,
                    duration_ticks: 180,
                    stamina_cost: 20.0,
                },
                spawn_table: vec![SpawnRule {
                    profile: Self::native_enemy(id),
                    every_ticks: 900,
                    max_alive: 2,
                }],
                tiles: TileRules::of(&[TileMaterial::Stone, TileMaterial::Forcefield]),
                color: [0, 255, 255],
            },
        }
    }

    /// The enemy type native to `id`.
    pub fn native_enemy(id: EraId) -> EnemyProfile {
        match id {
            EraId::Prehistoric => EnemyProfile {
                behavior: EnemyBehavior::Charger,
                health: 150.0,
                speed: 60.0,
                charge_speed: 240.0,
                range: 200.0,
                attack_cooldown_ticks: 180,
                contact_damage: 10.0,
                projectile_damage: 0.0,
                half_extents: Vec2::new(16.0, 16.0),
                score: 150,
            },
            EraId::Medieval => EnemyProfile {
                behavior: EnemyBehavior::Archer,
                health: 80.0,
                speed: 80.0,
                charge_speed: 0.0,
                range: 300.0,
                attack_cooldown_ticks: 120,
                contact_damage: 10.0,
                projectile_damage: 15.0,
                half_extents: Vec2::new(16.0, 16.0),
                score: 100,
            },
            EraId::Futuristic => EnemyProfile {
                behavior: EnemyBehavior::Drone,
                health: 60.0,
                speed: 90.0,
                charge_speed: 0.0,
                range: 400.0,
                attack_cooldown_ticks: 60,
                contact_damage: 10.0,
                projectile_damage: 12.0,
                half_extents: Vec2::new(16.0, 16.0),
                score: 120,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stone_is_solid_everywhere() {
        for id in EraId::ALL {
            assert!(EraDefinition::builtin(id).tiles.is_solid(TileMaterial::Stone));
        }
    }

    #[test]
    fn era_materials_are_exclusive() {
        let pre = EraDefinition::builtin(EraId::Prehistoric);
        let med = EraDefinition::builtin(EraId::Medieval);
        assert!(pre.tiles.is_solid(TileMaterial::Vine));
        assert!(!med.tiles.is_solid(TileMaterial::Vine));
        assert!(med.tiles.is_solid(TileMaterial::Timber));
        assert!(!pre.tiles.is_solid(TileMaterial::Timber));
    }

    #[test]
    fn power_cooldowns_follow_era() {
        let pre = EraDefinition::builtin(EraId::Prehistoric);
        let med = EraDefinition::builtin(EraId::Medieval);
        let fut = EraDefinition::builtin(EraId::Futuristic);
        assert!(med.power.cooldown_ticks < pre.power.cooldown_ticks);
        assert!(pre.power.cooldown_ticks < fut.power.cooldown_ticks);
        assert!(matches!(fut.power.effect, PowerEffect::Stasis { .. }));
    }

    #[test]
    fn native_enemies_differ_per_era() {
        assert_eq!(
            EraDefinition::native_enemy(EraId::Prehistoric).behavior,
            EnemyBehavior::Charger
        );
        assert_eq!(
            EraDefinition::native_enemy(EraId::Medieval).behavior,
            EnemyBehavior::Archer
        );
        assert_eq!(
            EraDefinition::native_enemy(EraId::Futuristic).behavior,
            EnemyBehavior::Drone
        );
    }
}
