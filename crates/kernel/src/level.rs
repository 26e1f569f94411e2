//! Level description: static terrain plus the initial population.

use crate::transition::apply_era_entry;
use crate::world::{EnemyState, EntityState, HazardState, PlayerState, World};
use chronosta_common::{Aabb, EraId, Vec2};
use chronosta_era::{EnemyProfile, EraDefinition, TileMaterial, TileRules};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Player collision half extents (a 32x64 body).
pub const PLAYER_HALF_EXTENTS: Vec2 = Vec2::new(16.0, 32.0);

/// Errors from loading a level description.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("level parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid level '{level}': {reason}")]
    Invalid { level: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub bounds: Aabb,
    pub material: TileMaterial,
}

/// Static level geometry shared by every snapshot of a level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Terrain {
    pub tiles: Vec<Tile>,
    /// Trigger volumes, in the order the player is expected to reach them.
    #[serde(default)]
    pub checkpoints: Vec<Aabb>,
    /// Where spawn-table enemies appear.
    #[serde(default)]
    pub spawn_points: Vec<Vec2>,
    /// Reaching this volume completes the level.
    #[serde(default)]
    pub goal: Option<Aabb>,
}

impl Terrain {
    /// Tiles that are solid under `rules`.
    pub fn solid_tiles<'a>(&'a self, rules: &'a TileRules) -> impl Iterator<Item = &'a Aabb> + 'a {
        self.tiles
            .iter()
            .filter(move |t| rules.is_solid(t.material))
            .map(|t| &t.bounds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyPlacement {
    pub position: Vec2,
    pub era: EraId,
    /// Overrides the era's native enemy.
    #[serde(default)]
    pub profile: Option<EnemyProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardPlacement {
    pub bounds: Aabb,
    pub damage: f32,
    pub eras: BTreeSet<EraId>,
}

/// Everything needed to start a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    pub start_era: EraId,
    #[serde(default)]
    pub seed: u64,
    pub player_spawn: Vec2,
    pub terrain: Terrain,
    #[serde(default)]
    pub enemies: Vec<EnemyPlacement>,
    #[serde(default)]
    pub hazards: Vec<HazardPlacement>,
    /// Level to load once the goal is reached; the run ends when absent.
    #[serde(default)]
    pub next_level: Option<String>,
}

impl Level {
    pub fn from_yaml(src: &str) -> Result<Self, LevelError> {
        let level: Level = serde_yaml::from_str(src)?;
        level.validate()?;
        Ok(level)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_yaml(&src)
    }

    pub fn to_yaml(&self) -> Result<String, LevelError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), LevelError> {
        let invalid = |reason: String| LevelError::Invalid {
            level: self.name.clone(),
            reason,
        };
        for (i, tile) in self.terrain.tiles.iter().enumerate() {
            let size = tile.bounds.max - tile.bounds.min;
            if size.x <= 0.0 || size.y <= 0.0 {
                return Err(invalid(format!("tile {i} has no area")));
            }
        }
        for (i, hazard) in self.hazards.iter().enumerate() {
            if hazard.eras.is_empty() {
                return Err(invalid(format!("hazard {i} exists in no era")));
            }
        }
        let spawn = Aabb::from_center(self.player_spawn, PLAYER_HALF_EXTENTS);
        let stone = TileRules {
            solid: [TileMaterial::Stone].into_iter().collect(),
        };
        if crate::collision::hits_solid(&spawn, &self.terrain, &stone) {
            return Err(invalid("player spawn overlaps stone".into()));
        }
        if self.next_level.as_deref() == Some(self.name.as_str()) {
            return Err(invalid("level names itself as next".into()));
        }
        Ok(())
    }

    /// Build the tick-0 snapshot: player first, then enemies, then hazards,
    /// with era-entry tagging applied for the starting era.
    pub fn initial_world(&self) -> World {
        let mut world = World::new(self.name.clone(), self.start_era, self.seed);
        world.spawn(
            self.player_spawn,
            PLAYER_HALF_EXTENTS,
            EntityState::Player(PlayerState::default()),
        );
        for placement in &self.enemies {
            let profile = placement
                .profile
                .unwrap_or_else(|| EraDefinition::native_enemy(placement.era));
            world.spawn(
                placement.position,
                profile.half_extents,
                EntityState::Enemy(EnemyState::new(profile, placement.era)),
            );
        }
        for hazard in &self.hazards {
            world.spawn(
                hazard.bounds.center(),
                hazard.bounds.half_extents(),
                EntityState::Hazard(HazardState {
                    damage: hazard.damage,
                    eras: hazard.eras.clone(),
                    active: true,
                }),
            );
        }
        apply_era_entry(&mut world, self.start_era);
        world
    }

    /// A small level exercising every era rule: a vine ledge, a timber
    /// bridge over a pit, a forcefield gate, hazards, two checkpoints and a goal
    /// at the far wall.
    pub fn demo() -> Self {
        let tile = |x0: f32, y0: f32, x1: f32, y1: f32, material| Tile {
            bounds: Aabb::new(Vec2::new(x0, y0), Vec2::new(x1, y1)),
            material,
        };
        Self {
            name: "demo".into(),
            start_era: EraId::Medieval,
            seed: 0x5eed,
            player_spawn: Vec2::new(100.0, 568.0),
            terrain: Terrain {
                tiles: vec![
                    tile(0.0, 600.0, 800.0, 640.0, TileMaterial::Stone),
                    tile(1000.0, 600.0, 2000.0, 640.0, TileMaterial::Stone),
                    tile(800.0, 600.0, 1000.0, 620.0, TileMaterial::Timber),
                    tile(300.0, 480.0, 450.0, 500.0, TileMaterial::Vine),
                    tile(1400.0, 400.0, 1420.0, 600.0, TileMaterial::Forcefield),
                    tile(-20.0, 0.0, 0.0, 600.0, TileMaterial::Stone),
                    tile(2000.0, 0.0, 2020.0, 600.0, TileMaterial::Stone),
                ],
                checkpoints: vec![
                    Aabb::new(Vec2::new(700.0, 500.0), Vec2::new(740.0, 600.0)),
                    Aabb::new(Vec2::new(1500.0, 500.0), Vec2::new(1540.0, 600.0)),
                ],
                spawn_points: vec![Vec2::new(1800.0, 584.0), Vec2::new(250.0, 584.0)],
                goal: Some(Aabb::new(Vec2::new(1940.0, 500.0), Vec2::new(2000.0, 600.0))),
            },
            enemies: vec![
                EnemyPlacement {
                    position: Vec2::new(600.0, 584.0),
                    era: EraId::Prehistoric,
                    profile: None,
                },
                EnemyPlacement {
                    position: Vec2::new(1200.0, 584.0),
                    era: EraId::Medieval,
                    profile: None,
                },
                EnemyPlacement {
                    position: Vec2::new(1600.0, 450.0),
                    era: EraId::Futuristic,
                    profile: None,
                },
            ],
            hazards: vec![HazardPlacement {
                bounds: Aabb::new(Vec2::new(1100.0, 590.0), Vec2::new(1150.0, 600.0)),
                damage: 20.0,
                eras: [EraId::Prehistoric, EraId::Futuristic].into_iter().collect(),
            }],
            next_level: None,
        }
    }
}
