use std::fmt;

use chronosta_common::{EntityId, EraId};
use chronosta_kernel::{EntityKind, EntityState, World};
use chronosta_time::TimelineBuffer;

/// Read-only queries against snapshots for debugging and CLI output.
pub struct WorldInspector;

impl WorldInspector {
    pub fn summary(world: &World) -> WorldSummary {
        let count = |kind: EntityKind| world.entities().iter().filter(|e| e.kind() == kind).count();
        let player = world.player().and_then(|e| e.as_player().map(|p| (e, p)));
        WorldSummary {
            level: world.meta().level.clone(),
            tick: world.tick(),
            era: world.era(),
            seed: world.seed(),
            score: world.score(),
            players: count(EntityKind::Player),
            enemies: count(EntityKind::Enemy),
            projectiles: count(EntityKind::Projectile),
            hazards: count(EntityKind::Hazard),
            player_health: player.map(|(_, p)| p.health),
            player_position: player.map(|(e, _)| [e.position.x, e.position.y]),
            last_checkpoint: world.meta().last_checkpoint,
            completed: world.meta().completed,
            state_hash: world.state_hash(),
        }
    }

    pub fn inspect_entity(world: &World, id: EntityId) -> Option<EntityInfo> {
        world.entity(id).map(|e| {
            let detail = match &e.state {
                EntityState::Player(p) => format!(
                    "health={:.0}/{:.0} stamina={:.0} grounded={} power={}",
                    p.health,
                    p.max_health,
                    p.stamina,
                    p.on_ground,
                    if p.power.active.is_some() { "active" } else { "idle" },
                ),
                EntityState::Enemy(en) => format!(
                    "{:?} of {} health={:.0}{}{}",
                    en.profile.behavior,
                    en.era,
                    en.health,
                    if en.dormant { " dormant" } else { "" },
                    if en.stasis_ticks > 0 { " frozen" } else { "" },
                ),
                EntityState::Projectile(pr) => {
                    format!("{:?} damage={:.0} ttl={}", pr.faction, pr.damage, pr.lifetime_ticks)
                }
                EntityState::Hazard(h) => format!(
                    "damage={:.0} {}",
                    h.damage,
                    if h.active { "active" } else { "inactive" }
                ),
            };
            EntityInfo {
                id,
                kind: e.kind(),
                position: [e.position.x, e.position.y],
                velocity: [e.velocity.x, e.velocity.y],
                detail,
            }
        })
    }

    pub fn list_entities(world: &World) -> Vec<EntityId> {
        world.entities().iter().map(|e| e.id).collect()
    }

    /// Shape of the rewind history. `tick_rate_hz` converts its span to
    /// seconds.
    pub fn timeline(timeline: &TimelineBuffer, tick_rate_hz: u32) -> TimelineSummary {
        let oldest = timeline.oldest_tick();
        let newest = timeline.head().map(|w| w.tick());
        let span_ticks = match (oldest, newest) {
            (Some(o), Some(n)) => n - o,
            _ => 0,
        };
        TimelineSummary {
            len: timeline.len(),
            capacity: timeline.capacity(),
            oldest,
            newest,
            span_secs: span_ticks as f32 / tick_rate_hz.max(1) as f32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldSummary {
    pub level: String,
    pub tick: u64,
    pub era: EraId,
    pub seed: u64,
    pub score: u64,
    pub players: usize,
    pub enemies: usize,
    pub projectiles: usize,
    pub hazards: usize,
    pub player_health: Option<f32>,
    pub player_position: Option<[f32; 2]>,
    pub last_checkpoint: Option<usize>,
    pub completed: bool,
    pub state_hash: u64,
}

impl fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "World '{}': tick={} era={} score={} enemies={} projectiles={} hazards={}",
            self.level,
            self.tick,
            self.era,
            self.score,
            self.enemies,
            self.projectiles,
            self.hazards
        )?;
        match (self.player_health, self.player_position) {
            (Some(h), Some([x, y])) => write!(f, " player=({x:.1}, {y:.1}) hp={h:.0}")?,
            _ => f.write_str(" player=none")?,
        }
        if let Some(cp) = self.last_checkpoint {
            write!(f, " checkpoint={cp}")?;
        }
        if self.completed {
            f.write_str(" completed")?;
        }
        write!(f, " hash={:#018x}", self.state_hash)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub detail: String,
}

impl fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} pos=({:.2}, {:.2}) vel=({:.2}, {:.2}) {}",
            self.id,
            self.kind,
            self.position[0],
            self.position[1],
            self.velocity[0],
            self.velocity[1],
            self.detail
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSummary {
    pub len: usize,
    pub capacity: usize,
    pub oldest: Option<u64>,
    pub newest: Option<u64>,
    pub span_secs: f32,
}

impl fmt::Display for TimelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.oldest, self.newest) {
            (Some(o), Some(n)) => write!(
                f,
                "Timeline: {}/{} snapshots, ticks {o}..={n} ({:.2}s)",
                self.len, self.capacity, self.span_secs
            ),
            _ => write!(f, "Timeline: empty (capacity {})", self.capacity),
        }
    }
}
