use chronosta_common::{Aabb, EntityId, EraId, Vec2};
use chronosta_era::{EnemyProfile, PowerEffect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Coarse entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Enemy,
    Projectile,
    Hazard,
}

/// Which side a projectile hurts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    Player,
    Hostile,
}

/// A power currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivePower {
    pub effect: PowerEffect,
    pub era: EraId,
    pub remaining_ticks: u32,
    /// Slam only: set once the player has left the ground after activation.
    pub airborne: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerState {
    pub cooldown_ticks: u32,
    pub active: Option<ActivePower>,
}

impl PowerState {
    pub fn is_shielded(&self) -> bool {
        matches!(
            self.active,
            Some(ActivePower {
                effect: PowerEffect::Shield,
                ..
            })
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub health: f32,
    pub max_health: f32,
    pub stamina: f32,
    pub max_stamina: f32,
    pub on_ground: bool,
    /// -1.0 facing left, 1.0 facing right.
    pub facing: f32,
    pub power: PowerState,
    pub invulnerable_ticks: u32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            health: 100.0,
            max_health: 100.0,
            stamina: 100.0,
            max_stamina: 100.0,
            on_ground: false,
            facing: 1.0,
            power: PowerState::default(),
            invulnerable_ticks: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyState {
    pub profile: EnemyProfile,
    /// Era the enemy belongs to; it is dormant in every other era.
    pub era: EraId,
    pub health: f32,
    pub cooldown_ticks: u32,
    /// Charge time left (chargers) or blink cooldown (drones).
    pub ability_ticks: u32,
    pub charging: bool,
    pub dormant: bool,
    pub stasis_ticks: u32,
}

impl EnemyState {
    pub fn new(profile: EnemyProfile, era: EraId) -> Self {
        Self {
            profile,
            era,
            health: profile.health,
            cooldown_ticks: 0,
            ability_ticks: 0,
            charging: false,
            dormant: false,
            stasis_ticks: 0,
        }
    }

    /// Neither out of era nor held in stasis.
    pub fn is_acting(&self) -> bool {
        !self.dormant && self.stasis_ticks == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    pub damage: f32,
    pub faction: Faction,
    pub era: EraId,
    pub lifetime_ticks: u32,
    pub dormant: bool,
    pub stasis_ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardState {
    pub damage: f32,
    /// Eras in which the hazard exists.
    pub eras: BTreeSet<EraId>,
    pub active: bool,
}

/// Per-kind state carried by an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityState {
    Player(PlayerState),
    Enemy(EnemyState),
    Projectile(ProjectileState),
    Hazard(HazardState),
}

/// One simulated object. Owned by exactly one [`World`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub half_extents: Vec2,
    pub state: EntityState,
    pub alive: bool,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self.state {
            EntityState::Player(_) => EntityKind::Player,
            EntityState::Enemy(_) => EntityKind::Enemy,
            EntityState::Projectile(_) => EntityKind::Projectile,
            EntityState::Hazard(_) => EntityKind::Hazard,
        }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center(self.position, self.half_extents)
    }

    pub fn as_player(&self) -> Option<&PlayerState> {
        match &self.state {
            EntityState::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_enemy(&self) -> Option<&EnemyState> {
        match &self.state {
            EntityState::Enemy(e) => Some(e),
            _ => None,
        }
    }
}

/// Level bookkeeping that travels with a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub level: String,
    /// Index of the furthest level checkpoint reached.
    pub last_checkpoint: Option<usize>,
    /// Set once the player reaches the level goal.
    #[serde(default)]
    pub completed: bool,
}

/// A complete snapshot of the world at one tick.
///
/// The simulation never mutates a snapshot in place: `step` clones the
/// previous one and returns the successor. Entities stay sorted by id
/// because ids only ever grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub(crate) tick: u64,
    pub(crate) era: EraId,
    /// Seed for deterministic randomness, advanced every tick.
    pub(crate) seed: u64,
    pub(crate) next_id: u32,
    pub(crate) entities: Vec<Entity>,
    pub(crate) score: u64,
    pub(crate) meta: CheckpointMeta,
    /// Tick of the last era switch, for the switch cooldown.
    pub(crate) era_switched_at: Option<u64>,
}

impl World {
    /// Empty world at tick 0.
    pub fn new(level: impl Into<String>, era: EraId, seed: u64) -> Self {
        Self {
            tick: 0,
            era,
            seed,
            next_id: 0,
            entities: Vec::new(),
            score: 0,
            meta: CheckpointMeta {
                level: level.into(),
                last_checkpoint: None,
                completed: false,
            },
            era_switched_at: None,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Active era.
    pub fn era(&self) -> EraId {
        self.era
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn meta(&self) -> &CheckpointMeta {
        &self.meta
    }

    pub fn era_switched_at(&self) -> Option<u64> {
        self.era_switched_at
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entities[i])
    }

    pub fn player(&self) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.kind() == EntityKind::Player)
    }

    pub(crate) fn player_index(&self) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| e.kind() == EntityKind::Player)
    }

    /// Add an entity at rest. Returns its id.
    pub fn spawn(&mut self, position: Vec2, half_extents: Vec2, state: EntityState) -> EntityId {
        self.spawn_moving(position, Vec2::ZERO, half_extents, state)
    }

    pub fn spawn_moving(
        &mut self,
        position: Vec2,
        velocity: Vec2,
        half_extents: Vec2,
        state: EntityState,
    ) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.push(Entity {
            id,
            position,
            velocity,
            half_extents,
            state,
            alive: true,
        });
        id
    }

    /// Compute a deterministic hash of the snapshot for comparisons and
    /// desync checks. Floats are hashed by bit pattern.
    pub fn state_hash(&self) -> u64 {
        let mut h = Fnv1a::new();
        h.u64(self.tick);
        h.u64(self.era.index() as u64);
        h.u64(self.seed);
        h.u64(self.next_id as u64);
        h.u64(self.score);
        h.bytes(self.meta.level.as_bytes());
        h.u64(self.meta.last_checkpoint.map_or(u64::MAX, |c| c as u64));
        h.u64(self.meta.completed as u64);
        h.u64(self.era_switched_at.unwrap_or(u64::MAX));
        for e in &self.entities {
            h.u64(e.id.0 as u64);
            h.vec2(e.position);
            h.vec2(e.velocity);
            h.vec2(e.half_extents);
            h.u64(e.alive as u64);
            match &e.state {
                EntityState::Player(p) => {
                    h.u64(0);
                    h.f32(p.health);
                    h.f32(p.max_health);
                    h.f32(p.stamina);
                    h.f32(p.max_stamina);
                    h.u64(p.on_ground as u64);
                    h.f32(p.facing);
                    h.u64(p.power.cooldown_ticks as u64);
                    h.u64(p.invulnerable_ticks as u64);
                    h.u64(p.power.active.is_some() as u64);
                    if let Some(a) = p.power.active {
                        h.power_effect(a.effect);
                        h.u64(a.era.index() as u64);
                        h.u64(a.remaining_ticks as u64);
                        h.u64(a.airborne as u64);
                    }
                }
                EntityState::Enemy(en) => {
                    h.u64(1);
                    h.u64(en.era.index() as u64);
                    h.f32(en.health);
                    h.u64(en.cooldown_ticks as u64);
                    h.u64(en.ability_ticks as u64);
                    h.u64(en.charging as u64);
                    h.u64(en.dormant as u64);
                    h.u64(en.stasis_ticks as u64);
                }
                EntityState::Projectile(pr) => {
                    h.u64(2);
                    h.u64(pr.faction as u64);
                    h.f32(pr.damage);
                    h.u64(pr.era.index() as u64);
                    h.u64(pr.lifetime_ticks as u64);
                    h.u64(pr.dormant as u64);
                    h.u64(pr.stasis_ticks as u64);
                }
                EntityState::Hazard(hz) => {
                    h.u64(3);
                    h.f32(hz.damage);
                    h.u64(hz.active as u64);
                    for era in &hz.eras {
                        h.u64(era.index() as u64);
                    }
                }
            }
        }
        h.finish()
    }
}

/// FNV-1a over little-endian field bytes.
struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    fn bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
        }
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_bits().to_le_bytes());
    }

    fn vec2(&mut self, v: Vec2) {
        self.f32(v.x);
        self.f32(v.y);
    }

    fn power_effect(&mut self, effect: PowerEffect) {
        match effect {
            PowerEffect::Slam {
                impulse,
                radius,
                damage,
            } => {
                self.u64(0);
                self.f32(impulse);
                self.f32(radius);
                self.f32(damage);
            }
            PowerEffect::Shield => self.u64(1),
            PowerEffect::Stasis { radius } => {
                self.u64(2);
                self.f32(radius);
            }
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Splitmix64 step, used to advance the world seed each tick.
pub(crate) fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
