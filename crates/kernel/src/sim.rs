//! The simulation core: one pure function from (snapshot, input, era rules,
//! terrain) to the next snapshot.
//!
//! Phase order inside a tick is fixed:
//! 1. input-driven player acceleration, jump and power activation
//! 2. era gravity and friction
//! 3. collision: player vs tiles (horizontal before vertical), then player
//!    vs enemies, projectiles and hazards
//! 4. power effect application
//! 5. enemy decisions, projectile flight, deflected shots hitting enemies,
//!    timers, checkpoints, spawn table
//! 6. removal of dead entities

use crate::collision::{hits_solid, move_and_collide, penetrates};
use crate::events::SimEvent;
use crate::level::Terrain;
use crate::world::{
    ActivePower, EnemyState, Entity, EntityState, Faction, ProjectileState, World, splitmix64,
};
use chronosta_common::{Aabb, EntityId, EraId, Vec2};
use chronosta_era::{EnemyBehavior, EraDefinition, PowerEffect};
use chronosta_input::TickInput;

/// Top horizontal run speed, units per second.
pub const RUN_SPEED: f32 = 300.0;
/// Horizontal acceleration while a move key is held.
pub const RUN_ACCEL: f32 = 2400.0;
pub const JUMP_SPEED: f32 = 600.0;
pub const STAMINA_REGEN_PER_SEC: f32 = 20.0;
pub const HIT_INVULNERABILITY_TICKS: u32 = 30;
pub const STOMP_BOUNCE: f32 = 350.0;
pub const PROJECTILE_SPEED: f32 = 600.0;
pub const PROJECTILE_LIFETIME_TICKS: u32 = 300;
pub const PROJECTILE_HALF_EXTENTS: Vec2 = Vec2::new(4.0, 4.0);

const CHARGE_TICKS: u32 = 45;
const BLINK_TRIGGER_DISTANCE: f32 = 100.0;
const BLINK_DISTANCE: f32 = 300.0;
const BLINK_COOLDOWN_TICKS: u32 = 300;
/// Stasis is refreshed every tick while the power lasts.
const STASIS_HOLD_TICKS: u32 = 2;
/// How far below an enemy's top the player's feet may have been and still
/// count as landing on it.
const STOMP_TOLERANCE: f32 = 4.0;
/// Horizontal speeds below this snap to zero under friction.
const REST_SPEED: f32 = 1.0;

/// Read-only inputs of a tick besides the snapshot and player input.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub era: &'a EraDefinition,
    pub terrain: &'a Terrain,
    /// Fixed tick length in seconds.
    pub dt: f32,
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct Step {
    pub world: World,
    pub events: Vec<SimEvent>,
}

/// Advance `world` by one tick.
///
/// Pure: all state lives in the returned snapshot, so the same arguments
/// always produce the same result.
pub fn step(world: &World, input: &TickInput, ctx: &StepContext<'_>) -> Step {
    debug_assert_eq!(world.era, ctx.era.id, "step called with rules of another era");
    let _span = tracing::trace_span!("step", tick = world.tick + 1).entered();

    let mut next = world.clone();
    let mut events = Vec::new();
    next.tick += 1;
    next.seed = splitmix64(next.seed);

    let player = next.player_index().filter(|&i| next.entities[i].alive);

    if let Some(idx) = player {
        player_input(&mut next.entities[idx], input, ctx, &mut events);
        player_forces(&mut next.entities[idx], input.horizontal() != 0.0, ctx);
        let prev_bottom = next.entities[idx].bounds().max.y;
        player_vs_terrain(&mut next.entities[idx], ctx);
        player_contacts(&mut next, idx, prev_bottom, &mut events);
        apply_power(&mut next, idx, &mut events);
    }

    let target = player
        .filter(|&i| next.entities[i].alive)
        .map(|i| next.entities[i].position);
    enemy_decisions(&mut next, target, &mut events);
    move_enemies_and_projectiles(&mut next, ctx);
    deflected_hits(&mut next, &mut events);

    if let Some(idx) = player {
        player_timers(&mut next.entities[idx], ctx.dt);
        reach_checkpoints(&mut next, idx, ctx.terrain, &mut events);
        reach_goal(&mut next, idx, ctx.terrain, &mut events);
    }
    run_spawn_table(&mut next, ctx, &mut events);
    next.entities.retain(|e| e.alive);

    tracing::trace!(
        entities = next.entities.len(),
        events = events.len(),
        "tick complete"
    );
    Step {
        world: next,
        events,
    }
}

fn player_input(
    entity: &mut Entity,
    input: &TickInput,
    ctx: &StepContext<'_>,
    events: &mut Vec<SimEvent>,
) {
    let EntityState::Player(p) = &mut entity.state else {
        return;
    };
    let dir = input.horizontal();
    if dir != 0.0 {
        entity.velocity.x = (entity.velocity.x + dir * RUN_ACCEL * ctx.dt).clamp(-RUN_SPEED, RUN_SPEED);
        p.facing = dir;
    }
    if input.jump && p.on_ground {
        entity.velocity.y = -JUMP_SPEED;
        p.on_ground = false;
        events.push(SimEvent::Jumped);
    }

    let power = ctx.era.power;
    let ready = p.power.active.is_none()
        && p.power.cooldown_ticks == 0
        && p.stamina >= power.stamina_cost;
    if input.use_power && ready {
        p.stamina -= power.stamina_cost;
        p.power.cooldown_ticks = power.cooldown_ticks;
        p.power.active = Some(ActivePower {
            effect: power.effect,
            era: ctx.era.id,
            remaining_ticks: power.duration_ticks.max(1),
            airborne: false,
        });
        if let PowerEffect::Slam { impulse, .. } = power.effect {
            entity.velocity.y = -impulse;
            p.on_ground = false;
        }
        events.push(SimEvent::PowerUsed { era: ctx.era.id });
    } else if input.use_power {
        tracing::trace!("power not ready");
    }
}

fn player_forces(entity: &mut Entity, steering: bool, ctx: &StepContext<'_>) {
    let EntityState::Player(p) = &entity.state else {
        return;
    };
    let era = ctx.era;
    entity.velocity.y = (entity.velocity.y + era.gravity * ctx.dt).min(era.max_fall_speed);
    if p.on_ground && !steering {
        entity.velocity.x *= (1.0 - era.friction * ctx.dt).max(0.0);
        if entity.velocity.x.abs() < REST_SPEED {
            entity.velocity.x = 0.0;
        }
    }
}

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

struct Shot {
    by: EntityId,
    from: Vec2,
    dir: Vec2,
    damage: f32,
    era: EraId,
}

fn enemy_decisions(world: &mut World, target: Option<Vec2>, events: &mut Vec<SimEvent>) {
    let mut shots = Vec::new();
    for e in world.entities.iter_mut() {
        if !e.alive {
            continue;
        }
        let EntityState::Enemy(en) = &mut e.state else {
            continue;
        };
        if en.dormant {
            e.velocity = Vec2::ZERO;
            continue;
        }
        en.cooldown_ticks = en.cooldown_ticks.saturating_sub(1);
        if en.stasis_ticks > 0 {
            en.stasis_ticks -= 1;
            e.velocity = Vec2::ZERO;
            continue;
        }
        let Some(target) = target else {
            e.velocity = Vec2::ZERO;
            continue;
        };
        let to = target - e.position;
        let dist = to.length();
        let dir = to.normalize_or_zero();
        let profile = en.profile;

        match profile.behavior {
            EnemyBehavior::Charger => {
                if en.charging {
                    en.ability_ticks = en.ability_ticks.saturating_sub(1);
                    if en.ability_ticks == 0 {
                        en.charging = false;
                        en.cooldown_ticks = profile.attack_cooldown_ticks;
                        e.velocity = Vec2::ZERO;
                    }
                } else if dist < profile.range && en.cooldown_ticks == 0 {
                    en.charging = true;
                    en.ability_ticks = CHARGE_TICKS;
                    e.velocity = Vec2::new(sign(to.x) * profile.charge_speed, 0.0);
                } else {
                    e.velocity = Vec2::new(sign(to.x) * profile.speed, 0.0);
                }
            }
            EnemyBehavior::Archer => {
                let along = sign(to.x);
                if dist < profile.range * 0.5 {
                    e.velocity = Vec2::new(-along * profile.speed, 0.0);
                } else if dist > profile.range {
                    e.velocity = Vec2::new(along * profile.speed, 0.0);
                } else {
                    e.velocity = Vec2::ZERO;
                    if en.cooldown_ticks == 0 {
                        en.cooldown_ticks = profile.attack_cooldown_ticks;
                        shots.push(Shot {
                            by: e.id,
                            from: e.position,
                            dir,
                            damage: profile.projectile_damage,
                            era: en.era,
                        });
                    }
                }
            }
            EnemyBehavior::Drone => {
                en.ability_ticks = en.ability_ticks.saturating_sub(1);
                if dist < BLINK_TRIGGER_DISTANCE && en.ability_ticks == 0 {
                    let away = if dist > 0.0 { -dir } else { Vec2::X };
                    e.position = target + away * BLINK_DISTANCE;
                    e.velocity = Vec2::ZERO;
                    en.ability_ticks = BLINK_COOLDOWN_TICKS;
                } else {
                    e.velocity = dir * profile.speed;
                    if dist < profile.range && en.cooldown_ticks == 0 {
                        en.cooldown_ticks = profile.attack_cooldown_ticks;
                        shots.push(Shot {
                            by: e.id,
                            from: e.position,
                            dir,
                            damage: profile.projectile_damage,
                            era: en.era,
                        });
                    }
                }
            }
        }
    }

    for shot in shots {
        if shot.dir == Vec2::ZERO {
            continue;
        }
        let id = world.spawn_moving(
            shot.from,
            shot.dir * PROJECTILE_SPEED,
            PROJECTILE_HALF_EXTENTS,
            EntityState::Projectile(ProjectileState {
                damage: shot.damage,
                faction: Faction::Hostile,
                era: shot.era,
                lifetime_ticks: PROJECTILE_LIFETIME_TICKS,
                dormant: false,
                stasis_ticks: 0,
            }),
        );
        events.push(SimEvent::ProjectileFired { id, by: shot.by });
    }
}

fn player_vs_terrain(entity: &mut Entity, ctx: &StepContext<'_>) {
    let (pos, vel, contacts) = move_and_collide(
        entity.position,
        entity.velocity,
        entity.half_extents,
        entity.velocity * ctx.dt,
        ctx.terrain,
        &ctx.era.tiles,
    );
    entity.position = pos;
    entity.velocity = vel;
    if let EntityState::Player(p) = &mut entity.state {
        p.on_ground = contacts.landed;
    }
}

fn move_enemies_and_projectiles(world: &mut World, ctx: &StepContext<'_>) {
    for e in world.entities.iter_mut() {
        match &mut e.state {
            EntityState::Enemy(en) if en.is_acting() => {
                e.position += e.velocity * ctx.dt;
            }
            EntityState::Projectile(pr) => {
                if pr.dormant {
                    continue;
                }
                if pr.stasis_ticks > 0 {
                    pr.stasis_ticks -= 1;
                    continue;
                }
                e.position += e.velocity * ctx.dt;
                pr.lifetime_ticks = pr.lifetime_ticks.saturating_sub(1);
                let body = Aabb::from_center(e.position, e.half_extents);
                if pr.lifetime_ticks == 0 || hits_solid(&body, ctx.terrain, &ctx.era.tiles) {
                    e.alive = false;
                }
            }
            _ => {}
        }
    }
}

/// Projectiles turned by the shield damage the first acting enemy they touch.
fn deflected_hits(world: &mut World, events: &mut Vec<SimEvent>) {
    let shots: Vec<(usize, Aabb, f32)> = world
        .entities
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match &e.state {
            EntityState::Projectile(pr)
                if e.alive && !pr.dormant && pr.faction == Faction::Player =>
            {
                Some((i, e.bounds(), pr.damage))
            }
            _ => None,
        })
        .collect();

    for (shot, body, amount) in shots {
        let hit = world.entities.iter().position(|e| {
            e.alive
                && matches!(&e.state, EntityState::Enemy(en) if !en.dormant)
                && penetrates(&body, &e.bounds())
        });
        let Some(hit) = hit else {
            continue;
        };
        world.entities[shot].alive = false;
        let e = &mut world.entities[hit];
        let EntityState::Enemy(en) = &mut e.state else {
            continue;
        };
        en.health -= amount;
        if en.health <= 0.0 {
            e.alive = false;
            world.score += en.profile.score as u64;
            events.push(SimEvent::EnemyDied {
                id: e.id,
                behavior: en.profile.behavior,
            });
        }
    }
}

fn player_contacts(world: &mut World, idx: usize, prev_bottom: f32, events: &mut Vec<SimEvent>) {
    let player_box = world.entities[idx].bounds();
    let falling = world.entities[idx].velocity.y > 0.0;
    let shielded = matches!(&world.entities[idx].state, EntityState::Player(p) if p.power.is_shielded());
    let mut damage = Vec::new();
    let mut stomped = false;

    for (i, e) in world.entities.iter_mut().enumerate() {
        if i == idx || !e.alive {
            continue;
        }
        let other = e.bounds();
        if !penetrates(&player_box, &other) {
            continue;
        }
        match &mut e.state {
            EntityState::Enemy(en) if !en.dormant => {
                if falling && prev_bottom <= other.min.y + STOMP_TOLERANCE {
                    en.health = 0.0;
                    e.alive = false;
                    world.score += en.profile.score as u64;
                    stomped = true;
                    events.push(SimEvent::EnemyDied {
                        id: e.id,
                        behavior: en.profile.behavior,
                    });
                } else if en.stasis_ticks == 0 {
                    damage.push(en.profile.contact_damage);
                }
            }
            EntityState::Projectile(pr)
                if !pr.dormant && pr.stasis_ticks == 0 && pr.faction == Faction::Hostile =>
            {
                if shielded {
                    pr.faction = Faction::Player;
                    pr.lifetime_ticks = PROJECTILE_LIFETIME_TICKS;
                    e.velocity = -e.velocity;
                    events.push(SimEvent::ProjectileDeflected { id: e.id });
                } else {
                    e.alive = false;
                    damage.push(pr.damage);
                }
            }
            EntityState::Hazard(h) if h.active => damage.push(h.damage),
            _ => {}
        }
    }

    let player = &mut world.entities[idx];
    if stomped {
        player.velocity.y = -STOMP_BOUNCE;
    }
    for amount in damage {
        hurt_player(player, amount, events);
    }
}

fn hurt_player(entity: &mut Entity, amount: f32, events: &mut Vec<SimEvent>) {
    let EntityState::Player(p) = &mut entity.state else {
        return;
    };
    if !entity.alive || amount <= 0.0 || p.invulnerable_ticks > 0 || p.power.is_shielded() {
        return;
    }
    p.health = (p.health - amount).max(0.0);
    p.invulnerable_ticks = HIT_INVULNERABILITY_TICKS;
    events.push(SimEvent::PlayerHurt {
        amount,
        health: p.health,
    });
    if p.health <= 0.0 {
        entity.alive = false;
        events.push(SimEvent::PlayerDefeated);
    }
}

fn apply_power(world: &mut World, idx: usize, events: &mut Vec<SimEvent>) {
    let (center, on_ground, active) = {
        let e = &world.entities[idx];
        let EntityState::Player(p) = &e.state else {
            return;
        };
        (e.position, p.on_ground, p.power.active)
    };
    let Some(mut active) = active else {
        return;
    };

    let mut finished = false;
    match active.effect {
        PowerEffect::Slam { radius, damage, .. } => {
            if !on_ground {
                active.airborne = true;
            } else if active.airborne {
                let hits = damage_enemies_within(world, center, radius, damage, events);
                events.push(SimEvent::SlamImpact { hits });
                finished = true;
            }
        }
        PowerEffect::Shield => {}
        PowerEffect::Stasis { radius } => freeze_within(world, center, radius),
    }
    active.remaining_ticks = active.remaining_ticks.saturating_sub(1);
    finished |= active.remaining_ticks == 0;

    if let EntityState::Player(p) = &mut world.entities[idx].state {
        p.power.active = if finished { None } else { Some(active) };
    }
    if finished {
        events.push(SimEvent::PowerEnded { era: active.era });
    }
}

fn damage_enemies_within(
    world: &mut World,
    center: Vec2,
    radius: f32,
    amount: f32,
    events: &mut Vec<SimEvent>,
) -> u32 {
    let mut hits = 0;
    for e in world.entities.iter_mut() {
        if !e.alive || e.position.distance(center) > radius {
            continue;
        }
        let EntityState::Enemy(en) = &mut e.state else {
            continue;
        };
        if en.dormant {
            continue;
        }
        hits += 1;
        en.health -= amount;
        if en.health <= 0.0 {
            e.alive = false;
            world.score += en.profile.score as u64;
            events.push(SimEvent::EnemyDied {
                id: e.id,
                behavior: en.profile.behavior,
            });
        }
    }
    hits
}

fn freeze_within(world: &mut World, center: Vec2, radius: f32) {
    for e in world.entities.iter_mut() {
        if !e.alive || e.position.distance(center) > radius {
            continue;
        }
        match &mut e.state {
            EntityState::Enemy(en) if !en.dormant => {
                en.stasis_ticks = en.stasis_ticks.max(STASIS_HOLD_TICKS);
                en.charging = false;
                e.velocity = Vec2::ZERO;
            }
            EntityState::Projectile(pr) if !pr.dormant && pr.faction == Faction::Hostile => {
                pr.stasis_ticks = pr.stasis_ticks.max(STASIS_HOLD_TICKS);
            }
            _ => {}
        }
    }
}

fn player_timers(entity: &mut Entity, dt: f32) {
    let EntityState::Player(p) = &mut entity.state else {
        return;
    };
    p.stamina = (p.stamina + STAMINA_REGEN_PER_SEC * dt).min(p.max_stamina);
    p.power.cooldown_ticks = p.power.cooldown_ticks.saturating_sub(1);
    p.invulnerable_ticks = p.invulnerable_ticks.saturating_sub(1);
}

fn reach_checkpoints(world: &mut World, idx: usize, terrain: &Terrain, events: &mut Vec<SimEvent>) {
    if !world.entities[idx].alive {
        return;
    }
    let body = world.entities[idx].bounds();
    for (i, cp) in terrain.checkpoints.iter().enumerate() {
        if world.meta.last_checkpoint.is_some_and(|r| i <= r) {
            continue;
        }
        if body.overlaps(cp) {
            world.meta.last_checkpoint = Some(i);
            events.push(SimEvent::CheckpointReached { index: i });
        }
    }
}

fn reach_goal(world: &mut World, idx: usize, terrain: &Terrain, events: &mut Vec<SimEvent>) {
    let Some(goal) = &terrain.goal else {
        return;
    };
    if world.meta.completed || !world.entities[idx].alive {
        return;
    }
    if world.entities[idx].bounds().overlaps(goal) {
        world.meta.completed = true;
        events.push(SimEvent::LevelCompleted);
    }
}

fn run_spawn_table(world: &mut World, ctx: &StepContext<'_>, events: &mut Vec<SimEvent>) {
    let points = &ctx.terrain.spawn_points;
    if points.is_empty() {
        return;
    }
    for rule in &ctx.era.spawn_table {
        if rule.every_ticks == 0 || world.tick % rule.every_ticks as u64 != 0 {
            continue;
        }
        let alive = world
            .entities
            .iter()
            .filter(|e| {
                e.alive
                    && matches!(&e.state, EntityState::Enemy(en)
                        if en.era == ctx.era.id && en.profile.behavior == rule.profile.behavior)
            })
            .count();
        if alive >= rule.max_alive as usize {
            continue;
        }
        let point = points[(world.seed % points.len() as u64) as usize];
        let id = world.spawn(
            point,
            rule.profile.half_extents,
            EntityState::Enemy(EnemyState::new(rule.profile, ctx.era.id)),
        );
        events.push(SimEvent::EnemySpawned {
            id,
            behavior: rule.profile.behavior,
        });
    }
}
