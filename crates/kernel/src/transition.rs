//! Era switching and its entry side effects.
//!
//! A switch never touches positions or velocities. It changes the active era
//! (and with it the rule set `step` applies) and re-tags what exists in the
//! new era: hazards turn on or off, enemies and their projectiles from other
//! eras go dormant.

use crate::events::SimEvent;
use crate::world::{EntityState, World};
use chronosta_common::EraId;
use chronosta_era::EraRegistry;
use std::fmt;

/// Why an era switch was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionLock {
    /// The player's power is still in effect.
    PowerActive,
    /// A rewind is in progress.
    Rewinding,
    /// The previous switch was too recent.
    Cooldown { remaining_ticks: u64 },
}

impl fmt::Display for TransitionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerActive => f.write_str("power in use"),
            Self::Rewinding => f.write_str("rewinding"),
            Self::Cooldown { remaining_ticks } => {
                write!(f, "cooling down for {remaining_ticks} more ticks")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SwitchError {
    #[error("era switch locked: {0}")]
    Locked(TransitionLock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDirection {
    Forward,
    Back,
}

/// Inputs to the lock check that do not live in the world.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchGuard {
    pub rewinding: bool,
    /// Minimum ticks between two switches; 0 disables the cooldown.
    pub cooldown_ticks: u64,
}

/// The lock currently preventing a switch, if any.
pub fn transition_lock(world: &World, guard: SwitchGuard) -> Option<TransitionLock> {
    if guard.rewinding {
        return Some(TransitionLock::Rewinding);
    }
    let power_active = world
        .player()
        .and_then(|p| p.as_player())
        .is_some_and(|p| p.power.active.is_some());
    if power_active {
        return Some(TransitionLock::PowerActive);
    }
    if let Some(at) = world.era_switched_at {
        let ready_at = at.saturating_add(guard.cooldown_ticks);
        if world.tick < ready_at {
            return Some(TransitionLock::Cooldown {
                remaining_ticks: ready_at - world.tick,
            });
        }
    }
    None
}

/// Switch to the next or previous era. Returns the new snapshot and the
/// event to announce, or the lock that prevented the switch.
pub fn switch_era(
    world: &World,
    registry: &EraRegistry,
    direction: SwitchDirection,
    guard: SwitchGuard,
) -> Result<(World, SimEvent), SwitchError> {
    if let Some(lock) = transition_lock(world, guard) {
        tracing::debug!(%lock, "era switch refused");
        return Err(SwitchError::Locked(lock));
    }
    let from = world.era;
    let to = match direction {
        SwitchDirection::Forward => registry.next(from),
        SwitchDirection::Back => registry.prev(from),
    };
    let mut next = world.clone();
    apply_era_entry(&mut next, to);
    next.era_switched_at = Some(next.tick);
    if let Some(idx) = next.player_index() {
        if let EntityState::Player(p) = &mut next.entities[idx].state {
            p.power.cooldown_ticks = 0;
        }
    }
    tracing::debug!(%from, %to, tick = next.tick, "era switched");
    Ok((next, SimEvent::EraSwitched { from, to }))
}

/// Make `era` active and re-tag entities for it.
pub(crate) fn apply_era_entry(world: &mut World, era: EraId) {
    world.era = era;
    for e in &mut world.entities {
        match &mut e.state {
            EntityState::Enemy(en) => en.dormant = en.era != era,
            EntityState::Projectile(pr) => pr.dormant = pr.era != era,
            EntityState::Hazard(hz) => hz.active = hz.eras.contains(&era),
            EntityState::Player(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::world::ActivePower;
    use chronosta_era::PowerEffect;

    fn guard() -> SwitchGuard {
        SwitchGuard::default()
    }

    #[test]
    fn switch_forward_and_back_restores_rules_and_motion() {
        let registry = EraRegistry::builtin();
        let world = Level::demo().initial_world();
        let (fwd, ev) = switch_era(&world, &registry, SwitchDirection::Forward, guard()).unwrap();
        assert_eq!(
            ev,
            SimEvent::EraSwitched {
                from: EraId::Medieval,
                to: EraId::Futuristic
            }
        );
        assert_eq!(fwd.era(), EraId::Futuristic);
        let (back, _) = switch_era(&fwd, &registry, SwitchDirection::Back, guard()).unwrap();
        assert_eq!(back.era(), world.era());
        assert_eq!(registry.get(back.era()), registry.get(world.era()));
        for (a, b) in world.entities().iter().zip(back.entities()) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.velocity, b.velocity);
            assert_eq!(a.state, b.state);
        }
    }

    #[test]
    fn switch_never_moves_entities() {
        let registry = EraRegistry::builtin();
        let world = Level::demo().initial_world();
        let (next, _) = switch_era(&world, &registry, SwitchDirection::Back, guard()).unwrap();
        assert_eq!(next.era(), EraId::Prehistoric);
        for (a, b) in world.entities().iter().zip(next.entities()) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.velocity, b.velocity);
        }
    }

    #[test]
    fn entry_retags_hazards_and_enemies() {
        let registry = EraRegistry::builtin();
        let world = Level::demo().initial_world();
        let (pre, _) = switch_era(&world, &registry, SwitchDirection::Back, guard()).unwrap();
        for e in pre.entities() {
            match &e.state {
                EntityState::Enemy(en) => {
                    assert_eq!(en.dormant, en.era != EraId::Prehistoric)
                }
                EntityState::Hazard(h) => assert!(h.active),
                _ => {}
            }
        }
    }

    #[test]
    fn rewinding_locks_switch() {
        let registry = EraRegistry::builtin();
        let world = Level::demo().initial_world();
        let g = SwitchGuard {
            rewinding: true,
            cooldown_ticks: 0,
        };
        assert_eq!(
            switch_era(&world, &registry, SwitchDirection::Forward, g).unwrap_err(),
            SwitchError::Locked(TransitionLock::Rewinding)
        );
    }

    #[test]
    fn active_power_locks_switch() {
        let registry = EraRegistry::builtin();
        let mut world = Level::demo().initial_world();
        if let EntityState::Player(p) = &mut world.entities[0].state {
            p.power.active = Some(ActivePower {
                effect: PowerEffect::Shield,
                era: EraId::Medieval,
                remaining_ticks: 5,
                airborne: false,
            });
        }
        assert_eq!(
            transition_lock(&world, guard()),
            Some(TransitionLock::PowerActive)
        );
        assert!(switch_era(&world, &registry, SwitchDirection::Forward, guard()).is_err());
    }

    #[test]
    fn cooldown_locks_until_elapsed() {
        let registry = EraRegistry::builtin();
        let world = Level::demo().initial_world();
        let g = SwitchGuard {
            rewinding: false,
            cooldown_ticks: 30,
        };
        let (mut next, _) = switch_era(&world, &registry, SwitchDirection::Forward, g).unwrap();
        assert_eq!(
            transition_lock(&next, g),
            Some(TransitionLock::Cooldown {
                remaining_ticks: 30
            })
        );
        next.tick += 30;
        assert_eq!(transition_lock(&next, g), None);
    }

    #[test]
    fn switch_resets_power_cooldown() {
        let registry = EraRegistry::builtin();
        let mut world = Level::demo().initial_world();
        if let EntityState::Player(p) = &mut world.entities[0].state {
            p.power.cooldown_ticks = 500;
        }
        let (next, _) = switch_era(&world, &registry, SwitchDirection::Forward, guard()).unwrap();
        assert_eq!(next.player().unwrap().as_player().unwrap().power.cooldown_ticks, 0);
    }
}
