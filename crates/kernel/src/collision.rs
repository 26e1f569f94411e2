//! Player vs tile geometry.
//!
//! Movement is split into sub-steps no longer than half the body's smallest
//! extent so a body cannot pass through a tile within one tick. Within each
//! sub-step the horizontal axis is resolved before the vertical one.

use crate::level::Terrain;
use chronosta_common::{Aabb, Vec2};
use chronosta_era::TileRules;

/// Penetration below this depth is treated as touching, not overlapping.
const SKIN: f32 = 1e-3;

/// Upper bound on sub-steps for one move.
const MAX_SUBSTEPS: u32 = 64;

/// What the body hit while moving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Contacts {
    pub landed: bool,
    pub ceiling: bool,
    pub wall: bool,
}

/// True when the boxes overlap by more than [`SKIN`] on both axes.
pub fn penetrates(a: &Aabb, b: &Aabb) -> bool {
    a.min.x < b.max.x - SKIN
        && a.max.x > b.min.x + SKIN
        && a.min.y < b.max.y - SKIN
        && a.max.y > b.min.y + SKIN
}

/// Move a box through `displacement`, stopping against solid tiles.
///
/// Returns the resolved centre, the velocity with blocked axes zeroed, and
/// the contacts made.
pub fn move_and_collide(
    position: Vec2,
    velocity: Vec2,
    half_extents: Vec2,
    displacement: Vec2,
    terrain: &Terrain,
    rules: &TileRules,
) -> (Vec2, Vec2, Contacts) {
    let mut pos = position;
    let mut vel = velocity;
    let mut contacts = Contacts::default();

    let max_step = half_extents.x.min(half_extents.y).max(SKIN * 10.0);
    let longest = displacement.x.abs().max(displacement.y.abs());
    let substeps = ((longest / max_step).ceil() as u32).clamp(1, MAX_SUBSTEPS);
    let mut step = displacement / substeps as f32;

    for _ in 0..substeps {
        if step.x != 0.0 {
            pos.x += step.x;
            let body = Aabb::from_center(pos, half_extents);
            if let Some(tile) = first_hit(&body, terrain, rules) {
                pos.x = if step.x > 0.0 {
                    tile.min.x - half_extents.x
                } else {
                    tile.max.x + half_extents.x
                };
                vel.x = 0.0;
                step.x = 0.0;
                contacts.wall = true;
            }
        }
        if step.y != 0.0 {
            pos.y += step.y;
            let body = Aabb::from_center(pos, half_extents);
            if let Some(tile) = first_hit(&body, terrain, rules) {
                if step.y > 0.0 {
                    pos.y = tile.min.y - half_extents.y;
                    contacts.landed = true;
                } else {
                    pos.y = tile.max.y + half_extents.y;
                    contacts.ceiling = true;
                }
                vel.y = 0.0;
                step.y = 0.0;
            }
        }
    }
    (pos, vel, contacts)
}

/// True when `body` penetrates any tile solid under `rules`.
pub fn hits_solid(body: &Aabb, terrain: &Terrain, rules: &TileRules) -> bool {
    first_hit(body, terrain, rules).is_some()
}

fn first_hit(body: &Aabb, terrain: &Terrain, rules: &TileRules) -> Option<Aabb> {
    terrain
        .solid_tiles(rules)
        .find(|tile| penetrates(body, tile))
        .copied()
}
