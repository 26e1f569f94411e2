use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an entity, unique within one world snapshot.
///
/// Allocated from a counter stored on the world itself, which keeps id
/// assignment deterministic across replays and rewinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One of the three eras the player can travel between.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EraId {
    Prehistoric,
    #[default]
    Medieval,
    Futuristic,
}

impl EraId {
    /// All eras in their cyclic order.
    pub const ALL: [EraId; 3] = [EraId::Prehistoric, EraId::Medieval, EraId::Futuristic];

    /// Position of this era in [`EraId::ALL`].
    pub fn index(self) -> usize {
        match self {
            EraId::Prehistoric => 0,
            EraId::Medieval => 1,
            EraId::Futuristic => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EraId::Prehistoric => "prehistoric",
            EraId::Medieval => "medieval",
            EraId::Futuristic => "futuristic",
        }
    }
}

impl fmt::Display for EraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Axis-aligned bounding box in world units (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Box centred on `center` extending `half_extents` along each axis.
    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Strict overlap test: boxes that only touch along an edge do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}
