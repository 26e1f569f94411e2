use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chronosta_common::EraId;
use chronosta_kernel::World;
use serde::{Deserialize, Serialize};

use crate::CheckpointError;

/// Why a checkpoint was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    Quick,
    Manual,
    /// Written when the player reaches a level checkpoint.
    Checkpoint,
    /// Written on quit; removed once resumed from.
    Suspend,
}

/// Where a checkpoint lives. Each slot maps to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotId {
    Quick(u8),
    Manual(u8),
    Checkpoint,
    Suspend,
}

impl SlotId {
    pub fn kind(self) -> SaveKind {
        match self {
            Self::Quick(_) => SaveKind::Quick,
            Self::Manual(_) => SaveKind::Manual,
            Self::Checkpoint => SaveKind::Checkpoint,
            Self::Suspend => SaveKind::Suspend,
        }
    }

    /// File stem of the slot, also its textual form: `quick-0`, `manual-2`,
    /// `checkpoint`, `suspend`.
    pub fn stem(self) -> String {
        match self {
            Self::Quick(n) => format!("quick-{n}"),
            Self::Manual(n) => format!("manual-{n}"),
            Self::Checkpoint => "checkpoint".to_string(),
            Self::Suspend => "suspend".to_string(),
        }
    }

    /// Reject numbered slots at or beyond `max_slots`.
    pub fn validate(self, max_slots: u8) -> Result<Self, CheckpointError> {
        match self {
            Self::Quick(n) | Self::Manual(n) if n >= max_slots => Err(
                CheckpointError::InvalidSlot(format!("{self} (only {max_slots} slots per kind)")),
            ),
            _ => Ok(self),
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

impl FromStr for SlotId {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "checkpoint" => return Ok(Self::Checkpoint),
            "suspend" => return Ok(Self::Suspend),
            _ => {}
        }
        let invalid = || CheckpointError::InvalidSlot(s.clone());
        let (kind, n) = s.split_once('-').ok_or_else(invalid)?;
        let n: u8 = n.parse().map_err(|_| invalid())?;
        match kind {
            "quick" => Ok(Self::Quick(n)),
            "manual" => Ok(Self::Manual(n)),
            _ => Err(invalid()),
        }
    }
}

/// One persisted snapshot with the context needed to resume from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub slot: SlotId,
    pub kind: SaveKind,
    pub era: EraId,
    /// Wall-clock save time, unix milliseconds.
    pub saved_at_ms: u64,
    pub world: World,
}

impl CheckpointRecord {
    pub fn new(slot: SlotId, world: World, era: EraId) -> Self {
        Self {
            slot,
            kind: slot.kind(),
            era,
            saved_at_ms: now_ms(),
            world,
        }
    }

    pub fn summary(&self) -> SlotSummary {
        SlotSummary {
            slot: self.slot,
            kind: self.kind,
            era: self.era,
            tick: self.world.tick(),
            level: self.world.meta().level.clone(),
            saved_at_ms: self.saved_at_ms,
        }
    }
}

/// What `list` reports per slot without handing out whole worlds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot: SlotId,
    pub kind: SaveKind,
    pub era: EraId,
    pub tick: u64,
    pub level: String,
    pub saved_at_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_text_form() {
        for slot in [
            SlotId::Quick(0),
            SlotId::Manual(2),
            SlotId::Checkpoint,
            SlotId::Suspend,
        ] {
            assert_eq!(slot.to_string().parse::<SlotId>().unwrap(), slot);
        }
        assert_eq!("Quick-1".parse::<SlotId>().unwrap(), SlotId::Quick(1));
        assert!("quick".parse::<SlotId>().is_err());
        assert!("auto-1".parse::<SlotId>().is_err());
        assert!("manual-x".parse::<SlotId>().is_err());
    }

    #[test]
    fn slot_bounds() {
        assert!(SlotId::Quick(2).validate(3).is_ok());
        assert!(matches!(
            SlotId::Manual(3).validate(3),
            Err(CheckpointError::InvalidSlot(_))
        ));
        assert!(SlotId::Checkpoint.validate(0).is_ok());
        assert!(SlotId::Suspend.validate(0).is_ok());
        assert_eq!(SlotId::Suspend.kind(), SaveKind::Suspend);
    }

    #[test]
    fn record_takes_kind_from_slot() {
        let world = World::new("lvl", EraId::Prehistoric, 1);
        let rec = CheckpointRecord::new(SlotId::Manual(1), world, EraId::Prehistoric);
        assert_eq!(rec.kind, SaveKind::Manual);
        assert!(rec.saved_at_ms > 0);
        let summary = rec.summary();
        assert_eq!(summary.tick, 0);
        assert_eq!(summary.level, "lvl");
    }
}
