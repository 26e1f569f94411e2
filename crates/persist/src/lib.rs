//! Chronosta persistence: checkpoint slots on disk and the background I/O
//! worker that owns them.
//!
//! # Invariants
//! - A slot file is replaced atomically; a torn write is never loadable.
//! - Every decode, hash or schema failure of a slot file is reported as
//!   [`CheckpointError::Corrupt`]; nothing partially decoded reaches the
//!   caller.
//! - The store refuses to open a directory written with another schema.

pub mod record;
pub mod store;
pub mod worker;

pub use record::{CheckpointRecord, SaveKind, SlotId, SlotSummary};
pub use store::{CheckpointStore, SCHEMA_VERSION, StoreMeta};
pub use worker::{CheckpointWorker, Completion};

/// Errors from checkpoint persistence.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("no checkpoint in slot {0}")]
    NotFound(SlotId),
    #[error("checkpoint in slot {slot} is corrupt: {reason}")]
    Corrupt { slot: SlotId, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("schema version mismatch: store has v{found}, expected v{expected}")]
    SchemaMismatch { found: u32, expected: u32 },
    #[error("invalid slot: {0}")]
    InvalidSlot(String),
    #[error("checkpoint in slot {slot} belongs to level '{found}', not '{expected}'")]
    WrongLevel {
        slot: SlotId,
        found: String,
        expected: String,
    },
    #[error("checkpoint worker has stopped")]
    WorkerGone,
}

impl CheckpointError {
    /// The failure came from the environment rather than from what is (or
    /// is not) stored, so retrying the same job is unlikely to help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Encode(_) | Self::SchemaMismatch { .. } | Self::WorkerGone
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(CheckpointError::Io(std::io::Error::other("disk")).is_fatal());
        assert!(CheckpointError::WorkerGone.is_fatal());
        assert!(!CheckpointError::NotFound(SlotId::Quick(0)).is_fatal());
        assert!(
            !CheckpointError::Corrupt {
                slot: SlotId::Checkpoint,
                reason: "hash".into()
            }
            .is_fatal()
        );
        assert!(
            !CheckpointError::WrongLevel {
                slot: SlotId::Quick(1),
                found: "a".into(),
                expected: "b".into()
            }
            .is_fatal()
        );
    }
}
