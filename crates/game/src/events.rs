use std::fmt;

use chronosta_common::EraId;
use chronosta_kernel::{SimEvent, TransitionLock};
use chronosta_persist::{SlotId, SlotSummary};
use chronosta_time::{TimeError, TimeMode};

/// Everything the session tells its listeners about.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Sim(SimEvent),
    EraSwitched { from: EraId, to: EraId },
    TimeModeChanged { from: TimeMode, to: TimeMode },
    /// The live snapshot was replaced by an older one.
    Rewound { tick: u64 },
    CheckpointSaved(SlotSummary),
    CheckpointLoaded { slot: SlotId, era: EraId, tick: u64 },
    /// The player reached the goal of `level`.
    LevelCompleted {
        level: String,
        next_level: Option<String>,
    },
    /// Something was refused or failed; the session keeps running.
    Reported(Report),
}

/// A condition surfaced to the player or log instead of aborting the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    SwitchLocked(TransitionLock),
    Time(TimeError),
    Checkpoint { message: String, fatal: bool },
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwitchLocked(lock) => write!(f, "era switch locked: {lock}"),
            Self::Time(e) => write!(f, "{e}"),
            Self::Checkpoint { message, fatal } => {
                write!(f, "checkpoint: {message}")?;
                if *fatal {
                    f.write_str(" (fatal)")?;
                }
                Ok(())
            }
        }
    }
}

/// Receiver of session events, e.g. audio or UI. Fire and forget: nothing
/// a sink does feeds back into the simulation.
pub trait EventSink {
    fn notify(&mut self, event: &GameEvent);
}

/// Collects events, mostly for tests and tools.
impl EventSink for Vec<GameEvent> {
    fn notify(&mut self, event: &GameEvent) {
        self.push(event.clone());
    }
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn notify(&mut self, event: &GameEvent) {
        match event {
            GameEvent::Reported(report) => tracing::warn!(%report, "reported"),
            GameEvent::Sim(ev) => tracing::trace!(?ev, "sim event"),
            GameEvent::LevelCompleted { level, next_level } => {
                tracing::info!(%level, next = ?next_level, "level completed");
            }
            other => tracing::debug!(event = ?other, "game event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_display() {
        let r = Report::Checkpoint {
            message: "disk full".into(),
            fatal: true,
        };
        assert_eq!(r.to_string(), "checkpoint: disk full (fatal)");
        let r = Report::SwitchLocked(TransitionLock::Rewinding);
        assert_eq!(r.to_string(), "era switch locked: rewinding");
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<GameEvent> = Vec::new();
        sink.notify(&GameEvent::Rewound { tick: 3 });
        assert_eq!(sink, vec![GameEvent::Rewound { tick: 3 }]);
    }
}
