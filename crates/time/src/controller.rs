//! Time-mode state machine: normal play, slow motion, pause and rewind.
//!
//! The controller decides how fast simulated time runs and whether ticks
//! are simulated or replayed from the timeline. It holds no world state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chronosta_kernel::World;
use serde::{Deserialize, Serialize};

use crate::TimeError;
use crate::timeline::TimelineBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    #[default]
    Normal,
    SlowMotion,
    Paused,
    Rewinding,
}

impl fmt::Display for TimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::SlowMotion => "slow motion",
            Self::Paused => "paused",
            Self::Rewinding => "rewinding",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Time scale while slow motion is held; kept in (0, 1).
    pub slow_motion_factor: f32,
    /// Longest single slow-motion stretch in real seconds; 0 means unlimited.
    pub slow_motion_limit_secs: f32,
    /// Real seconds before slow motion can be used again after hitting the limit.
    pub slow_motion_cooldown_secs: f32,
    /// Snapshots restored per clock tick while rewinding.
    pub rewind_rate: u32,
    /// Depth of a rewind triggered by the rewind action.
    pub rewind_request_ticks: u32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            slow_motion_factor: 0.5,
            slow_motion_limit_secs: 5.0,
            slow_motion_cooldown_secs: 30.0,
            rewind_rate: 2,
            rewind_request_ticks: 120,
        }
    }
}

fn secs(v: f32) -> Duration {
    Duration::try_from_secs_f32(v).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct TimeController {
    config: TimeConfig,
    mode: TimeMode,
    slow_elapsed: Duration,
    cooldown_left: Duration,
    rewind_remaining: usize,
    rewound: usize,
}

/// Result of one [`TimeController::rewind_step`].
#[derive(Debug, Clone, Default)]
pub struct RewindStep {
    /// The snapshot that becomes live, if any moved.
    pub restored: Option<Arc<World>>,
    /// The timeline ran out before the request was used up.
    pub exhausted: Option<TimeError>,
}

impl TimeController {
    pub fn new(config: TimeConfig) -> Self {
        Self {
            config,
            mode: TimeMode::Normal,
            slow_elapsed: Duration::ZERO,
            cooldown_left: Duration::ZERO,
            rewind_remaining: 0,
            rewound: 0,
        }
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    pub fn config(&self) -> &TimeConfig {
        &self.config
    }

    /// Scale applied to real time before it reaches the clock.
    pub fn time_scale(&self) -> f32 {
        match self.mode {
            TimeMode::Normal | TimeMode::Rewinding => 1.0,
            TimeMode::SlowMotion => {
                let f = self.config.slow_motion_factor;
                if f.is_finite() && f > 0.0 { f.min(1.0) } else { 1.0 }
            }
            TimeMode::Paused => 0.0,
        }
    }

    /// Player input must not reach the simulation.
    pub fn suppresses_input(&self) -> bool {
        matches!(self.mode, TimeMode::Paused | TimeMode::Rewinding)
    }

    /// Simulated ticks should be pushed to the timeline.
    pub fn records_history(&self) -> bool {
        matches!(self.mode, TimeMode::Normal | TimeMode::SlowMotion)
    }

    /// Real time left before slow motion can be entered again.
    pub fn slow_motion_cooldown(&self) -> Duration {
        self.cooldown_left
    }

    pub fn rewind_remaining(&self) -> usize {
        self.rewind_remaining
    }

    /// Per-frame real-time bookkeeping for slow motion. Returns the new mode
    /// when it changed.
    pub fn update(&mut self, slow_motion_held: bool, real_dt: Duration) -> Option<TimeMode> {
        let before = self.mode;
        match self.mode {
            TimeMode::SlowMotion if !slow_motion_held => {
                self.mode = TimeMode::Normal;
            }
            TimeMode::SlowMotion => {
                let limit = secs(self.config.slow_motion_limit_secs);
                self.slow_elapsed += real_dt;
                if !limit.is_zero() && self.slow_elapsed >= limit {
                    self.mode = TimeMode::Normal;
                    self.cooldown_left = secs(self.config.slow_motion_cooldown_secs);
                    tracing::debug!(cooldown = ?self.cooldown_left, "slow motion limit reached");
                }
            }
            TimeMode::Normal => {
                self.cooldown_left = self.cooldown_left.saturating_sub(real_dt);
                if slow_motion_held && self.cooldown_left.is_zero() {
                    self.mode = TimeMode::SlowMotion;
                    self.slow_elapsed = Duration::ZERO;
                }
            }
            TimeMode::Paused | TimeMode::Rewinding => {
                self.cooldown_left = self.cooldown_left.saturating_sub(real_dt);
            }
        }
        self.changed_from(before)
    }

    /// Pause or resume. A pause during rewinding ends the rewind and stays
    /// paused.
    pub fn toggle_pause(&mut self) -> TimeMode {
        self.mode = match self.mode {
            TimeMode::Normal | TimeMode::SlowMotion => TimeMode::Paused,
            TimeMode::Paused => TimeMode::Normal,
            TimeMode::Rewinding => {
                tracing::debug!(left = self.rewind_remaining, "rewind cut short");
                self.rewind_remaining = 0;
                TimeMode::Paused
            }
        };
        tracing::debug!(mode = %self.mode, "pause toggled");
        self.mode
    }

    /// Begin rewinding `ticks` snapshots. Only allowed from normal play or
    /// pause.
    pub fn request_rewind(&mut self, ticks: usize) -> Result<(), TimeError> {
        if !matches!(self.mode, TimeMode::Normal | TimeMode::Paused) {
            return Err(TimeError::Rejected {
                request: "rewind",
                mode: self.mode,
            });
        }
        self.mode = TimeMode::Rewinding;
        self.rewind_remaining = ticks;
        self.rewound = 0;
        tracing::debug!(ticks, "rewind started");
        Ok(())
    }

    /// One clock tick of rewinding: restore up to `rewind_rate` snapshots.
    ///
    /// Switches to `Paused` once the request is used up or the timeline
    /// holds nothing older. Running out of history before the request is
    /// used up is reported as [`TimeError::Empty`] on the returned step.
    pub fn rewind_step(&mut self, timeline: &mut TimelineBuffer) -> RewindStep {
        let mut out = RewindStep::default();
        if self.mode != TimeMode::Rewinding {
            return out;
        }
        let behind = timeline.len().saturating_sub(1);
        let n = (self.config.rewind_rate.max(1) as usize)
            .min(self.rewind_remaining)
            .min(behind);
        if n > 0 {
            out.restored = timeline.rewind(n).ok();
        }
        self.rewind_remaining -= n;
        self.rewound += n;
        if self.rewind_remaining > 0 && behind <= n {
            let err = TimeError::Empty {
                requested: self.rewound + self.rewind_remaining,
                available: self.rewound,
            };
            tracing::warn!(error = %err, "rewind ran out of history");
            out.exhausted = Some(err);
        }
        if self.rewind_remaining == 0 || behind <= n {
            tracing::debug!(
                rewound = self.rewound,
                tick = timeline.head().map(|w| w.tick()),
                "rewind finished"
            );
            self.rewind_remaining = 0;
            self.mode = TimeMode::Paused;
        }
        out
    }

    /// Back to normal play, as after a checkpoint load. The slow-motion
    /// cooldown keeps running.
    pub fn reset(&mut self) {
        self.mode = TimeMode::Normal;
        self.slow_elapsed = Duration::ZERO;
        self.rewind_remaining = 0;
        self.rewound = 0;
    }

    fn changed_from(&self, before: TimeMode) -> Option<TimeMode> {
        (self.mode != before).then_some(self.mode)
    }
}

impl Default for TimeController {
    fn default() -> Self {
        Self::new(TimeConfig::default())
    }
}
