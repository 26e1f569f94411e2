use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TimeError;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Tick rate and catch-up cap of the fixed-step clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub tick_rate_hz: u32,
    /// Most ticks a single `advance` may emit; the rest is dropped.
    pub max_steps_per_advance: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            max_steps_per_advance: 5,
        }
    }
}

/// Ticks due after one `advance`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickBatch {
    pub steps: u32,
    /// Set when more ticks were due than the cap allowed.
    pub overflow: Option<TimeError>,
}

/// Accumulator clock turning variable real time into whole fixed ticks.
///
/// Time is kept in integer nanoseconds so identical `advance` sequences
/// always yield identical tick counts.
#[derive(Debug, Clone)]
pub struct FixedClock {
    step_nanos: u64,
    max_steps: u32,
    accumulator: u64,
}

impl FixedClock {
    pub fn new(config: &ClockConfig) -> Self {
        let hz = u64::from(config.tick_rate_hz.max(1));
        Self {
            step_nanos: (NANOS_PER_SEC / hz).max(1),
            max_steps: config.max_steps_per_advance.max(1),
            accumulator: 0,
        }
    }

    /// Length of one tick.
    pub fn step(&self) -> Duration {
        Duration::from_nanos(self.step_nanos)
    }

    /// Length of one tick in seconds, as fed to the simulation.
    pub fn step_secs(&self) -> f32 {
        self.step_nanos as f32 / NANOS_PER_SEC as f32
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Add `real_dt * time_scale` and drain the whole ticks now due.
    ///
    /// A non-positive or non-finite scale adds nothing. When more than
    /// `max_steps` ticks are due the batch is capped, the accumulator is
    /// emptied and the dropped time is reported as an overflow.
    pub fn advance(&mut self, real_dt: Duration, time_scale: f32) -> TickBatch {
        if !time_scale.is_finite() || time_scale <= 0.0 {
            return TickBatch::default();
        }
        let nanos = u64::try_from(real_dt.as_nanos()).unwrap_or(u64::MAX);
        let scaled = if time_scale == 1.0 {
            nanos
        } else {
            (nanos as f64 * f64::from(time_scale)).round() as u64
        };
        self.accumulator = self.accumulator.saturating_add(scaled);

        let due = self.accumulator / self.step_nanos;
        if due > u64::from(self.max_steps) {
            let kept = u64::from(self.max_steps) * self.step_nanos;
            let discarded = Duration::from_nanos(self.accumulator - kept);
            self.accumulator = 0;
            tracing::warn!(?discarded, max_steps = self.max_steps, "clock overflow");
            return TickBatch {
                steps: self.max_steps,
                overflow: Some(TimeError::Overflow { discarded }),
            };
        }
        self.accumulator -= due * self.step_nanos;
        TickBatch {
            steps: due as u32,
            overflow: None,
        }
    }

    /// Fraction of a tick left in the accumulator, for render interpolation.
    pub fn alpha(&self) -> f32 {
        self.accumulator as f32 / self.step_nanos as f32
    }

    /// Drop any partial tick.
    pub fn reset(&mut self) {
        self.accumulator = 0;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(&ClockConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_stall_emits_only_the_cap() {
        let mut clock = FixedClock::default();
        let batch = clock.advance(Duration::from_secs(1), 1.0);
        assert_eq!(batch.steps, 5);
        assert!(matches!(batch.overflow, Some(TimeError::Overflow { .. })));
        assert_eq!(clock.alpha(), 0.0);
    }

    #[test]
    fn overflow_reports_dropped_time() {
        let mut clock = FixedClock::default();
        let batch = clock.advance(Duration::from_secs(1), 1.0);
        let Some(TimeError::Overflow { discarded }) = batch.overflow else {
            panic!("expected overflow");
        };
        let kept = clock.step() * 5;
        assert_eq!(discarded, Duration::from_secs(1) - kept);
    }

    #[test]
    fn frame_sized_advances_emit_one_tick_each() {
        let mut clock = FixedClock::default();
        let total: u32 = (0..60)
            .map(|_| clock.advance(clock.step(), 1.0).steps)
            .sum();
        assert_eq!(total, 60);
    }

    #[test]
    fn partial_ticks_accumulate() {
        let mut clock = FixedClock::default();
        let half = clock.step() / 2;
        assert_eq!(clock.advance(half, 1.0).steps, 0);
        assert!((clock.alpha() - 0.5).abs() < 1e-3);
        assert_eq!(clock.advance(half, 1.0).steps, 1);
    }

    #[test]
    fn half_scale_halves_the_rate() {
        let mut clock = FixedClock::default();
        let total: u32 = (0..60)
            .map(|_| clock.advance(clock.step(), 0.5).steps)
            .sum();
        assert_eq!(total, 30);
    }

    #[test]
    fn zero_scale_emits_nothing_and_keeps_progress() {
        let mut clock = FixedClock::default();
        clock.advance(clock.step() / 2, 1.0);
        let alpha = clock.alpha();
        let batch = clock.advance(Duration::from_secs(10), 0.0);
        assert_eq!(batch, TickBatch::default());
        assert_eq!(clock.alpha(), alpha);
    }

    #[test]
    fn custom_rate() {
        let mut clock = FixedClock::new(&ClockConfig {
            tick_rate_hz: 120,
            max_steps_per_advance: 10,
        });
        assert_eq!(clock.advance(Duration::from_millis(50), 1.0).steps, 6);
    }
}
