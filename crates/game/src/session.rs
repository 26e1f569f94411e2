//! The session: one thread owning the clock, time controller, timeline,
//! era registry and the live snapshot.
//!
//! A frame runs in this order:
//! 1. apply finished checkpoint jobs (a load replaces everything at once)
//! 2. edge-triggered controls: pause, rewind request, era switch, save/load
//! 3. slow-motion bookkeeping, then the clock turns real time into ticks
//! 4. each tick either replays from the timeline (rewinding) or steps the
//!    simulation and records the result

use std::sync::Arc;
use std::time::Duration;

use chronosta_era::{EraDefinition, EraRegistry};
use chronosta_input::TickInput;
use chronosta_kernel::{
    Level, SimEvent, Step, StepContext, SwitchDirection, SwitchError, SwitchGuard, World, step,
    switch_era,
};
use chronosta_persist::{CheckpointError, CheckpointStore, CheckpointWorker, Completion, SlotId};
use chronosta_time::{
    FixedClock, RewindStep, TimeController, TimeError, TimeMode, TimelineBuffer,
};

use crate::config::{ConfigError, GameConfig};
use crate::events::{EventSink, GameEvent, Report};

/// Read-only view for a renderer.
#[derive(Debug, Clone)]
pub struct FrameView {
    pub world: Arc<World>,
    pub era: Arc<EraDefinition>,
    /// Progress towards the next tick, for interpolation.
    pub alpha: f32,
    pub mode: TimeMode,
}

/// What one `frame` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub simulated: u32,
    pub replayed: u32,
}

pub struct GameSession {
    config: GameConfig,
    registry: EraRegistry,
    level: Level,
    clock: FixedClock,
    controller: TimeController,
    timeline: TimelineBuffer,
    live: Arc<World>,
    dt: f32,
    /// Jump/power presses not yet consumed by a simulated tick.
    carried: TickInput,
    checkpoints: Option<CheckpointWorker>,
}

impl GameSession {
    /// Start `level` with the eras named by `config`.
    pub fn new(config: GameConfig, level: Level) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = config.era_registry()?;
        Ok(Self::with_registry(config, registry, level))
    }

    pub fn with_registry(config: GameConfig, registry: EraRegistry, level: Level) -> Self {
        let live = Arc::new(level.initial_world());
        let mut timeline = TimelineBuffer::with_config(&config.timeline);
        timeline.push(Arc::clone(&live));
        tracing::info!(
            level = %level.name,
            era = %live.era(),
            entities = live.entity_count(),
            "session started"
        );
        Self {
            clock: FixedClock::new(&config.clock),
            controller: TimeController::new(config.time.clone()),
            dt: config.dt(),
            config,
            registry,
            level,
            timeline,
            live,
            carried: TickInput::default(),
            checkpoints: None,
        }
    }

    /// Open the save directory and start the checkpoint worker.
    pub fn attach_checkpoints(&mut self) -> Result<(), CheckpointError> {
        let store = CheckpointStore::open(&self.config.saves.dir, self.config.saves.max_slots)?;
        self.checkpoints = Some(CheckpointWorker::spawn(store)?);
        Ok(())
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn registry(&self) -> &EraRegistry {
        &self.registry
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn live(&self) -> &Arc<World> {
        &self.live
    }

    pub fn mode(&self) -> TimeMode {
        self.controller.mode()
    }

    pub fn controller(&self) -> &TimeController {
        &self.controller
    }

    pub fn timeline(&self) -> &TimelineBuffer {
        &self.timeline
    }

    pub fn era(&self) -> &Arc<EraDefinition> {
        self.registry.get(self.live.era())
    }

    pub fn view(&self) -> FrameView {
        FrameView {
            world: Arc::clone(&self.live),
            era: Arc::clone(self.era()),
            alpha: self.clock.alpha(),
            mode: self.controller.mode(),
        }
    }

    /// Advance by `real_dt` of wall-clock time.
    pub fn frame(
        &mut self,
        real_dt: Duration,
        input: &TickInput,
        sink: &mut dyn EventSink,
    ) -> FrameStats {
        let _span = tracing::debug_span!("frame", tick = self.live.tick()).entered();

        self.poll_checkpoints(sink);
        self.handle_controls(input, sink);

        let before = self.controller.mode();
        self.controller.update(input.slow_motion_held, real_dt);
        self.note_mode(before, sink);

        let batch = self.clock.advance(real_dt, self.controller.time_scale());
        if let Some(overflow) = batch.overflow {
            sink.notify(&GameEvent::Reported(Report::Time(overflow)));
        }

        self.carried.jump |= input.jump;
        self.carried.use_power |= input.use_power;
        let held = input.held_only();

        let mut stats = FrameStats::default();
        for _ in 0..batch.steps {
            match self.controller.mode() {
                TimeMode::Rewinding => {
                    self.tick(&held, sink);
                    stats.replayed += 1;
                }
                TimeMode::Paused => break,
                TimeMode::Normal | TimeMode::SlowMotion => {
                    let tick_input = TickInput {
                        jump: self.carried.jump,
                        use_power: self.carried.use_power,
                        ..held
                    };
                    self.carried = TickInput::default();
                    self.tick(&tick_input, sink);
                    stats.simulated += 1;
                }
            }
        }
        stats
    }

    /// Run exactly one tick, bypassing the clock: replay one rewind step
    /// when rewinding, do nothing when paused, otherwise simulate.
    pub fn tick(&mut self, input: &TickInput, sink: &mut dyn EventSink) {
        match self.controller.mode() {
            TimeMode::Paused => {}
            TimeMode::Rewinding => {
                let before = self.controller.mode();
                let RewindStep {
                    restored,
                    exhausted,
                } = self.controller.rewind_step(&mut self.timeline);
                if let Some(world) = restored {
                    self.live = world;
                    sink.notify(&GameEvent::Rewound {
                        tick: self.live.tick(),
                    });
                }
                if let Some(e) = exhausted {
                    sink.notify(&GameEvent::Reported(Report::Time(e)));
                }
                self.note_mode(before, sink);
            }
            TimeMode::Normal | TimeMode::SlowMotion => self.simulate(input, sink),
        }
    }

    fn simulate(&mut self, input: &TickInput, sink: &mut dyn EventSink) {
        let input = if self.controller.suppresses_input() {
            TickInput::idle()
        } else {
            *input
        };
        let era = Arc::clone(self.registry.get(self.live.era()));
        let ctx = StepContext {
            era: &era,
            terrain: &self.level.terrain,
            dt: self.dt,
        };
        let Step { world, events } = step(&self.live, &input, &ctx);
        self.live = Arc::new(world);
        if self.controller.records_history() {
            self.timeline.push(Arc::clone(&self.live));
        }
        for ev in events {
            sink.notify(&GameEvent::Sim(ev));
            match ev {
                SimEvent::CheckpointReached { index } => {
                    tracing::info!(index, tick = self.live.tick(), "level checkpoint reached");
                    if self.checkpoints.is_some() {
                        self.save(SlotId::Checkpoint, sink);
                    }
                }
                SimEvent::LevelCompleted => sink.notify(&GameEvent::LevelCompleted {
                    level: self.level.name.clone(),
                    next_level: self.level.next_level.clone(),
                }),
                _ => {}
            }
        }
    }

    fn handle_controls(&mut self, input: &TickInput, sink: &mut dyn EventSink) {
        if input.pause_toggled {
            self.toggle_pause(sink);
        }
        if input.rewind {
            let _ = self.request_rewind(self.config.time.rewind_request_ticks as usize, sink);
        }
        if input.switch_era_fwd {
            let _ = self.switch_era(SwitchDirection::Forward, sink);
        }
        if input.switch_era_back {
            let _ = self.switch_era(SwitchDirection::Back, sink);
        }
        if input.quicksave {
            self.save(SlotId::Quick(0), sink);
        }
        if input.quickload {
            self.load(SlotId::Quick(0), sink);
        }
    }

    pub fn toggle_pause(&mut self, sink: &mut dyn EventSink) -> TimeMode {
        let before = self.controller.mode();
        let mode = self.controller.toggle_pause();
        self.note_mode(before, sink);
        mode
    }

    /// Start rewinding `ticks` snapshots.
    pub fn request_rewind(
        &mut self,
        ticks: usize,
        sink: &mut dyn EventSink,
    ) -> Result<(), TimeError> {
        let before = self.controller.mode();
        match self.controller.request_rewind(ticks) {
            Ok(()) => {
                self.note_mode(before, sink);
                Ok(())
            }
            Err(e) => {
                sink.notify(&GameEvent::Reported(Report::Time(e.clone())));
                Err(e)
            }
        }
    }

    /// Switch the live world to the next or previous era.
    pub fn switch_era(
        &mut self,
        direction: SwitchDirection,
        sink: &mut dyn EventSink,
    ) -> Result<(), SwitchError> {
        let guard = SwitchGuard {
            rewinding: self.controller.mode() == TimeMode::Rewinding,
            cooldown_ticks: self.config.eras.switch_cooldown_ticks,
        };
        match switch_era(&self.live, &self.registry, direction, guard) {
            Ok((world, _)) => {
                let from = self.live.era();
                self.live = Arc::new(world);
                sink.notify(&GameEvent::EraSwitched {
                    from,
                    to: self.live.era(),
                });
                Ok(())
            }
            Err(e) => {
                let SwitchError::Locked(lock) = e;
                sink.notify(&GameEvent::Reported(Report::SwitchLocked(lock)));
                Err(e)
            }
        }
    }

    /// Queue a save of the live snapshot. The outcome arrives in a later
    /// frame as `CheckpointSaved` or a report.
    pub fn save(&mut self, slot: SlotId, sink: &mut dyn EventSink) {
        let result = match &self.checkpoints {
            Some(worker) => worker.save(slot, Arc::clone(&self.live), self.live.era()),
            None => Err(CheckpointError::WorkerGone),
        };
        if let Err(e) = result {
            report_checkpoint(&e, sink);
        }
    }

    /// Queue a save to the suspend slot, to be picked up by [`Self::resume`].
    pub fn suspend(&mut self, sink: &mut dyn EventSink) {
        self.save(SlotId::Suspend, sink);
    }

    /// Queue a load of the suspend save. The file is removed once read.
    pub fn resume(&mut self, sink: &mut dyn EventSink) {
        self.load(SlotId::Suspend, sink);
    }

    /// Queue a load. A later request supersedes this one; the live state is
    /// untouched until the load completes successfully.
    pub fn load(&mut self, slot: SlotId, sink: &mut dyn EventSink) {
        let result = match &self.checkpoints {
            Some(worker) => worker.request_load(slot).map(|_| ()),
            None => Err(CheckpointError::WorkerGone),
        };
        if let Err(e) = result {
            report_checkpoint(&e, sink);
        }
    }

    /// Block up to `timeout` for one checkpoint job and apply it. Returns
    /// whether one arrived.
    pub fn wait_for_checkpoint(&mut self, timeout: Duration, sink: &mut dyn EventSink) -> bool {
        let completion = self.checkpoints.as_ref().and_then(|w| w.wait(timeout));
        match completion {
            Some(c) => {
                self.apply_completion(c, sink);
                true
            }
            None => false,
        }
    }

    fn poll_checkpoints(&mut self, sink: &mut dyn EventSink) {
        let completions = match &self.checkpoints {
            Some(worker) => worker.poll(),
            None => return,
        };
        for c in completions {
            self.apply_completion(c, sink);
        }
    }

    fn apply_completion(&mut self, completion: Completion, sink: &mut dyn EventSink) {
        match completion {
            Completion::Saved { result, .. } => match result {
                Ok(summary) => sink.notify(&GameEvent::CheckpointSaved(summary)),
                Err(e) => report_checkpoint(&e, sink),
            },
            Completion::Loaded { slot, result, .. } => match result {
                Ok(record) if record.world.meta().level != self.level.name => {
                    let e = CheckpointError::WrongLevel {
                        slot,
                        found: record.world.meta().level.clone(),
                        expected: self.level.name.clone(),
                    };
                    tracing::warn!(error = %e, "refusing checkpoint");
                    report_checkpoint(&e, sink);
                }
                Ok(record) => {
                    let before = self.controller.mode();
                    self.live = Arc::new(record.world);
                    self.timeline.clear();
                    self.timeline.push(Arc::clone(&self.live));
                    self.controller.reset();
                    self.clock.reset();
                    self.carried = TickInput::default();
                    tracing::info!(%slot, tick = self.live.tick(), era = %record.era, "checkpoint applied");
                    sink.notify(&GameEvent::CheckpointLoaded {
                        slot: record.slot,
                        era: record.era,
                        tick: self.live.tick(),
                    });
                    self.note_mode(before, sink);
                }
                Err(e) => report_checkpoint(&e, sink),
            },
        }
    }

    fn note_mode(&self, before: TimeMode, sink: &mut dyn EventSink) {
        let to = self.controller.mode();
        if to != before {
            tracing::debug!(from = %before, %to, "time mode changed");
            sink.notify(&GameEvent::TimeModeChanged { from: before, to });
        }
    }
}

fn report_checkpoint(e: &CheckpointError, sink: &mut dyn EventSink) {
    sink.notify(&GameEvent::Reported(Report::Checkpoint {
        message: e.to_string(),
        fatal: e.is_fatal(),
    }));
}
