//! Input: per-tick input state and the mapping from keys to actions.
//!
//! # Invariants
//! - The simulation consumes [`TickInput`] only, never raw key events.
//! - Edge-triggered fields are delivered to exactly one tick.

pub mod action;

pub use action::{Action, InputError, KeyBindings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Input state for a single simulation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickInput {
    pub move_left: bool,
    pub move_right: bool,
    pub jump: bool,
    pub use_power: bool,
    pub switch_era_fwd: bool,
    pub switch_era_back: bool,
    pub slow_motion_held: bool,
    pub pause_toggled: bool,
    pub quicksave: bool,
    pub quickload: bool,
    pub rewind: bool,
}

impl TickInput {
    /// Horizontal intent: -1 left, +1 right, 0 for none or both.
    pub fn horizontal(&self) -> f32 {
        match (self.move_left, self.move_right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }

    /// Copy keeping only held fields. Used for the second and later ticks of a
    /// batch so one key press is not applied several times.
    pub fn held_only(&self) -> Self {
        Self {
            move_left: self.move_left,
            move_right: self.move_right,
            slow_motion_held: self.slow_motion_held,
            ..Self::default()
        }
    }

    /// Input with everything released, as seen by the simulation while paused.
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Folds press/release events into [`TickInput`] samples.
#[derive(Debug, Default)]
pub struct InputMapper {
    bindings: KeyBindings,
    held: BTreeSet<Action>,
    pressed: BTreeSet<Action>,
}

impl InputMapper {
    pub fn new(bindings: KeyBindings) -> Self {
        Self {
            bindings,
            ..Self::default()
        }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// Register a key press. Unbound keys are ignored.
    pub fn key_down(&mut self, key: &str) {
        match self.bindings.action_for(key) {
            Some(action) => self.press(action),
            None => tracing::trace!(key, "unbound key pressed"),
        }
    }

    pub fn key_up(&mut self, key: &str) {
        if let Some(action) = self.bindings.action_for(key) {
            self.release(action);
        }
    }

    pub fn press(&mut self, action: Action) {
        if action.is_held() {
            self.held.insert(action);
        } else {
            self.pressed.insert(action);
        }
    }

    pub fn release(&mut self, action: Action) {
        self.held.remove(&action);
    }

    /// Build the input for the next tick and consume pending presses.
    pub fn sample(&mut self) -> TickInput {
        let pressed = std::mem::take(&mut self.pressed);
        TickInput {
            move_left: self.held.contains(&Action::MoveLeft),
            move_right: self.held.contains(&Action::MoveRight),
            slow_motion_held: self.held.contains(&Action::SlowMotion),
            jump: pressed.contains(&Action::Jump),
            use_power: pressed.contains(&Action::UsePower),
            switch_era_fwd: pressed.contains(&Action::SwitchEraForward),
            switch_era_back: pressed.contains(&Action::SwitchEraBack),
            pause_toggled: pressed.contains(&Action::Pause),
            quicksave: pressed.contains(&Action::QuickSave),
            quickload: pressed.contains(&Action::QuickLoad),
            rewind: pressed.contains(&Action::Rewind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_cancels_when_both_held() {
        let input = TickInput {
            move_left: true,
            move_right: true,
            ..TickInput::default()
        };
        assert_eq!(input.horizontal(), 0.0);
        let left = TickInput {
            move_left: true,
            ..TickInput::default()
        };
        assert_eq!(left.horizontal(), -1.0);
    }

    #[test]
    fn presses_are_delivered_once() {
        let mut m = InputMapper::default();
        m.key_down("space");
        assert!(m.sample().jump);
        assert!(!m.sample().jump);
    }

    #[test]
    fn held_keys_persist_until_release() {
        let mut m = InputMapper::default();
        m.key_down("d");
        m.key_down("shift");
        assert!(m.sample().move_right);
        let s = m.sample();
        assert!(s.move_right && s.slow_motion_held);
        m.key_up("d");
        assert!(!m.sample().move_right);
    }

    #[test]
    fn held_only_drops_edges() {
        let input = TickInput {
            move_left: true,
            jump: true,
            quicksave: true,
            ..TickInput::default()
        };
        let held = input.held_only();
        assert!(held.move_left);
        assert!(!held.jump && !held.quicksave);
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let mut m = InputMapper::default();
        m.key_down("x");
        assert_eq!(m.sample(), TickInput::default());
    }
}
