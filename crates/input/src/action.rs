use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A high-level game action produced by a physical key or button.
///
/// The session never sees raw keys; bindings translate them into actions and
/// the [`crate::InputMapper`] folds actions into a per-tick input state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    MoveLeft,
    MoveRight,
    Jump,
    UsePower,
    SwitchEraForward,
    SwitchEraBack,
    SlowMotion,
    Pause,
    QuickSave,
    QuickLoad,
    Rewind,
}

impl Action {
    /// Held actions stay set for every tick while the key is down. All other
    /// actions fire once per press.
    pub fn is_held(self) -> bool {
        matches!(self, Action::MoveLeft | Action::MoveRight | Action::SlowMotion)
    }
}

/// Error parsing an action or binding name.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

impl FromStr for Action {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "move_left" => Action::MoveLeft,
            "move_right" => Action::MoveRight,
            "jump" => Action::Jump,
            "use_power" => Action::UsePower,
            "switch_era_forward" => Action::SwitchEraForward,
            "switch_era_back" => Action::SwitchEraBack,
            "slow_motion" => Action::SlowMotion,
            "pause" => Action::Pause,
            "quick_save" => Action::QuickSave,
            "quick_load" => Action::QuickLoad,
            "rewind" => Action::Rewind,
            other => return Err(InputError::UnknownAction(other.to_string())),
        })
    }
}

/// Mapping from key names to actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindings {
    keys: BTreeMap<String, Action>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut b = Self {
            keys: BTreeMap::new(),
        };
        b.bind("a", Action::MoveLeft);
        b.bind("d", Action::MoveRight);
        b.bind("space", Action::Jump);
        b.bind("e", Action::UsePower);
        b.bind("q", Action::SwitchEraForward);
        b.bind("z", Action::SwitchEraBack);
        b.bind("shift", Action::SlowMotion);
        b.bind("escape", Action::Pause);
        b.bind("f5", Action::QuickSave);
        b.bind("f9", Action::QuickLoad);
        b.bind("r", Action::Rewind);
        b
    }
}

impl KeyBindings {
    /// Bind `key` to `action`, replacing any previous binding of that key.
    pub fn bind(&mut self, key: impl Into<String>, action: Action) {
        self.keys.insert(key.into().to_ascii_lowercase(), action);
    }

    pub fn unbind(&mut self, key: &str) -> Option<Action> {
        self.keys.remove(&key.to_ascii_lowercase())
    }

    pub fn action_for(&self, key: &str) -> Option<Action> {
        self.keys.get(&key.to_ascii_lowercase()).copied()
    }

    /// Keys bound to `action`, in key order.
    pub fn keys_for(&self, action: Action) -> Vec<&str> {
        self.keys
            .iter()
            .filter(|(_, a)| **a == action)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bindings_match_quicksave_keys() {
        let b = KeyBindings::default();
        assert_eq!(b.action_for("F5"), Some(Action::QuickSave));
        assert_eq!(b.action_for("f9"), Some(Action::QuickLoad));
        assert_eq!(b.action_for("shift"), Some(Action::SlowMotion));
    }

    #[test]
    fn rebinding_replaces_key() {
        let mut b = KeyBindings::default();
        b.bind("space", Action::UsePower);
        assert_eq!(b.action_for("space"), Some(Action::UsePower));
        assert!(b.keys_for(Action::Jump).is_empty());
    }

    #[test]
    fn parse_action_names() {
        assert_eq!("rewind".parse::<Action>().unwrap(), Action::Rewind);
        assert!("fly".parse::<Action>().is_err());
    }

    #[test]
    fn held_classification() {
        assert!(Action::MoveLeft.is_held());
        assert!(Action::SlowMotion.is_held());
        assert!(!Action::Jump.is_held());
        assert!(!Action::Pause.is_held());
    }
}
