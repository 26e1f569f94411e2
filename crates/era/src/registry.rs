use crate::definition::EraDefinition;
use chronosta_common::EraId;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Errors from loading era definitions.
#[derive(Debug, thiserror::Error)]
pub enum EraError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("era definition parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("era {0} is defined more than once")]
    Duplicate(EraId),
    #[error("era {0} has no definition")]
    Incomplete(EraId),
    #[error("era {era}: {reason}")]
    Invalid { era: EraId, reason: String },
}

/// On-disk layout of an era definitions file.
#[derive(Debug, Deserialize)]
struct EraFile {
    eras: Vec<EraDefinition>,
}

/// Holds one immutable definition per era and knows the cyclic era order.
///
/// The active era is not stored here; it is a field of the world snapshot.
#[derive(Debug, Clone)]
pub struct EraRegistry {
    eras: [Arc<EraDefinition>; 3],
}

impl EraRegistry {
    /// Registry with the built-in rule sets.
    pub fn builtin() -> Self {
        Self {
            eras: EraId::ALL.map(|id| Arc::new(EraDefinition::builtin(id))),
        }
    }

    /// Build a registry from a complete set of definitions.
    pub fn from_definitions(defs: Vec<EraDefinition>) -> Result<Self, EraError> {
        let mut slots: [Option<EraDefinition>; 3] = [None, None, None];
        for def in defs {
            validate(&def)?;
            let slot = &mut slots[def.id.index()];
            if slot.is_some() {
                return Err(EraError::Duplicate(def.id));
            }
            *slot = Some(def);
        }
        let [pre, med, fut] = slots;
        let take = |def: Option<EraDefinition>, id: EraId| {
            def.map(Arc::new).ok_or(EraError::Incomplete(id))
        };
        Ok(Self {
            eras: [
                take(pre, EraId::Prehistoric)?,
                take(med, EraId::Medieval)?,
                take(fut, EraId::Futuristic)?,
            ],
        })
    }

    /// Parse a YAML document of the form `eras: [ ... ]`.
    pub fn from_yaml(src: &str) -> Result<Self, EraError> {
        let file: EraFile = serde_yaml::from_str(src)?;
        let registry = Self::from_definitions(file.eras)?;
        tracing::debug!("loaded era definitions");
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EraError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_yaml(&src)
    }

    /// Serialize all definitions back to the YAML file layout.
    pub fn to_yaml(&self) -> Result<String, EraError> {
        #[derive(serde::Serialize)]
        struct Out<'a> {
            eras: Vec<&'a EraDefinition>,
        }
        Ok(serde_yaml::to_string(&Out {
            eras: self.eras.iter().map(|e| e.as_ref()).collect(),
        })?)
    }

    /// Definition of `id`.
    pub fn get(&self, id: EraId) -> &Arc<EraDefinition> {
        &self.eras[id.index()]
    }

    /// The era after `current` in cyclic order.
    pub fn next(&self, current: EraId) -> EraId {
        EraId::ALL[(current.index() + 1) % EraId::ALL.len()]
    }

    /// The era before `current` in cyclic order.
    pub fn prev(&self, current: EraId) -> EraId {
        let n = EraId::ALL.len();
        EraId::ALL[(current.index() + n - 1) % n]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EraDefinition>> {
        self.eras.iter()
    }
}

impl Default for EraRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate(def: &EraDefinition) -> Result<(), EraError> {
    let invalid = |reason: &str| EraError::Invalid {
        era: def.id,
        reason: reason.to_string(),
    };
    if !def.gravity.is_finite() || def.gravity < 0.0 {
        return Err(invalid("gravity must be finite and non-negative"));
    }
    if !def.friction.is_finite() || def.friction < 0.0 {
        return Err(invalid("friction must be finite and non-negative"));
    }
    if def.max_fall_speed <= 0.0 {
        return Err(invalid("max_fall_speed must be positive"));
    }
    if def.power.stamina_cost < 0.0 {
        return Err(invalid("power stamina cost must be non-negative"));
    }
    Ok(())
}
