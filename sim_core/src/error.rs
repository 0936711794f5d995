//! Error types for simulation setup
//!
//! Runtime invariant violations (scheduling into the past, consuming a charge that
//! does not exist) are programming errors and panic with a descriptive message instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("ability '{ability}': {message}")]
    InvalidAbility { ability: String, message: String },
    #[error("unit '{unit}': {message}")]
    InvalidUnit { unit: String, message: String },
    #[error("encounter: {0}")]
    InvalidEncounter(String),
    #[error("unknown behavior '{behavior}' for ability '{ability}'")]
    UnknownBehavior { ability: String, behavior: String },
    #[error("unknown ability '{0}'")]
    UnknownAbility(String),
    #[error("run settings: {0}")]
    InvalidSettings(String),
    #[error(transparent)]
    Definition(#[from] spell_data::DefinitionError),
}

impl SimError {
    pub(crate) fn ability(ability: impl Into<String>, message: impl Into<String>) -> Self {
        SimError::InvalidAbility {
            ability: ability.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unit(unit: impl Into<String>, message: impl Into<String>) -> Self {
        SimError::InvalidUnit {
            unit: unit.into(),
            message: message.into(),
        }
    }
}
