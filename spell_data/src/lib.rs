//! spell_data - TOML definitions consumed by the simulation engine
//!
//! This crate provides:
//! - AbilityDef: a validated ability definition (cost, cooldowns, charges, periodic effects)
//! - AbilityRegistry: every ability found in a directory of `.toml` files
//! - ScenarioDef: run settings plus the encounter to simulate
//!
//! It has no knowledge of the engine; `sim_core` turns these definitions into
//! registered spells.

mod ability;
mod config;
mod encounter;
mod registry;
mod types;

pub use ability::{AbilityDef, CooldownDef, CostDef, PeriodicDef, KNOWN_FLAGS};
pub use config::{
    AbilityConfig, AbilityFileConfig, CostConfig, OptionValue, PeriodicConfig, SharedCooldownConfig,
};
pub use encounter::{EncounterDef, RunSettingsDef, ScenarioDef, TargetDef};
pub use registry::AbilityRegistry;
pub use types::{ResourceKind, SpellSchool, TickHaste};

use std::path::PathBuf;
use thiserror::Error;

/// Error loading ability or scenario configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading '{path:?}': {error}")]
    Io {
        error: std::io::Error,
        path: Option<PathBuf>,
    },
    #[error("Parse error in '{path}': {error}")]
    Parse {
        error: toml::de::Error,
        path: PathBuf,
    },
    #[error("Validation error in '{path}': {message}")]
    Validation { message: String, path: PathBuf },
    #[error("{0} already initialized")]
    AlreadyInitialized(&'static str),
}

/// Error building a definition from its raw config
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("ability '{ability}': {message}")]
    InvalidAbility { ability: String, message: String },
    #[error("encounter: {0}")]
    InvalidEncounter(String),
    #[error("duplicate ability id: {0}")]
    DuplicateAbility(String),
}
