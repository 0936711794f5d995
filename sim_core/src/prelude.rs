//! Prelude module for convenient imports
//!
//! ```rust
//! use sim_core::prelude::*;
//! ```

pub use std::time::Duration;

// Core types
pub use crate::sim::Simulation;
pub use crate::types::{AuraId, DotId, SpellId, TimerId, UnitId, UnitKind};
pub use crate::unit::{UnitConfig, UnitStats};
pub use crate::encounter::{EncounterConfig, TargetConfig};
pub use crate::resource::ResourceBarConfig;

// Abilities
pub use crate::spell::{
    AbilityBehavior, BehaviorRegistry, CastConfig, DirectDamage, DirectHeal, ManaCost, PowerCost, SpellConfig,
    SpellCost, SpellFlags,
};

// Auras and periodic effects
pub use crate::aura::{AuraConfig, AuraHandler};
pub use crate::dot::DotConfig;

// Combat
pub use crate::combat::{HitOutcome, OutcomeKind, SpellResult};

// Decisions and runs
pub use crate::rotation::{PriorityRotation, Rotation};
pub use crate::runner::{run, RunSettings};
pub use crate::metrics::RunMetrics;
pub use crate::error::SimError;

// Config
pub use crate::config::{init_constants, init_constants_default};

// Re-exports from spell_data
pub use spell_data::{OptionValue, ResourceKind, SpellSchool, TickHaste};
