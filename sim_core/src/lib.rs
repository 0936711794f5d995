//! sim_core - Deterministic event-driven combat simulation engine
//!
//! This library provides:
//! - Simulation: the clock, units, auras, periodic effects and abilities of one encounter
//! - Rotation: the per-unit decision policy invoked whenever a unit may act
//! - Attack tables: per attacker/defender outcome probabilities
//! - Runner: many seeded iterations folded into one `RunMetrics` report
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sim_core::prelude::*;
//!
//! let settings = RunSettings::new(1000, 42);
//! let metrics = run(settings, || {
//!     let mut sim = Simulation::new(EncounterConfig::single_target(Duration::from_secs(180)))?;
//!     let mage = sim.add_player(UnitConfig::new("mage"))?;
//!     let bolt = sim.register_spell(
//!         mage,
//!         SpellConfig::new("bolt")
//!             .with_school(SpellSchool::Fire)
//!             .with_cast(CastConfig::hardcast(Duration::from_millis(2000), Duration::from_millis(1500)))
//!             .with_behavior(DirectDamage)
//!             .with_option("base_damage", OptionValue::Number(1000.0)),
//!     )?;
//!     sim.set_rotation(mage, PriorityRotation::new(vec![bolt]));
//!     Ok(sim)
//! })?;
//! println!("{}", metrics.to_json()?);
//! ```

pub mod aura;
pub mod clock;
pub mod combat;
pub mod config;
pub mod dot;
pub mod encounter;
pub mod error;
pub mod metrics;
pub mod prelude;
pub mod resource;
pub mod rotation;
pub mod runner;
pub mod sim;
pub mod spell;
pub mod time;
pub mod types;
pub mod unit;

// Core API
pub use sim::{Action, Simulation};
pub use encounter::{Encounter, EncounterConfig, TargetConfig};
pub use unit::{Unit, UnitConfig, UnitStats};
pub use rotation::{PriorityRotation, Rotation};
pub use error::SimError;
pub use types::{AuraId, DotId, SpellId, TimerId, UnitId, UnitKind};

// Running many iterations
pub use runner::{iteration_seed, run, run_sequential, RunSettings};
pub use metrics::{IterationReport, MetricsSink, RunMetrics};

// Configuration
pub use config::{constants, init_constants, init_constants_default, CombatConstants};

// Re-export commonly needed spell_data types
pub use spell_data::{OptionValue, ResourceKind, SpellSchool, TickHaste};
