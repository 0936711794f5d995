//! Engine configuration
//!
//! Tunable combat constants live in a process-wide table loaded once from TOML.

mod constants;

pub use constants::*;
pub use spell_data::ConfigError;
