use crate::types::{ResourceKind, SpellSchool, TickHaste};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// TOML configuration for an ability file
#[derive(Debug, Deserialize)]
pub struct AbilityFileConfig {
    #[serde(default, rename = "ability")]
    pub abilities: Vec<AbilityConfig>,
}

/// Configuration for a single ability
#[derive(Debug, Clone, Deserialize)]
pub struct AbilityConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub school: SpellSchool,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Name of the behavior the engine binds to this ability
    #[serde(default)]
    pub behavior: Option<String>,

    #[serde(default)]
    pub cast_time_ms: u64,
    #[serde(default)]
    pub gcd_ms: u64,
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub shared_cooldown: Option<SharedCooldownConfig>,
    #[serde(default)]
    pub charges: u32,
    #[serde(default)]
    pub recharge_time_ms: u64,

    #[serde(default)]
    pub min_range: f64,
    #[serde(default)]
    pub max_range: f64,

    #[serde(default)]
    pub damage_multiplier: f64,
    #[serde(default)]
    pub damage_multiplier_additive: f64,
    #[serde(default)]
    pub crit_multiplier: f64,
    #[serde(default)]
    pub bonus_crit_percent: f64,
    #[serde(default)]
    pub bonus_hit_percent: f64,

    #[serde(default)]
    pub cost: Option<CostConfig>,
    #[serde(default)]
    pub dot: Option<PeriodicConfig>,
    #[serde(default)]
    pub hot: Option<PeriodicConfig>,

    /// Free-form knobs read by the bound behavior
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

/// A cooldown shared between several abilities of the same unit
#[derive(Debug, Clone, Deserialize)]
pub struct SharedCooldownConfig {
    pub group: String,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Resource cost, tagged by the resource spent
#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    pub kind: ResourceKind,
    /// Flat amount of the resource
    #[serde(default)]
    pub amount: f64,
    /// Percent of base mana (mana costs only)
    #[serde(default)]
    pub base_cost_percent: f64,
    /// Fraction of the cost refunded when the ability fails to land
    #[serde(default)]
    pub refund_fraction: f64,
}

/// Periodic (dot/hot) sub-configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodicConfig {
    #[serde(default)]
    pub tick_length_ms: u64,
    #[serde(default)]
    pub ticks: u32,
    #[serde(default)]
    pub haste: TickHaste,
    #[serde(default)]
    pub haste_reduces_duration: bool,
    #[serde(default)]
    pub aoe: bool,
    #[serde(default)]
    pub self_only: bool,
    #[serde(default)]
    pub bonus_coefficient: f64,
    #[serde(default)]
    pub periodic_damage_multiplier: f64,
    /// Unmodified damage (or healing) of a single tick
    #[serde(default)]
    pub base_tick_damage: f64,
    /// Optional aura label override
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub max_stacks: u32,
}

/// An untyped ability option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(v) => Some(v),
            _ => None,
        }
    }
}
