//! Periodic effect configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use spell_data::{PeriodicDef, TickHaste};

use crate::aura::AuraHandler;
use crate::time::TICK_GRANULARITY;

/// Setup-time description of a damage- or healing-over-time effect
#[derive(Clone)]
pub struct DotConfig {
    /// Aura label; defaults to the owning spell's label
    pub label: Option<String>,
    pub tick_length: Duration,
    pub ticks: u32,
    pub haste: TickHaste,
    /// Haste shortens the total duration instead of adding ticks
    pub haste_reduces_duration: bool,
    pub base_duration_multiplier: f64,
    /// One instance on the caster instead of one per target
    pub aoe: bool,
    pub self_only: bool,
    pub bonus_coefficient: f64,
    /// Zero is normalized to 1
    pub periodic_damage_multiplier: f64,
    /// Damage (or healing) of one tick before multipliers
    pub base_tick_damage: f64,
    pub max_stacks: u32,
    pub handlers: Vec<Arc<dyn AuraHandler>>,
}

impl DotConfig {
    pub fn new(tick_length: Duration, ticks: u32) -> Self {
        DotConfig {
            label: None,
            tick_length,
            ticks,
            haste: TickHaste::None,
            haste_reduces_duration: false,
            base_duration_multiplier: 1.0,
            aoe: false,
            self_only: false,
            bonus_coefficient: 0.0,
            periodic_damage_multiplier: 1.0,
            base_tick_damage: 0.0,
            max_stacks: 0,
            handlers: Vec::new(),
        }
    }

    pub fn from_def(def: &PeriodicDef) -> Self {
        DotConfig {
            label: def.label.clone(),
            tick_length: def.tick_length,
            ticks: def.ticks,
            haste: def.haste,
            haste_reduces_duration: def.haste_reduces_duration,
            base_duration_multiplier: 1.0,
            aoe: def.aoe,
            self_only: def.self_only,
            bonus_coefficient: def.bonus_coefficient,
            periodic_damage_multiplier: def.periodic_damage_multiplier,
            base_tick_damage: def.base_tick_damage,
            max_stacks: def.max_stacks,
            handlers: Vec::new(),
        }
    }

    pub fn with_haste(mut self, haste: TickHaste) -> Self {
        self.haste = haste;
        self
    }

    pub fn with_tick_damage(mut self, damage: f64) -> Self {
        self.base_tick_damage = damage;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_handler(mut self, handler: impl AuraHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn haste_reduces_duration(mut self) -> Self {
        self.haste_reduces_duration = true;
        self
    }

    pub fn aoe(mut self) -> Self {
        self.aoe = true;
        self
    }

    /// Nothing to tick: no ticks and no tick length
    pub fn is_empty(&self) -> bool {
        self.ticks == 0 && self.tick_length.is_zero()
    }

    pub(crate) fn normalize(&mut self) {
        if self.periodic_damage_multiplier == 0.0 {
            self.periodic_damage_multiplier = 1.0;
        }
        if self.base_duration_multiplier == 0.0 {
            self.base_duration_multiplier = 1.0;
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.ticks > 0 && self.tick_length < TICK_GRANULARITY {
            return Err(format!(
                "periodic effect with {} ticks needs a tick length of at least 1ms",
                self.ticks
            ));
        }
        if self.ticks == 0 && !self.tick_length.is_zero() {
            return Err("periodic effect has a tick length but no ticks".to_string());
        }
        if self.aoe && self.self_only {
            return Err("periodic effect cannot be both aoe and self_only".to_string());
        }
        if self.base_duration_multiplier < 0.0 {
            return Err("base_duration_multiplier must not be negative".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for DotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DotConfig")
            .field("label", &self.label)
            .field("tick_length", &self.tick_length)
            .field("ticks", &self.ticks)
            .field("haste", &self.haste)
            .field("aoe", &self.aoe)
            .field("self_only", &self.self_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zero_multiplier() {
        let mut config = DotConfig::new(Duration::from_secs(3), 5);
        config.periodic_damage_multiplier = 0.0;
        config.normalize();
        assert_eq!(config.periodic_damage_multiplier, 1.0);
    }

    #[test]
    fn test_validate() {
        assert!(DotConfig::new(Duration::from_secs(3), 5).validate().is_ok());
        assert!(DotConfig::new(Duration::ZERO, 5).validate().is_err());
        assert!(DotConfig::new(Duration::from_secs(1), 0).validate().is_err());
        let mut both = DotConfig::new(Duration::from_secs(1), 2).aoe();
        both.self_only = true;
        assert!(both.validate().is_err());
        assert!(DotConfig::new(Duration::ZERO, 0).is_empty());
    }
}
