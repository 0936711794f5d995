//! Targets, fight length and the end-of-fight condition

use std::fmt;
use std::time::Duration;

use rand::Rng;
use spell_data::EncounterDef;
use tracing::debug;

use crate::config::constants;
use crate::error::SimError;
use crate::rotation::Rotation;
use crate::sim::Simulation;
use crate::time::as_millis_f64;
use crate::types::{UnitId, UnitKind};
use crate::unit::UnitStats;

/// One enemy unit of the encounter
pub struct TargetConfig {
    pub label: String,
    /// Defaults to the configured boss level
    pub level: Option<u32>,
    pub stats: UnitStats,
    pub disabled_at_start: bool,
    pub rotation: Option<Box<dyn Rotation>>,
}

impl TargetConfig {
    pub fn new(label: impl Into<String>) -> Self {
        TargetConfig {
            label: label.into(),
            level: None,
            stats: UnitStats::default(),
            disabled_at_start: false,
            rotation: None,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_health(mut self, health: f64) -> Self {
        self.stats.health = health;
        self
    }

    pub fn disabled_at_start(mut self) -> Self {
        self.disabled_at_start = true;
        self
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("label", &self.label)
            .field("level", &self.level)
            .field("disabled_at_start", &self.disabled_at_start)
            .finish()
    }
}

#[derive(Debug)]
pub struct EncounterConfig {
    pub duration: Duration,
    /// Each iteration lasts `duration` plus a uniform offset in `[-variation, variation]`
    pub duration_variation: Duration,
    /// End once the targets' summed health has been dealt
    pub use_health: bool,
    pub targets: Vec<TargetConfig>,
}

impl EncounterConfig {
    /// A fixed-length fight against one default boss
    pub fn single_target(duration: Duration) -> Self {
        EncounterConfig {
            duration,
            duration_variation: Duration::ZERO,
            use_health: false,
            targets: vec![TargetConfig::new("Target 1")],
        }
    }

    pub fn from_def(def: &EncounterDef) -> Result<Self, SimError> {
        def.validate()?;
        let targets = def
            .targets
            .iter()
            .map(|t| TargetConfig {
                label: t.name.clone(),
                level: (t.level > 0).then_some(t.level),
                stats: UnitStats {
                    health: t.health,
                    ..UnitStats::default()
                },
                disabled_at_start: t.disabled_at_start,
                rotation: None,
            })
            .collect();
        Ok(EncounterConfig {
            duration: def.duration(),
            duration_variation: def.duration_variation(),
            use_health: def.use_health,
            targets,
        })
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.duration.is_zero() && !self.use_health {
            return Err(SimError::InvalidEncounter("duration must be positive".to_string()));
        }
        if self.duration_variation >= self.duration && !self.duration_variation.is_zero() {
            return Err(SimError::InvalidEncounter(
                "duration variation must be shorter than the duration".to_string(),
            ));
        }
        if !self.targets.is_empty() && self.targets.iter().all(|t| t.disabled_at_start) {
            return Err(SimError::InvalidEncounter(
                "at least one target must be active at the start".to_string(),
            ));
        }
        Ok(())
    }
}

/// Encounter state for the current iteration
#[derive(Debug, Default)]
pub struct Encounter {
    base_duration: Duration,
    variation: Duration,
    end_at_health: f64,
    targets: Vec<UnitId>,
    active: Vec<UnitId>,
    aoe_cap_multiplier: f64,
    duration: Duration,
    damage_dealt: f64,
}

impl Encounter {
    fn new(config: &EncounterConfig, targets: Vec<UnitId>, total_health: f64) -> Self {
        let end_at_health = if config.use_health { total_health.max(1.0) } else { 0.0 };
        let base_duration = if config.use_health {
            Duration::from_secs_f64(constants().encounter.health_fight_duration_secs)
        } else {
            config.duration
        };
        Encounter {
            base_duration,
            variation: if config.use_health {
                Duration::ZERO
            } else {
                config.duration_variation
            },
            end_at_health,
            targets,
            active: Vec::new(),
            aoe_cap_multiplier: 1.0,
            duration: base_duration,
            damage_dealt: 0.0,
        }
    }

    /// Length of the current iteration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Health threshold that ends the fight; zero for fixed-length fights
    pub fn end_at_health(&self) -> f64 {
        self.end_at_health
    }

    pub fn all_targets(&self) -> &[UnitId] {
        &self.targets
    }

    /// Enabled targets, in the order they became active
    pub fn active_targets(&self) -> &[UnitId] {
        &self.active
    }

    /// Damage scale for capped aoe effects: `min(20 / active targets, 1)`
    pub fn aoe_cap_multiplier(&self) -> f64 {
        self.aoe_cap_multiplier
    }

    /// Damage dealt to enemies this iteration
    pub fn damage_dealt(&self) -> f64 {
        self.damage_dealt
    }

    /// Past the fight length, or more than the health threshold dealt
    ///
    /// Actions due at exactly the end still fire.
    pub fn is_over(&self, now: Duration) -> bool {
        now > self.duration || (self.end_at_health > 0.0 && self.damage_dealt > self.end_at_health)
    }

    pub(crate) fn record_damage(&mut self, amount: f64) {
        self.damage_dealt += amount;
    }

    fn update_aoe_cap(&mut self) {
        let cap = constants().encounter.aoe_cap_targets as f64;
        self.aoe_cap_multiplier = (cap / self.active.len().max(1) as f64).min(1.0);
    }

    pub(crate) fn reset(&mut self, active: Vec<UnitId>, rng: &mut impl Rng) {
        self.active = active;
        self.update_aoe_cap();
        self.damage_dealt = 0.0;
        self.duration = if self.variation.is_zero() {
            self.base_duration
        } else {
            let base = self.base_duration.as_secs_f64();
            let variation = self.variation.as_secs_f64();
            Duration::from_secs_f64(base + rng.gen_range(-variation..=variation))
        };
    }
}

impl Simulation {
    pub(crate) fn build_encounter(&mut self, mut config: EncounterConfig) -> Result<(), SimError> {
        config.validate()?;
        if config.targets.is_empty() {
            config.targets.push(TargetConfig::new("Target 1"));
        }
        let boss_level = constants().levels.boss_level();
        let mut ids = Vec::with_capacity(config.targets.len());
        let mut total_health = 0.0;
        for target in config.targets.iter_mut() {
            target
                .stats
                .validate()
                .map_err(|message| SimError::unit(target.label.clone(), message))?;
            total_health += target.stats.health;
            let id = self.push_unit(
                target.label.clone(),
                UnitKind::Enemy,
                target.level.unwrap_or(boss_level),
                target.stats.clone(),
                Vec::new(),
                target.rotation.take(),
            );
            self.units[id.0].enabled_at_start = !target.disabled_at_start;
            ids.push(id);
        }
        self.encounter = Encounter::new(&config, ids, total_health);
        Ok(())
    }

    pub fn encounter(&self) -> &Encounter {
        &self.encounter
    }

    pub fn is_encounter_over(&self) -> bool {
        self.encounter.is_over(self.now())
    }

    /// Bring a disabled target into the fight
    ///
    /// # Panics
    ///
    /// If `unit` is not an enemy.
    pub fn enable_target(&mut self, unit: UnitId) {
        assert!(
            self.units[unit.0].kind == UnitKind::Enemy,
            "{} ({}) is not an enemy target",
            unit,
            self.units[unit.0].label
        );
        if self.units[unit.0].enabled {
            return;
        }
        self.units[unit.0].enabled = true;
        self.encounter.active.push(unit);
        self.encounter.update_aoe_cap();
        debug!(at_ms = as_millis_f64(self.now()), target = %self.units[unit.0].label, "target enabled");
    }

    /// Take a target out of the fight; players aiming at it switch to the next active target
    ///
    /// # Panics
    ///
    /// If `unit` is not an enemy, or is the only active target.
    pub fn disable_target(&mut self, unit: UnitId, expire_auras: bool) {
        assert!(
            self.units[unit.0].kind == UnitKind::Enemy,
            "{} ({}) is not an enemy target",
            unit,
            self.units[unit.0].label
        );
        if !self.units[unit.0].enabled {
            return;
        }
        assert!(
            self.encounter.active.len() > 1,
            "cannot disable {} ({}), the only active target, at {:?}",
            unit,
            self.units[unit.0].label,
            self.now()
        );
        self.cancel_hardcast(unit);
        if let Some(action) = self.units[unit.0].ready_action.take() {
            self.clock.cancel(action);
        }
        self.units[unit.0].enabled = false;
        self.encounter.active.retain(|t| *t != unit);
        self.encounter.update_aoe_cap();
        if expire_auras {
            self.expire_all_auras(unit);
        }

        let next = self.next_active_target(unit);
        for other in self.units.iter_mut() {
            if other.current_target == Some(unit) {
                other.current_target = next;
            }
        }
        debug!(at_ms = as_millis_f64(self.now()), target = %self.units[unit.0].label, "target disabled");
    }

    /// The first active target after `from` in encounter order, wrapping around
    pub fn next_active_target(&self, from: UnitId) -> Option<UnitId> {
        let all = &self.encounter.targets;
        let start = all.iter().position(|t| *t == from).map_or(0, |i| i + 1);
        (0..all.len())
            .map(|offset| all[(start + offset) % all.len()])
            .find(|t| self.units[t.0].enabled)
    }
}
