//! Abilities: registration, flags and per-iteration state
//!
//! Gating and casting live in [`cast`], resource costs in [`cost`], effect
//! callbacks in [`behavior`].

pub mod behavior;
mod cast;
pub mod cost;

pub use behavior::{AbilityBehavior, ApplyPeriodic, BehaviorRegistry, DirectDamage, DirectHeal, NoEffect};
pub use cost::{ManaCost, PowerCost, ResourceCost, SpellCost};

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use spell_data::{AbilityDef, OptionValue, SpellSchool};
use tracing::debug;

use crate::clock::ActionId;
use crate::config::constants;
use crate::dot::{DotConfig, PeriodicSlots};
use crate::error::SimError;
use crate::metrics::SpellMetrics;
use crate::sim::Simulation;
use crate::types::{DotId, SpellId, TimerId, UnitId};

/// Behavior switches of an ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SpellFlags(u32);

impl SpellFlags {
    pub const NONE: SpellFlags = SpellFlags(0);
    /// Occupies the caster while its periodic effect ticks
    pub const CHANNELED: SpellFlags = SpellFlags(1 << 0);
    pub const CAN_CAST_WHILE_MOVING: SpellFlags = SpellFlags(1 << 1);
    /// May be used during a channel without interrupting it
    pub const CAST_WHILE_CHANNELING: SpellFlags = SpellFlags(1 << 2);
    /// Periodic applications are ignored
    pub const SUPPRESS_DOT_APPLY: SpellFlags = SpellFlags(1 << 3);
    pub const NO_METRICS: SpellFlags = SpellFlags(1 << 4);
    /// Landing does not fire the caster's cast-complete hooks
    pub const NO_ON_CAST_COMPLETE: SpellFlags = SpellFlags(1 << 5);
    /// Temporarily replaced by another ability and cannot be cast
    pub const SWAPPED: SpellFlags = SpellFlags(1 << 6);
    pub const IGNORE_HASTE: SpellFlags = SpellFlags(1 << 7);

    pub fn contains(self, other: SpellFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SpellFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SpellFlags) {
        self.0 &= !other.0;
    }

    pub fn from_name(name: &str) -> Option<SpellFlags> {
        let flag = match name {
            "channeled" => Self::CHANNELED,
            "can_cast_while_moving" => Self::CAN_CAST_WHILE_MOVING,
            "cast_while_channeling" => Self::CAST_WHILE_CHANNELING,
            "suppress_dot_apply" => Self::SUPPRESS_DOT_APPLY,
            "no_metrics" => Self::NO_METRICS,
            "no_on_cast_complete" => Self::NO_ON_CAST_COMPLETE,
            "swapped" => Self::SWAPPED,
            "ignore_haste" => Self::IGNORE_HASTE,
            _ => return None,
        };
        Some(flag)
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<SpellFlags, String> {
        names.into_iter().try_fold(SpellFlags::NONE, |flags, name| {
            SpellFlags::from_name(name)
                .map(|flag| flags | flag)
                .ok_or_else(|| format!("unknown flag '{}'", name))
        })
    }
}

impl BitOr for SpellFlags {
    type Output = SpellFlags;

    fn bitor(self, rhs: SpellFlags) -> SpellFlags {
        SpellFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SpellFlags {
    fn bitor_assign(&mut self, rhs: SpellFlags) {
        self.0 |= rhs.0;
    }
}

/// Cast time and global cooldown of a castable ability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CastConfig {
    pub cast_time: Duration,
    pub gcd: Duration,
}

impl CastConfig {
    pub fn instant(gcd: Duration) -> Self {
        CastConfig {
            cast_time: Duration::ZERO,
            gcd,
        }
    }

    pub fn hardcast(cast_time: Duration, gcd: Duration) -> Self {
        CastConfig { cast_time, gcd }
    }

    /// Instant and off the global cooldown
    pub fn off_gcd() -> Self {
        CastConfig::default()
    }
}

/// A cooldown on a timer; the timer may be shared with other abilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    /// `None` registers a private timer
    pub timer: Option<TimerId>,
    pub duration: Duration,
}

impl Cooldown {
    pub fn new(duration: Duration) -> Self {
        Cooldown { timer: None, duration }
    }

    pub fn shared(timer: TimerId, duration: Duration) -> Self {
        Cooldown {
            timer: Some(timer),
            duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveCooldown {
    pub timer: TimerId,
    pub duration: Duration,
}

/// Setup-time description of an ability
pub struct SpellConfig {
    pub label: String,
    pub school: SpellSchool,
    pub flags: SpellFlags,
    /// `None` for procs and other effects that are never cast by a rotation
    pub cast: Option<CastConfig>,
    pub cooldown: Option<Cooldown>,
    pub shared_cooldown: Option<Cooldown>,
    pub max_charges: u32,
    pub recharge_time: Duration,
    pub min_range: f64,
    pub max_range: f64,
    pub cost: Option<SpellCost>,
    pub damage_multiplier: f64,
    pub damage_multiplier_additive: f64,
    /// Zero picks the configured default for the school
    pub crit_multiplier: f64,
    pub bonus_crit_percent: f64,
    pub bonus_hit_percent: f64,
    pub cast_time_multiplier: f64,
    pub cd_multiplier: f64,
    pub dot: Option<DotConfig>,
    pub hot: Option<DotConfig>,
    pub behavior: Option<Arc<dyn AbilityBehavior>>,
    pub options: BTreeMap<String, OptionValue>,
}

impl SpellConfig {
    pub fn new(label: impl Into<String>) -> Self {
        SpellConfig {
            label: label.into(),
            school: SpellSchool::None,
            flags: SpellFlags::NONE,
            cast: None,
            cooldown: None,
            shared_cooldown: None,
            max_charges: 0,
            recharge_time: Duration::ZERO,
            min_range: 0.0,
            max_range: 0.0,
            cost: None,
            damage_multiplier: 1.0,
            damage_multiplier_additive: 1.0,
            crit_multiplier: 0.0,
            bonus_crit_percent: 0.0,
            bonus_hit_percent: 0.0,
            cast_time_multiplier: 1.0,
            cd_multiplier: 1.0,
            dot: None,
            hot: None,
            behavior: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_school(mut self, school: SpellSchool) -> Self {
        self.school = school;
        self
    }

    pub fn with_flags(mut self, flags: SpellFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_cast(mut self, cast: CastConfig) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn with_cooldown(mut self, duration: Duration) -> Self {
        self.cooldown = Some(Cooldown::new(duration));
        self
    }

    pub fn with_shared_cooldown(mut self, timer: TimerId, duration: Duration) -> Self {
        self.shared_cooldown = Some(Cooldown::shared(timer, duration));
        self
    }

    pub fn with_charges(mut self, max_charges: u32, recharge_time: Duration) -> Self {
        self.max_charges = max_charges;
        self.recharge_time = recharge_time;
        self
    }

    pub fn with_cost(mut self, cost: SpellCost) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_dot(mut self, dot: DotConfig) -> Self {
        self.dot = Some(dot);
        self
    }

    pub fn with_hot(mut self, hot: DotConfig) -> Self {
        self.hot = Some(hot);
        self
    }

    pub fn with_behavior(mut self, behavior: impl AbilityBehavior + 'static) -> Self {
        self.behavior = Some(Arc::new(behavior));
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    /// Build from a data-file definition; abilities from data are always castable
    pub fn from_def(def: &AbilityDef, behavior: Arc<dyn AbilityBehavior>) -> Result<Self, SimError> {
        let flags = SpellFlags::from_names(def.flags.iter().map(String::as_str))
            .map_err(|message| SimError::ability(def.id.clone(), message))?;
        Ok(SpellConfig {
            label: def.id.clone(),
            school: def.school,
            flags,
            cast: Some(CastConfig::hardcast(def.cast_time, def.gcd)),
            cooldown: (!def.cooldown.is_zero()).then(|| Cooldown::new(def.cooldown)),
            shared_cooldown: None,
            max_charges: def.charges,
            recharge_time: def.recharge_time,
            min_range: def.min_range,
            max_range: def.max_range,
            cost: def.cost.as_ref().map(SpellCost::from_def),
            damage_multiplier: def.damage_multiplier,
            damage_multiplier_additive: def.damage_multiplier_additive,
            crit_multiplier: def.crit_multiplier,
            bonus_crit_percent: def.bonus_crit_percent,
            bonus_hit_percent: def.bonus_hit_percent,
            cast_time_multiplier: 1.0,
            cd_multiplier: 1.0,
            dot: def.dot.as_ref().map(DotConfig::from_def),
            hot: def.hot.as_ref().map(DotConfig::from_def),
            behavior: Some(behavior),
            options: def.options.clone(),
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.label.trim().is_empty() {
            return Err("label must not be empty".to_string());
        }
        if self.max_charges > 0 && self.recharge_time.is_zero() {
            return Err("has charges but no recharge time".to_string());
        }
        if matches!(self.cooldown, Some(cd) if cd.duration.is_zero()) {
            return Err("cooldown timer without a duration".to_string());
        }
        match self.shared_cooldown {
            Some(Cooldown { timer: None, .. }) => {
                return Err("shared cooldown without a timer".to_string());
            }
            Some(cd) if cd.duration.is_zero() => {
                return Err("shared cooldown timer without a duration".to_string());
            }
            _ => {}
        }
        if self.cost.is_some() && self.cast.is_none() {
            return Err("has a cost but no cast definition".to_string());
        }
        let sets_multiplier = |m: f64| m != 0.0 && m != 1.0;
        if self.school == SpellSchool::None
            && (sets_multiplier(self.damage_multiplier) || sets_multiplier(self.damage_multiplier_additive))
        {
            return Err("damage multiplier set without a school".to_string());
        }
        if self.cast_time_multiplier < 0.0 || self.cd_multiplier < 0.0 {
            return Err("cast time and cooldown multipliers must not be negative".to_string());
        }
        for periodic in self.dot.iter().chain(self.hot.iter()) {
            if !periodic.is_empty() {
                periodic.validate()?;
            }
        }
        if self.flags.contains(SpellFlags::CHANNELED) && self.dot.is_none() && self.hot.is_none() {
            return Err("channeled ability without a periodic effect".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for SpellConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpellConfig")
            .field("label", &self.label)
            .field("school", &self.school)
            .field("flags", &self.flags)
            .field("cast", &self.cast)
            .field("cooldown", &self.cooldown)
            .field("max_charges", &self.max_charges)
            .finish()
    }
}

pub struct Spell {
    pub(crate) id: SpellId,
    pub(crate) unit: UnitId,
    pub label: String,
    pub school: SpellSchool,
    pub flags: SpellFlags,
    pub(crate) cast: Option<CastConfig>,
    pub(crate) cooldown: Option<ActiveCooldown>,
    pub(crate) shared_cooldown: Option<ActiveCooldown>,

    pub(crate) max_charges: u32,
    pub(crate) charges: u32,
    pub(crate) recharge_time: Duration,
    pub(crate) recharge_action: Option<ActionId>,
    pub(crate) recharge_due: Duration,

    pub min_range: f64,
    pub max_range: f64,
    pub cost: Option<SpellCost>,
    pub damage_multiplier: f64,
    pub damage_multiplier_additive: f64,
    pub crit_multiplier: f64,
    pub bonus_crit_percent: f64,
    pub bonus_hit_percent: f64,
    pub cast_time_multiplier: f64,
    pub cd_multiplier: f64,
    pub options: BTreeMap<String, OptionValue>,

    pub(crate) behavior: Arc<dyn AbilityBehavior>,
    pub(crate) dots: PeriodicSlots,
    pub(crate) hots: PeriodicSlots,
    pub(crate) metrics: Vec<SpellMetrics>,
    pub(crate) casts: u32,
}

impl Spell {
    pub fn id(&self) -> SpellId {
        self.id
    }

    /// The casting unit
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn cast_config(&self) -> Option<CastConfig> {
        self.cast
    }

    pub fn max_charges(&self) -> u32 {
        self.max_charges
    }

    pub fn recharge_time(&self) -> Duration {
        self.recharge_time
    }

    pub fn cooldown_timer(&self) -> Option<TimerId> {
        self.cooldown.map(|cd| cd.timer)
    }

    pub fn shared_cooldown_timer(&self) -> Option<TimerId> {
        self.shared_cooldown.map(|cd| cd.timer)
    }

    /// Total casts landed this iteration
    pub fn casts(&self) -> u32 {
        self.casts
    }

    pub fn metrics_on(&self, target: UnitId) -> &SpellMetrics {
        &self.metrics[target.0]
    }

    pub fn dot_on(&self, target: UnitId) -> Option<DotId> {
        self.dots.on(target)
    }

    pub fn hot_on(&self, target: UnitId) -> Option<DotId> {
        self.hots.on(target)
    }

    /// Every periodic instance of this spell, dots first
    pub fn periodic_instances(&self) -> impl Iterator<Item = DotId> + '_ {
        self.dots.iter().chain(self.hots.iter())
    }

    pub fn option_f64(&self, name: &str) -> Option<f64> {
        self.options.get(name).and_then(OptionValue::as_f64)
    }

    pub fn option_bool(&self, name: &str) -> Option<bool> {
        self.options.get(name).and_then(OptionValue::as_bool)
    }

    pub(crate) fn reset(&mut self) {
        self.charges = self.max_charges;
        self.recharge_action = None;
        self.recharge_due = Duration::ZERO;
        self.casts = 0;
        for metrics in &mut self.metrics {
            *metrics = SpellMetrics::default();
        }
        if let Some(cost) = self.cost.as_mut() {
            cost.reset();
        }
    }
}

impl fmt::Debug for Spell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spell")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("unit", &self.unit)
            .field("flags", &self.flags)
            .field("charges", &self.charges)
            .finish()
    }
}

impl Simulation {
    /// Register an ability on `unit`
    ///
    /// All units must exist before the first ability is registered, since periodic
    /// effects get one instance per eligible unit.
    pub fn register_spell(&mut self, unit: UnitId, mut config: SpellConfig) -> Result<SpellId, SimError> {
        let casting = &constants().casting;
        if self.units[unit.0].spellbook.len() >= casting.max_spells_per_unit {
            return Err(SimError::unit(
                self.units[unit.0].label.clone(),
                format!("more than {} abilities registered", casting.max_spells_per_unit),
            ));
        }
        if self.units[unit.0].spellbook.iter().any(|s| self.spells[s.0].label == config.label) {
            return Err(SimError::ability(config.label, "registered twice on the same unit"));
        }
        config
            .validate()
            .map_err(|message| SimError::ability(config.label.clone(), message))?;
        self.check_periodics(unit, &config.label, config.dot.as_ref(), config.hot.as_ref())?;

        if config.damage_multiplier == 0.0 {
            config.damage_multiplier = 1.0;
        }
        if config.damage_multiplier_additive == 0.0 {
            config.damage_multiplier_additive = 1.0;
        }
        if config.crit_multiplier == 0.0 {
            config.crit_multiplier = if config.school.is_physical() {
                casting.physical_crit_multiplier
            } else {
                casting.spell_crit_multiplier
            };
        }

        let cooldown = config.cooldown.map(|cd| ActiveCooldown {
            timer: cd.timer.unwrap_or_else(|| self.new_timer()),
            duration: cd.duration,
        });
        let shared_cooldown = config.shared_cooldown.and_then(|cd| {
            cd.timer.map(|timer| ActiveCooldown {
                timer,
                duration: cd.duration,
            })
        });

        let id = SpellId(self.spells.len());
        let behavior: Arc<dyn AbilityBehavior> = match config.behavior.take() {
            Some(behavior) => behavior,
            None if config.dot.is_some() || config.hot.is_some() => Arc::new(ApplyPeriodic),
            None => Arc::new(NoEffect),
        };
        self.spells.push(Spell {
            id,
            unit,
            label: config.label,
            school: config.school,
            flags: config.flags,
            cast: config.cast,
            cooldown,
            shared_cooldown,
            max_charges: config.max_charges,
            charges: config.max_charges,
            recharge_time: config.recharge_time,
            recharge_action: None,
            recharge_due: Duration::ZERO,
            min_range: config.min_range,
            max_range: config.max_range,
            cost: config.cost,
            damage_multiplier: config.damage_multiplier,
            damage_multiplier_additive: config.damage_multiplier_additive,
            crit_multiplier: config.crit_multiplier,
            bonus_crit_percent: config.bonus_crit_percent,
            bonus_hit_percent: config.bonus_hit_percent,
            cast_time_multiplier: config.cast_time_multiplier,
            cd_multiplier: config.cd_multiplier,
            options: config.options,
            behavior,
            dots: PeriodicSlots::default(),
            hots: PeriodicSlots::default(),
            metrics: vec![SpellMetrics::default(); self.units.len()],
            casts: 0,
        });
        self.units[unit.0].spellbook.push(id);
        self.spells_registered = true;

        if let Some(dot) = config.dot {
            self.spells[id.0].dots = self.create_periodic(id, dot, false)?;
        }
        if let Some(hot) = config.hot {
            self.spells[id.0].hots = self.create_periodic(id, hot, true)?;
        }
        debug!(unit = %self.units[unit.0].label, spell = %self.spells[id.0].label, %id, "registered ability");
        Ok(id)
    }

    /// Register a data-file ability, resolving its behavior and shared cooldown group
    pub fn register_ability(
        &mut self,
        unit: UnitId,
        def: &AbilityDef,
        behaviors: &BehaviorRegistry,
    ) -> Result<SpellId, SimError> {
        let behavior = behaviors.resolve(def)?;
        let mut config = SpellConfig::from_def(def, behavior)?;
        if let Some(shared) = &def.shared_cooldown {
            let timer = self.named_timer(unit, &shared.group);
            config.shared_cooldown = Some(Cooldown::shared(timer, shared.duration));
        }
        self.register_spell(unit, config)
    }

    pub fn spell(&self, id: SpellId) -> &Spell {
        &self.spells[id.0]
    }

    pub fn spell_mut(&mut self, id: SpellId) -> &mut Spell {
        &mut self.spells[id.0]
    }

    pub fn find_spell(&self, unit: UnitId, label: &str) -> Option<SpellId> {
        self.units[unit.0]
            .spellbook
            .iter()
            .copied()
            .find(|id| self.spells[id.0].label == label)
    }

    /// A fresh cooldown timer, ready at time zero
    pub fn new_timer(&mut self) -> TimerId {
        self.timers.push(Duration::ZERO);
        TimerId(self.timers.len() - 1)
    }

    /// The unit's timer for a named cooldown group, created on first use
    pub fn named_timer(&mut self, unit: UnitId, name: &str) -> TimerId {
        if let Some(timer) = self.units[unit.0].named_timers.get(name) {
            return *timer;
        }
        let timer = self.new_timer();
        self.units[unit.0].named_timers.insert(name.to_string(), timer);
        timer
    }
}
