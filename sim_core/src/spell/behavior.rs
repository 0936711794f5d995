//! Effect callbacks supplied per ability
//!
//! The engine calls these at fixed points: when a cast lands, when a periodic
//! effect snapshots, and on every tick. Ability catalogs implement
//! [`AbilityBehavior`]; the built-ins cover abilities described purely by data.

use std::collections::HashMap;
use std::sync::Arc;

use spell_data::AbilityDef;

use crate::combat::OutcomeKind;
use crate::error::SimError;
use crate::sim::Simulation;
use crate::types::{DotId, SpellId, UnitId};

pub trait AbilityBehavior: Send + Sync {
    /// The cast landed on `target`
    fn apply_effects(&self, _sim: &mut Simulation, _target: UnitId, _spell: SpellId) {}

    /// One tick of a periodic effect
    fn on_tick(&self, sim: &mut Simulation, _target: UnitId, dot: DotId) {
        sim.deal_periodic_tick(dot);
    }

    /// Capture the values ticks will use
    fn on_snapshot(&self, sim: &mut Simulation, target: UnitId, dot: DotId, is_rollover: bool) {
        sim.snapshot_periodic(dot, target, is_rollover);
    }

    /// Extra gate checked by `can_cast`
    fn extra_cast_condition(&self, _sim: &Simulation, _target: UnitId, _spell: SpellId) -> bool {
        true
    }
}

/// Does nothing when it lands
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEffect;

impl AbilityBehavior for NoEffect {}

/// Direct damage from the `base_damage` option, resolved through the attack table
///
/// The `outcome` option (`melee_special`, `melee_white`, `ranged`, `spell`) picks
/// the outcome kind; by default physical abilities roll as melee specials.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDamage;

impl AbilityBehavior for DirectDamage {
    fn apply_effects(&self, sim: &mut Simulation, target: UnitId, spell: SpellId) {
        let s = sim.spell(spell);
        let base = s.option_f64("base_damage").unwrap_or(0.0);
        let kind = s
            .options
            .get("outcome")
            .and_then(|v| v.as_str())
            .and_then(OutcomeKind::from_name)
            .unwrap_or(if s.school.is_physical() {
                OutcomeKind::MeleeSpecial
            } else {
                OutcomeKind::Spell
            });
        sim.calc_and_deal_damage(spell, target, base, kind);
    }
}

/// Direct healing from the `base_healing` option
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectHeal;

impl AbilityBehavior for DirectHeal {
    fn apply_effects(&self, sim: &mut Simulation, target: UnitId, spell: SpellId) {
        let base = sim.spell(spell).option_f64("base_healing").unwrap_or(0.0);
        sim.calc_and_deal_healing(spell, target, base);
    }
}

/// Applies the ability's periodic effects on the target
///
/// Hots land on the caster when the target is an opponent. With the
/// `base_damage` option set, a direct hit is dealt first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyPeriodic;

impl AbilityBehavior for ApplyPeriodic {
    fn apply_effects(&self, sim: &mut Simulation, target: UnitId, spell: SpellId) {
        let s = sim.spell(spell);
        let caster = s.unit();
        let direct = s.option_f64("base_damage");
        let dot = s.dot_on(target);
        let hot = s.hot_on(target).or_else(|| s.hot_on(caster));

        if let Some(base) = direct {
            let result = sim.calc_and_deal_damage(spell, target, base, OutcomeKind::Spell);
            if !result.landed() {
                return;
            }
        }
        if let Some(dot) = dot {
            sim.apply_dot(dot);
        }
        if let Some(hot) = hot {
            sim.apply_dot(hot);
        }
    }
}

/// Named behaviors that data-file abilities can refer to
#[derive(Clone)]
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Arc<dyn AbilityBehavior>>,
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl BehaviorRegistry {
    pub fn empty() -> Self {
        BehaviorRegistry {
            behaviors: HashMap::new(),
        }
    }

    /// `none`, `direct_damage`, `direct_heal` and `apply_periodic`
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("none", NoEffect);
        registry.register("direct_damage", DirectDamage);
        registry.register("direct_heal", DirectHeal);
        registry.register("apply_periodic", ApplyPeriodic);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, behavior: impl AbilityBehavior + 'static) {
        self.behaviors.insert(name.into(), Arc::new(behavior));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AbilityBehavior>> {
        self.behaviors.get(name).cloned()
    }

    /// Behavior for a definition; abilities without one apply their periodic effects, if any
    pub fn resolve(&self, def: &AbilityDef) -> Result<Arc<dyn AbilityBehavior>, SimError> {
        match def.behavior.as_deref() {
            Some(name) => self.get(name).ok_or_else(|| SimError::UnknownBehavior {
                ability: def.id.clone(),
                behavior: name.to_string(),
            }),
            None if def.dot.is_some() || def.hot.is_some() => Ok(Arc::new(ApplyPeriodic)),
            None => Ok(Arc::new(NoEffect)),
        }
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.behaviors.keys().collect();
        names.sort();
        f.debug_struct("BehaviorRegistry").field("behaviors", &names).finish()
    }
}
