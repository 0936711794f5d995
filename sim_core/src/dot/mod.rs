//! DoT/HoT engine
//!
//! A periodic effect composes an aura (its lifecycle) with tick state: a snapshot,
//! a haste-adjusted tick period and remaining/extra tick counters.

mod active;
mod tick;
mod types;

pub use active::{calculate_tick_count, Dot, DotSnapshot, DotState};
pub use types::DotConfig;

use crate::aura::AuraConfig;
use crate::error::SimError;
use crate::sim::Simulation;
use crate::spell::SpellFlags;
use crate::types::{AuraId, DotId, SpellId, UnitId};

/// Periodic instances created for one spell
#[derive(Debug, Clone, Default)]
pub(crate) struct PeriodicSlots {
    /// Indexed by unit
    pub per_unit: Vec<Option<DotId>>,
    /// The single instance of an aoe or self-only effect
    pub single: Option<DotId>,
}

impl PeriodicSlots {
    pub fn on(&self, target: UnitId) -> Option<DotId> {
        self.single
            .or_else(|| self.per_unit.get(target.0).copied().flatten())
    }

    pub fn iter(&self) -> impl Iterator<Item = DotId> + '_ {
        self.single.into_iter().chain(self.per_unit.iter().flatten().copied())
    }
}

impl Simulation {
    /// Create the periodic instances of `spell`: one on the caster for aoe/self-only
    /// effects, otherwise one per opponent (dots) or per ally (hots)
    pub(crate) fn create_periodic(
        &mut self,
        spell: SpellId,
        mut config: DotConfig,
        is_hot: bool,
    ) -> Result<PeriodicSlots, SimError> {
        let mut slots = PeriodicSlots {
            per_unit: vec![None; self.units.len()],
            single: None,
        };
        if config.is_empty() {
            return Ok(slots);
        }
        config.normalize();
        let spell_label = self.spells[spell.0].label.clone();
        config
            .validate()
            .map_err(|message| SimError::ability(spell_label.clone(), message))?;

        let caster = self.spells[spell.0].unit;
        let channeled = self.spells[spell.0].flags.contains(SpellFlags::CHANNELED);
        for (unit, label) in self.periodic_aura_labels(caster, &spell_label, &config, is_hot) {
            let aura = self.register_aura(
                unit,
                AuraConfig {
                    label,
                    duration: config.tick_length * config.ticks,
                    max_stacks: config.max_stacks,
                    suppressed: false,
                    refire_gain_on_refresh: false,
                    handlers: config.handlers.clone(),
                },
            )?;
            let dot = self.push_dot(spell, aura, unit, &config, is_hot, channeled);
            if config.aoe || config.self_only {
                slots.single = Some(dot);
            } else {
                slots.per_unit[unit.0] = Some(dot);
            }
        }
        Ok(slots)
    }

    /// Reject periodic configs that would fail to register, before the spell itself exists
    pub(crate) fn check_periodics(
        &self,
        caster: UnitId,
        spell_label: &str,
        dot: Option<&DotConfig>,
        hot: Option<&DotConfig>,
    ) -> Result<(), SimError> {
        let mut claimed: Vec<(UnitId, String)> = Vec::new();
        for (config, is_hot) in [(dot, false), (hot, true)] {
            let Some(config) = config.filter(|c| !c.is_empty()) else {
                continue;
            };
            config
                .validate()
                .map_err(|message| SimError::ability(spell_label, message))?;
            for (unit, label) in self.periodic_aura_labels(caster, spell_label, config, is_hot) {
                if self.units[unit.0].auras.get(&label).is_some() || claimed.contains(&(unit, label.clone())) {
                    return Err(SimError::unit(
                        self.units[unit.0].label.clone(),
                        format!("aura '{}' registered twice", label),
                    ));
                }
                claimed.push((unit, label));
            }
        }
        Ok(())
    }

    /// Owner and aura label of each instance: the caster for aoe/self-only effects,
    /// otherwise every opponent (dots) or ally (hots)
    fn periodic_aura_labels(
        &self,
        caster: UnitId,
        spell_label: &str,
        config: &DotConfig,
        is_hot: bool,
    ) -> Vec<(UnitId, String)> {
        let label = config.label.clone().unwrap_or_else(|| spell_label.to_string());
        if config.aoe || config.self_only {
            return vec![(caster, label)];
        }
        let caster_kind = self.units[caster.0].kind;
        self.units
            .iter()
            .enumerate()
            .filter(|(_, unit)| is_hot != caster_kind.is_opponent_of(unit.kind))
            .map(|(index, _)| (UnitId(index), format!("{}-{}", label, caster.0)))
            .collect()
    }

    fn push_dot(
        &mut self,
        spell: SpellId,
        aura: AuraId,
        target: UnitId,
        config: &DotConfig,
        is_hot: bool,
        channeled: bool,
    ) -> DotId {
        let id = DotId(self.dots.len());
        self.dots.push(Dot::new(id, spell, aura, target, config, is_hot, channeled));
        self.auras[aura.0].periodic = Some(id);
        id
    }
}
