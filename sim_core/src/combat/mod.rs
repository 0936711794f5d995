//! Attack resolution
//!
//! Tables are built for every ordered pair of units and rolled once per damage or
//! healing event. The table only classifies an attack; abilities decide what each
//! outcome means through the helpers here.

mod attack_table;
mod outcome;
mod result;

pub use attack_table::AttackTable;
pub use outcome::{HitOutcome, OutcomeChances, OutcomeKind};
pub use result::SpellResult;

use rand::Rng;
use tracing::trace;

use crate::config::constants;
use crate::sim::Simulation;
use crate::spell::SpellFlags;
use crate::time::as_millis_f64;
use crate::types::{DotId, SpellId, UnitId, UnitKind};

impl Simulation {
    pub fn attack_table(&self, attacker: UnitId, defender: UnitId) -> &AttackTable {
        &self.attack_tables[attacker.0][defender.0]
    }

    pub fn attack_table_mut(&mut self, attacker: UnitId, defender: UnitId) -> &mut AttackTable {
        &mut self.attack_tables[attacker.0][defender.0]
    }

    /// Rebuild the level-based rows of every table `unit` takes part in
    pub fn recompute_attack_tables(&mut self, unit: UnitId) {
        for other in 0..self.units.len() {
            let (a, b) = (&self.units[unit.0], &self.units[other]);
            self.attack_tables[unit.0][other].recompute_baseline(a, b);
            self.attack_tables[other][unit.0].recompute_baseline(b, a);
        }
    }

    pub(crate) fn rebuild_attack_tables(&mut self) {
        self.attack_tables = self
            .units
            .iter()
            .map(|attacker| self.units.iter().map(|defender| AttackTable::new(attacker, defender)).collect())
            .collect();
    }

    /// Uniform draw in [0, 1) from the iteration's stream
    pub fn roll(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Roll an attack and compute its damage without applying it
    pub fn calc_damage(&mut self, spell: SpellId, target: UnitId, base: f64, kind: OutcomeKind) -> SpellResult {
        let roll = self.roll();
        let s = &self.spells[spell.0];
        let caster = &self.units[s.unit.0];
        let table = &self.attack_tables[s.unit.0][target.0];
        let chances = table.chances(caster, kind, s.school.is_physical(), s.bonus_crit_percent, s.bonus_hit_percent);
        let outcome = chances.classify(roll);

        let mut amount = base
            * s.damage_multiplier
            * s.damage_multiplier_additive
            * table.damage_dealt_multiplier
            * table.damage_taken_multiplier;
        if kind == OutcomeKind::Ranged {
            amount *= table.ranged_damage_taken_multiplier;
        }
        amount *= match outcome {
            HitOutcome::Miss | HitOutcome::Dodge | HitOutcome::Parry => 0.0,
            HitOutcome::Block => 1.0 - constants().attack_table.block_reduction,
            HitOutcome::Glance => table.glance_multiplier,
            HitOutcome::Crit => s.crit_multiplier,
            HitOutcome::Hit => 1.0,
        };
        SpellResult {
            spell,
            target,
            outcome,
            amount: amount.max(0.0),
            is_healing: false,
            is_periodic: kind == OutcomeKind::Periodic,
        }
    }

    /// Apply a computed result to the target and the spell's metrics
    pub fn deal_damage(&mut self, result: &SpellResult) {
        let now = self.now();
        let spell = &mut self.spells[result.spell.0];
        trace!(
            at_ms = as_millis_f64(now),
            spell = %spell.label,
            target = %result.target,
            outcome = ?result.outcome,
            amount = result.amount,
            "damage"
        );
        if !spell.flags.contains(SpellFlags::NO_METRICS) {
            spell.metrics[result.target.0].record(result);
        }
        let target = &mut self.units[result.target.0];
        if result.is_healing {
            target.healing_taken += result.amount;
        } else {
            target.damage_taken += result.amount;
            if target.kind == UnitKind::Enemy {
                self.encounter.record_damage(result.amount);
            }
        }
    }

    pub fn calc_and_deal_damage(&mut self, spell: SpellId, target: UnitId, base: f64, kind: OutcomeKind) -> SpellResult {
        let result = self.calc_damage(spell, target, base, kind);
        self.deal_damage(&result);
        result
    }

    /// Direct healing; rolls for crit only
    pub fn calc_and_deal_healing(&mut self, spell: SpellId, target: UnitId, base: f64) -> SpellResult {
        let roll = self.roll();
        let s = &self.spells[spell.0];
        let caster = &self.units[s.unit.0];
        let table = &self.attack_tables[s.unit.0][target.0];
        let chances = table.chances(caster, OutcomeKind::Healing, false, s.bonus_crit_percent, 0.0);
        let outcome = chances.classify(roll);
        let mut amount = base * table.healing_dealt_multiplier;
        if outcome == HitOutcome::Crit {
            amount *= s.crit_multiplier;
        }
        let result = SpellResult {
            spell,
            target,
            outcome,
            amount: amount.max(0.0),
            is_healing: true,
            is_periodic: false,
        };
        self.deal_damage(&result);
        result
    }

    /// Default snapshot: base tick damage with the caster's current multipliers and crit
    ///
    /// A rollover keeps the previous snapshot untouched.
    pub fn snapshot_periodic(&mut self, dot: DotId, target: UnitId, is_rollover: bool) {
        if is_rollover {
            return;
        }
        let d = &self.dots[dot.0];
        let s = &self.spells[d.spell.0];
        let caster = &self.units[s.unit.0];
        let table = &self.attack_tables[s.unit.0][target.0];
        let kind = if d.is_hot {
            OutcomeKind::Healing
        } else {
            OutcomeKind::Periodic
        };
        let crit_chance = table
            .chances(caster, kind, s.school.is_physical(), s.bonus_crit_percent, 0.0)
            .crit;
        let (base_damage, attacker_multiplier) = if d.is_hot {
            (d.base_tick_damage * d.periodic_damage_multiplier, table.healing_dealt_multiplier)
        } else {
            (
                d.base_tick_damage * d.periodic_damage_multiplier * s.damage_multiplier * s.damage_multiplier_additive,
                table.damage_dealt_multiplier,
            )
        };
        self.dots[dot.0].snapshot = crate::dot::DotSnapshot {
            base_damage,
            crit_chance,
            attacker_multiplier,
        };
    }

    /// Default tick: deal the snapshot to the effect's target, or to every active
    /// target for an aoe effect
    pub fn deal_periodic_tick(&mut self, dot: DotId) {
        let d = &self.dots[dot.0];
        let (spell, is_hot, snapshot) = (d.spell, d.is_hot, d.snapshot);
        let caster = self.spells[spell.0].unit;
        let crit_multiplier = self.spells[spell.0].crit_multiplier;
        let (targets, cap) = if d.aoe && !is_hot {
            (self.encounter.active_targets().to_vec(), self.encounter.aoe_cap_multiplier())
        } else {
            (vec![d.target], 1.0)
        };

        for target in targets {
            let crit = self.roll() < snapshot.crit_chance;
            let mut amount = snapshot.base_damage * snapshot.attacker_multiplier * cap;
            if !is_hot {
                amount *= self.attack_tables[caster.0][target.0].damage_taken_multiplier;
            }
            if crit {
                amount *= crit_multiplier;
            }
            let result = SpellResult {
                spell,
                target,
                outcome: if crit { HitOutcome::Crit } else { HitOutcome::Hit },
                amount,
                is_healing: is_hot,
                is_periodic: true,
            };
            self.deal_damage(&result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot::DotConfig;
    use crate::sim::testing::sim_with_target;
    use crate::spell::{CastConfig, SpellConfig};
    use crate::unit::UnitStats;
    use spell_data::SpellSchool;
    use std::time::Duration;

    fn bolt(sim: &mut Simulation, player: UnitId) -> SpellId {
        sim.register_spell(
            player,
            SpellConfig::new("bolt")
                .with_school(SpellSchool::Fire)
                .with_cast(CastConfig::instant(Duration::from_millis(1500))),
        )
        .unwrap()
    }

    #[test]
    fn test_guaranteed_hit_and_crit() {
        let (mut sim, player, target) = sim_with_target();
        sim.update_unit_stats(
            player,
            UnitStats {
                spell_hit_percent: 15.0,
                spell_crit_percent: 110.0,
                ..UnitStats::default()
            },
        );
        let spell = bolt(&mut sim, player);
        let result = sim.calc_and_deal_damage(spell, target, 1000.0, OutcomeKind::Spell);
        assert_eq!(result.outcome, HitOutcome::Crit);
        assert_eq!(result.amount, 2000.0);
        assert_eq!(sim.unit(target).damage_taken(), 2000.0);

        let metrics = sim.spell(spell).metrics_on(target);
        assert_eq!(metrics.crits, 1);
        assert_eq!(metrics.damage, 2000.0);
    }

    #[test]
    fn test_miss_deals_nothing() {
        let (mut sim, player, target) = sim_with_target();
        sim.update_unit_stats(
            player,
            UnitStats {
                spell_hit_percent: -100.0,
                ..UnitStats::default()
            },
        );
        let spell = bolt(&mut sim, player);
        let result = sim.calc_and_deal_damage(spell, target, 1000.0, OutcomeKind::Spell);
        assert!(!result.landed());
        assert_eq!(result.amount, 0.0);
        assert_eq!(sim.spell(spell).metrics_on(target).misses, 1);
    }

    #[test]
    fn test_damage_multipliers_stack() {
        let (mut sim, player, target) = sim_with_target();
        sim.update_unit_stats(
            player,
            UnitStats {
                spell_hit_percent: 15.0,
                spell_crit_percent: -100.0,
                ..UnitStats::default()
            },
        );
        let spell = bolt(&mut sim, player);
        sim.spell_mut(spell).damage_multiplier = 1.5;
        sim.attack_table_mut(player, target).damage_taken_multiplier = 2.0;
        let result = sim.calc_damage(spell, target, 100.0, OutcomeKind::Spell);
        assert_eq!(result.outcome, HitOutcome::Hit);
        assert_eq!(result.amount, 300.0);
        assert_eq!(sim.unit(target).damage_taken(), 0.0, "calc_damage must not apply");
    }

    #[test]
    fn test_periodic_snapshot_and_tick() {
        let (mut sim, player, target) = sim_with_target();
        let spell = sim
            .register_spell(
                player,
                SpellConfig::new("burn")
                    .with_school(SpellSchool::Fire)
                    .with_cast(CastConfig::instant(Duration::from_millis(1500)))
                    .with_dot(DotConfig::new(Duration::from_secs(2), 3).with_tick_damage(100.0)),
            )
            .unwrap();
        let dot = sim.spell(spell).dot_on(target).unwrap();
        sim.attack_table_mut(player, target).damage_dealt_multiplier = 1.2;
        assert!(sim.cast(spell, Some(target)));
        assert_eq!(sim.dot(dot).snapshot.attacker_multiplier, 1.2);

        // a later buff does not change the running snapshot
        sim.attack_table_mut(player, target).damage_dealt_multiplier = 2.0;
        sim.run_until(Duration::from_secs(6));
        let metrics = sim.spell(spell).metrics_on(target);
        assert_eq!(metrics.ticks, 3);
        let expected_min = 3.0 * 120.0;
        assert!(metrics.damage >= expected_min - 1e-9);
    }

    #[test]
    fn test_healing_goes_to_healing_taken() {
        let (mut sim, player, _) = sim_with_target();
        let spell = sim
            .register_spell(player, SpellConfig::new("mend").with_school(SpellSchool::Holy))
            .unwrap();
        let result = sim.calc_and_deal_healing(spell, player, 500.0);
        assert!(result.is_healing);
        assert!(sim.unit(player).healing_taken() >= 500.0);
        assert_eq!(sim.unit(player).damage_taken(), 0.0);
        assert_eq!(sim.spell(spell).metrics_on(player).healing, result.amount);
    }
}
