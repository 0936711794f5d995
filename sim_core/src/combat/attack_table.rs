//! Pairwise outcome probabilities

use serde::Serialize;

use super::outcome::{OutcomeChances, OutcomeKind};
use crate::config::constants;
use crate::types::{UnitId, UnitKind};
use crate::unit::Unit;

/// Cached outcome probabilities and modifiers for one attacker/defender pair
///
/// The `base_*` fields, glance multiplier and crit suppression come from the level
/// difference and are only rewritten by [`AttackTable::recompute_baseline`]. The
/// remaining fields are adjustments owned by auras and abilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackTable {
    pub attacker: UnitId,
    pub defender: UnitId,

    pub base_miss_chance: f64,
    pub base_spell_miss_chance: f64,
    pub base_dodge_chance: f64,
    pub base_parry_chance: f64,
    pub base_block_chance: f64,
    pub base_glance_chance: f64,
    pub glance_multiplier: f64,
    pub melee_crit_suppression: f64,
    pub spell_crit_suppression: f64,

    pub damage_dealt_multiplier: f64,
    pub damage_taken_multiplier: f64,
    pub healing_dealt_multiplier: f64,
    pub ranged_damage_taken_multiplier: f64,
    pub ignore_armor: bool,
    pub armor_ignore_factor: f64,
    /// Extra spell crit percent for this attacker only
    pub bonus_spell_crit_percent: f64,
}

impl AttackTable {
    pub fn new(attacker: &Unit, defender: &Unit) -> Self {
        let mut table = AttackTable {
            attacker: attacker.id,
            defender: defender.id,
            base_miss_chance: 0.0,
            base_spell_miss_chance: 0.0,
            base_dodge_chance: 0.0,
            base_parry_chance: 0.0,
            base_block_chance: 0.0,
            base_glance_chance: 0.0,
            glance_multiplier: 1.0,
            melee_crit_suppression: 0.0,
            spell_crit_suppression: 0.0,
            damage_dealt_multiplier: 1.0,
            damage_taken_multiplier: 1.0,
            healing_dealt_multiplier: 1.0,
            ranged_damage_taken_multiplier: 1.0,
            ignore_armor: false,
            armor_ignore_factor: 0.0,
            bonus_spell_crit_percent: 0.0,
        };
        table.recompute_baseline(attacker, defender);
        table
    }

    /// Rederive the level-based fields, keeping every adjustment
    pub fn recompute_baseline(&mut self, attacker: &Unit, defender: &Unit) {
        let ladders = &constants().attack_table;
        let delta = |higher: u32, lower: u32| (higher as i64 - lower as i64).clamp(0, 3) as usize;

        if defender.kind == UnitKind::Enemy {
            let i = delta(defender.level, attacker.level);
            self.base_spell_miss_chance = ladders.enemy_spell_miss[i];
            self.base_miss_chance = ladders.enemy_miss[i];
            self.base_dodge_chance = ladders.enemy_dodge[i];
            self.base_parry_chance = ladders.enemy_parry[i];
            self.base_block_chance = ladders.enemy_block[i];
            self.base_glance_chance = ladders.enemy_glance[i];
            self.glance_multiplier = ladders.enemy_glance_multiplier[i];
            self.melee_crit_suppression = ladders.enemy_melee_crit_suppression[i];
            self.spell_crit_suppression = ladders.enemy_spell_crit_suppression[i];
        } else {
            let i = delta(attacker.level, defender.level);
            self.base_spell_miss_chance = ladders.player_spell_miss[i];
            self.base_miss_chance = ladders.player_miss[i];
            self.base_dodge_chance = ladders.player_dodge[i];
            self.base_parry_chance = ladders.player_parry[i];
            self.base_block_chance = ladders.player_block[i];
            self.base_glance_chance = 0.0;
            self.glance_multiplier = 1.0;
            self.melee_crit_suppression = 0.0;
            self.spell_crit_suppression = 0.0;
        }
    }

    /// Chances for one attack of `kind`, folding in the attacker's stats
    ///
    /// `physical` selects the physical crit stat for spell-like outcomes;
    /// `bonus_crit` and `bonus_hit` are in percent.
    pub fn chances(
        &self,
        attacker: &Unit,
        kind: OutcomeKind,
        physical: bool,
        bonus_crit: f64,
        bonus_hit: f64,
    ) -> OutcomeChances {
        let stats = &attacker.stats;
        let melee_hit = (stats.melee_hit_percent + bonus_hit) / 100.0;
        let expertise = stats.expertise_percent / 100.0;
        let melee_crit = (stats.physical_crit_percent + bonus_crit) / 100.0 - self.melee_crit_suppression;
        let spell_crit = if physical {
            melee_crit
        } else {
            (stats.spell_crit_percent + bonus_crit + self.bonus_spell_crit_percent) / 100.0
                - self.spell_crit_suppression
        };

        let mut chances = OutcomeChances::default();
        match kind {
            OutcomeKind::MeleeSpecial | OutcomeKind::MeleeWhite => {
                chances.miss = self.base_miss_chance - melee_hit;
                chances.dodge = self.base_dodge_chance - expertise;
                chances.parry = self.base_parry_chance - expertise;
                chances.block = self.base_block_chance;
                if kind == OutcomeKind::MeleeWhite {
                    chances.glance = self.base_glance_chance;
                }
                chances.crit = melee_crit;
            }
            OutcomeKind::Ranged => {
                chances.miss = self.base_miss_chance - melee_hit;
                chances.crit = melee_crit;
            }
            OutcomeKind::Spell => {
                chances.miss = self.base_spell_miss_chance - (stats.spell_hit_percent + bonus_hit) / 100.0;
                chances.crit = spell_crit;
            }
            OutcomeKind::Periodic | OutcomeKind::Healing => {
                chances.crit = spell_crit;
            }
        }
        chances.clamped()
    }
}
