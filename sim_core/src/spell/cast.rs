//! Cast gating, cooldowns and charges

use std::time::Duration;

use tracing::{debug, trace};

use super::SpellFlags;
use crate::clock::ActionPriority;
use crate::config::constants;
use crate::sim::{Action, Simulation};
use crate::time::{apply_speed, as_millis_f64, scale};
use crate::types::{SpellId, TimerId, UnitId};
use crate::unit::Hardcast;

impl Simulation {
    pub fn timer_ready_at(&self, timer: TimerId) -> Duration {
        self.timers[timer.0]
    }

    pub fn is_timer_ready(&self, timer: TimerId) -> bool {
        self.timers[timer.0] <= self.now()
    }

    /// Put a timer on cooldown until `ready_at`
    pub fn set_timer(&mut self, timer: TimerId, ready_at: Duration) {
        self.timers[timer.0] = ready_at;
    }

    pub fn gcd_ready(&self, unit: UnitId) -> bool {
        self.is_timer_ready(self.units[unit.0].gcd)
    }

    pub fn gcd_ready_at(&self, unit: UnitId) -> Duration {
        self.timer_ready_at(self.units[unit.0].gcd)
    }

    /// Global cooldown triggered by `spell`, hasted unless the spell ignores haste
    pub fn spell_gcd(&self, spell: SpellId) -> Duration {
        let s = &self.spells[spell.0];
        let Some(cast) = s.cast else {
            return Duration::ZERO;
        };
        if cast.gcd.is_zero() || s.flags.contains(SpellFlags::IGNORE_HASTE) {
            return cast.gcd;
        }
        let hasted = apply_speed(cast.gcd, self.units[s.unit.0].stats.cast_speed);
        hasted.max(constants().casting.min_gcd())
    }

    /// Cast time after the spell multiplier and the caster's cast speed
    pub fn cast_time(&self, spell: SpellId) -> Duration {
        let s = &self.spells[spell.0];
        let Some(cast) = s.cast else {
            return Duration::ZERO;
        };
        let base = scale(cast.cast_time, s.cast_time_multiplier);
        if s.flags.contains(SpellFlags::IGNORE_HASTE) {
            base
        } else {
            apply_speed(base, self.units[s.unit.0].stats.cast_speed)
        }
    }

    /// How long the cast keeps the caster busy
    pub fn effective_cast_time(&self, spell: SpellId) -> Duration {
        self.spell_gcd(spell).max(self.cast_time(spell))
    }

    /// When both cooldown timers, and a charge if the spell uses them, are available
    pub fn spell_ready_at(&self, spell: SpellId) -> Duration {
        let s = &self.spells[spell.0];
        let mut ready = Duration::ZERO;
        for cd in s.cooldown.iter().chain(s.shared_cooldown.iter()) {
            ready = ready.max(self.timers[cd.timer.0]);
        }
        if s.max_charges > 0 && s.charges == 0 {
            ready = ready.max(s.recharge_due);
        }
        ready
    }

    pub fn is_spell_ready(&self, spell: SpellId) -> bool {
        self.spell_ready_at(spell) <= self.now()
    }

    pub fn time_to_ready(&self, spell: SpellId) -> Duration {
        self.spell_ready_at(spell).saturating_sub(self.now())
    }

    /// Whether the caster can pay the spell's current cost
    pub fn can_afford(&self, spell: SpellId) -> bool {
        let s = &self.spells[spell.0];
        s.cost
            .as_ref()
            .map_or(true, |cost| cost.can_afford(&self.units[s.unit.0], self.now()))
    }

    pub fn charges(&self, spell: SpellId) -> u32 {
        self.spells[spell.0].charges
    }

    /// Time until the running recharge completes; zero when charges are full
    pub fn next_charge_in(&self, spell: SpellId) -> Duration {
        let s = &self.spells[spell.0];
        if s.recharge_action.is_none() {
            return Duration::ZERO;
        }
        s.recharge_due.saturating_sub(self.now())
    }

    /// Grant one charge immediately, stopping the recharge if that fills the spell up
    pub fn refresh_charge(&mut self, spell: SpellId) {
        let s = &mut self.spells[spell.0];
        if s.charges >= s.max_charges {
            return;
        }
        s.charges += 1;
        if s.charges == s.max_charges {
            if let Some(action) = s.recharge_action.take() {
                self.clock.cancel(action);
            }
        }
    }

    /// Take one charge, starting a recharge if none is running
    ///
    /// # Panics
    ///
    /// If the spell has charges and none are left.
    pub fn consume_charge(&mut self, spell: SpellId) {
        let now = self.now();
        let s = &mut self.spells[spell.0];
        if s.max_charges == 0 {
            return;
        }
        assert!(
            s.charges > 0,
            "ability '{}' consumed a charge with none available at {:?}",
            s.label,
            now
        );
        s.charges -= 1;
        if s.recharge_action.is_none() {
            self.schedule_recharge(spell);
        }
    }

    fn schedule_recharge(&mut self, spell: SpellId) {
        let due = self.now() + self.spells[spell.0].recharge_time;
        let action = self.clock.schedule(due, ActionPriority::Auto, Action::Recharge(spell));
        let s = &mut self.spells[spell.0];
        s.recharge_action = Some(action);
        s.recharge_due = due;
    }

    pub(crate) fn recharge_action(&mut self, spell: SpellId) {
        let now = self.now();
        let s = &mut self.spells[spell.0];
        s.recharge_action = None;
        s.charges = (s.charges + 1).min(s.max_charges);
        trace!(at_ms = as_millis_f64(now), spell = %s.label, charges = s.charges, "charge recharged");
        if s.charges < s.max_charges {
            self.schedule_recharge(spell);
        }
    }

    fn in_range(&self, spell: SpellId) -> bool {
        let s = &self.spells[spell.0];
        if s.min_range == 0.0 && s.max_range == 0.0 {
            return true;
        }
        let distance = self.units[s.unit.0].distance_from_target;
        distance >= s.min_range && (s.max_range == 0.0 || distance <= s.max_range)
    }

    /// Whether `spell` may be used while its caster channels something
    pub fn can_cast_during_channel(&self, spell: SpellId) -> bool {
        let s = &self.spells[spell.0];
        let Some(channel) = self.units[s.unit.0].channeled_dot else {
            return true;
        };
        if self.dots[channel.0].spell == spell {
            return false;
        }
        if s.flags.contains(SpellFlags::CAST_WHILE_CHANNELING) {
            return true;
        }
        self.channel_can_be_interrupted(channel)
    }

    /// Every gate a cast must pass, in order; a rejection is silent
    pub fn can_cast(&self, spell: SpellId, target: UnitId) -> bool {
        let now = self.now();
        let s = &self.spells[spell.0];
        let caster = &self.units[s.unit.0];

        if !self.units[target.0].enabled {
            return false;
        }
        if s.flags.contains(SpellFlags::SWAPPED) {
            return false;
        }
        if !self.in_range(spell) || !s.behavior.extra_cast_condition(self, target, spell) {
            return false;
        }
        let cast = s.cast.unwrap_or_default();
        if caster.moving && !cast.cast_time.is_zero() && !s.flags.contains(SpellFlags::CAN_CAST_WHILE_MOVING) {
            return false;
        }
        if caster.is_hardcasting(now) {
            return false;
        }
        if caster.channeled_dot.is_some() && !self.can_cast_during_channel(spell) {
            return false;
        }
        if !cast.gcd.is_zero() && !self.is_timer_ready(caster.gcd) {
            return false;
        }
        if s
            .cooldown
            .iter()
            .chain(s.shared_cooldown.iter())
            .any(|cd| !self.is_timer_ready(cd.timer))
        {
            return false;
        }
        if !self.can_afford(spell) {
            return false;
        }
        if s.max_charges > 0 && s.charges == 0 {
            return false;
        }
        true
    }

    /// Cast `spell` at `target` (or the caster's current target)
    ///
    /// Returns false without any state change when a gate rejects the cast.
    pub fn cast(&mut self, spell: SpellId, target: Option<UnitId>) -> bool {
        let now = self.now();
        let caster = self.spells[spell.0].unit;
        let Some(target) = target.or(self.units[caster.0].current_target) else {
            return false;
        };
        if !self.can_cast(spell, target) {
            return false;
        }

        let flags = self.spells[spell.0].flags;
        if self.units[caster.0].channeled_dot.is_some() && !flags.contains(SpellFlags::CAST_WHILE_CHANNELING) {
            self.interrupt_channel(caster);
        }

        if let Some(cost) = self.spells[spell.0].cost.as_mut() {
            cost.spend(&mut self.units[caster.0], now);
        }
        let s = &self.spells[spell.0];
        let cd_multiplier = s.cd_multiplier;
        if let Some(cd) = s.cooldown {
            self.timers[cd.timer.0] = now + scale(cd.duration, cd_multiplier);
        }
        if let Some(cd) = s.shared_cooldown {
            self.timers[cd.timer.0] = now + cd.duration;
        }
        self.consume_charge(spell);

        let Some(cast) = self.spells[spell.0].cast else {
            self.apply_spell_effects(spell, target);
            return true;
        };
        if !cast.gcd.is_zero() {
            let gcd = self.units[caster.0].gcd;
            self.timers[gcd.0] = now + self.spell_gcd(spell);
        }
        let cast_time = self.cast_time(spell);
        debug!(
            at_ms = as_millis_f64(now),
            unit = %self.units[caster.0].label,
            spell = %self.spells[spell.0].label,
            %target,
            cast_ms = as_millis_f64(cast_time),
            "cast"
        );
        if cast_time.is_zero() {
            self.apply_spell_effects(spell, target);
        } else {
            let expires = now + cast_time;
            let action = self
                .clock
                .schedule(expires, ActionPriority::Default, Action::CastComplete { spell, target });
            self.units[caster.0].hardcast = Hardcast {
                expires,
                spell: Some(spell),
                action: Some(action),
            };
        }

        if (!cast.gcd.is_zero() || !cast_time.is_zero()) && !self.units[caster.0].is_channeling() {
            let at = self
                .gcd_ready_at(caster)
                .max(self.units[caster.0].hardcast.expires)
                .max(now);
            self.wait_until(caster, at);
        }
        true
    }

    /// Land the spell's effects without any gating, cost or cooldown
    pub fn skip_cast_and_apply_effects(&mut self, spell: SpellId, target: UnitId) {
        self.apply_spell_effects(spell, target);
    }

    /// Cast the spell on every active target except `main_target`
    ///
    /// Each cast goes through the full gate; the first rejection stops the sweep.
    pub fn cast_on_all_other_targets(&mut self, spell: SpellId, main_target: UnitId) {
        let targets: Vec<UnitId> = self
            .encounter
            .active_targets()
            .iter()
            .copied()
            .filter(|t| *t != main_target)
            .collect();
        for target in targets {
            if !self.cast(spell, Some(target)) {
                break;
            }
        }
    }

    /// Give back the refundable part of the last cost paid
    pub fn issue_refund(&mut self, spell: SpellId) -> f64 {
        let now = self.now();
        let caster = self.spells[spell.0].unit;
        let Some(cost) = self.spells[spell.0].cost.as_ref() else {
            return 0.0;
        };
        let (kind, amount) = (cost.kind(), cost.refund_amount());
        self.units[caster.0].resources.refund(kind, amount, now)
    }

    /// Cancel the caster's hardcast, if any
    pub fn cancel_hardcast(&mut self, unit: UnitId) {
        let hardcast = std::mem::take(&mut self.units[unit.0].hardcast);
        if let Some(action) = hardcast.action {
            self.clock.cancel(action);
        }
    }

    /// Average damage per landed cast this iteration
    pub fn cur_damage_per_cast(&self, spell: SpellId) -> f64 {
        let s = &self.spells[spell.0];
        if s.casts == 0 {
            return 0.0;
        }
        s.metrics.iter().map(|m| m.damage).sum::<f64>() / s.casts as f64
    }

    /// Casts per minute so far this iteration
    pub fn cur_cpm(&self, spell: SpellId) -> f64 {
        let minutes = self.now().as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.spells[spell.0].casts as f64 / minutes
    }

    pub(crate) fn cast_complete_action(&mut self, spell: SpellId, target: UnitId) {
        let caster = self.spells[spell.0].unit;
        self.units[caster.0].hardcast.action = None;
        self.units[caster.0].hardcast.spell = None;
        self.apply_spell_effects(spell, target);
    }

    pub(crate) fn apply_spell_effects(&mut self, spell: SpellId, target: UnitId) {
        let s = &mut self.spells[spell.0];
        s.metrics[target.0].casts += 1;
        s.casts += 1;
        let (caster, flags) = (s.unit, s.flags);
        if !flags.contains(SpellFlags::NO_ON_CAST_COMPLETE) {
            self.fire_cast_complete_hooks(caster, spell, target);
        }
        let behavior = self.spells[spell.0].behavior.clone();
        behavior.apply_effects(self, target, spell);
    }
}
