//! Tick scheduling, snapshots and the channel hand-off

use std::time::Duration;

use spell_data::TickHaste;
use tracing::{debug, trace};

use super::active::{calculate_tick_count, Dot, DotSnapshot, DotState};
use crate::clock::ActionPriority;
use crate::sim::{Action, Simulation};
use crate::spell::SpellFlags;
use crate::time::{apply_speed, as_millis_f64, round_to_millis, scale, NEVER_EXPIRES, TICK_GRANULARITY};
use crate::types::{DotId, SpellId, UnitId};

impl Simulation {
    pub fn dot(&self, id: DotId) -> &Dot {
        &self.dots[id.0]
    }

    pub fn dot_mut(&mut self, id: DotId) -> &mut Dot {
        &mut self.dots[id.0]
    }

    pub fn is_dot_active(&self, id: DotId) -> bool {
        self.auras[self.dots[id.0].aura.0].active
    }

    /// Apply with a fresh snapshot; reapplying keeps the in-flight tick
    pub fn apply_dot(&mut self, id: DotId) {
        self.apply_dot_with(id, false);
    }

    /// Apply while keeping the previous application's snapshot
    pub fn apply_dot_rollover(&mut self, id: DotId) {
        self.apply_dot_with(id, true);
    }

    fn apply_dot_with(&mut self, id: DotId, is_rollover: bool) {
        let spell = self.dots[id.0].spell;
        if self.spells[spell.0].flags.contains(SpellFlags::SUPPRESS_DOT_APPLY) {
            return;
        }
        self.take_dot_snapshot(id, is_rollover);
        self.recompute_dot_duration(id);
        let aura = self.dots[id.0].aura;
        debug!(
            at_ms = as_millis_f64(self.now()),
            spell = %self.spells[spell.0].label,
            target = %self.dots[id.0].target,
            rollover = is_rollover,
            remaining_ticks = self.dots[id.0].remaining_ticks,
            "periodic applied"
        );
        self.activate_aura(aura);
    }

    /// Run the owning ability's snapshot callback
    pub fn take_dot_snapshot(&mut self, id: DotId, is_rollover: bool) {
        let dot = &self.dots[id.0];
        let (spell, target) = (dot.spell, dot.target);
        let behavior = self.spells[spell.0].behavior.clone();
        behavior.on_snapshot(self, target, id, is_rollover);
    }

    /// Run the owning ability's tick callback once, without touching tick counters
    pub fn tick_dot_once(&mut self, id: DotId) {
        let dot = &self.dots[id.0];
        let (spell, target) = (dot.spell, dot.target);
        trace!(at_ms = as_millis_f64(self.now()), spell = %self.spells[spell.0].label, %target, "periodic tick");
        let behavior = self.spells[spell.0].behavior.clone();
        behavior.on_tick(self, target, id);
    }

    /// Tick period the effect would get if applied now
    pub fn calc_tick_period(&self, id: DotId) -> Duration {
        let dot = &self.dots[id.0];
        let spell = &self.spells[dot.spell.0];
        let caster = &self.units[spell.unit.0];
        let period = match dot.haste {
            TickHaste::None => return dot.base_tick_length,
            TickHaste::CastSpeed if dot.channeled => scale(
                apply_speed(dot.base_tick_length, caster.stats.cast_speed),
                spell.cast_time_multiplier,
            ),
            TickHaste::CastSpeed => apply_speed(dot.base_tick_length, caster.stats.cast_speed),
            TickHaste::RealHaste => apply_speed(dot.base_tick_length, caster.stats.real_haste),
        };
        round_to_millis(period).max(TICK_GRANULARITY)
    }

    fn recompute_dot_duration(&mut self, id: DotId) {
        let next_tick_in = self.time_until_next_tick(id);
        let period = self.calc_tick_period(id);
        let active = self.is_dot_active(id);
        let dot = &mut self.dots[id.0];

        dot.tick_period = period;
        dot.remaining_ticks = calculate_tick_count(dot.base_duration(), dot.base_tick_length);
        if dot.haste.is_hasted() && !dot.haste_reduces_duration {
            dot.remaining_ticks = calculate_tick_count(dot.base_duration(), period);
        }
        dot.extra_ticks = 0;

        let mut duration = period * dot.remaining_ticks.max(0) as u32;
        if active {
            duration += next_tick_in;
            dot.remaining_ticks += 1;
        }
        self.auras[dot.aura.0].duration = duration;
    }

    /// Time until the pending tick; zero when nothing is pending
    pub fn time_until_next_tick(&self, id: DotId) -> Duration {
        let dot = &self.dots[id.0];
        if !self.is_dot_active(id) || dot.next_tick_at == NEVER_EXPIRES {
            return Duration::ZERO;
        }
        dot.next_tick_at.saturating_sub(self.now())
    }

    /// Damage still to be dealt by the running application
    pub fn dot_outstanding_damage(&self, id: DotId) -> f64 {
        if !self.is_dot_active(id) {
            return 0.0;
        }
        let dot = &self.dots[id.0];
        dot.snapshot.base_damage * dot.remaining_ticks as f64
    }

    /// Add one tick without resetting the timer; pushes the expiration out by one period
    pub fn add_dot_tick(&mut self, id: DotId) {
        if !self.is_dot_active(id) {
            return;
        }
        let dot = &mut self.dots[id.0];
        dot.extra_ticks += 1;
        dot.remaining_ticks += 1;
        let (aura, period) = (dot.aura, dot.tick_period);
        let expires = self.auras[aura.0].expires.saturating_add(period);
        self.update_aura_expires(aura, expires);
    }

    /// Copy a running effect's period, remaining ticks and tick phase onto `id`
    pub fn copy_dot_and_apply(&mut self, id: DotId, from: DotId) {
        let now = self.now();
        self.take_dot_snapshot(id, false);
        let source = &self.dots[from.0];
        let (base_damage, period, remaining, next_tick_at) = (
            source.snapshot.base_damage,
            source.tick_period,
            source.remaining_ticks,
            source.next_tick_at,
        );
        let source_expires = self.auras[source.aura.0].expires;

        let dot = &mut self.dots[id.0];
        dot.snapshot.base_damage = base_damage;
        dot.tick_period = period;
        dot.remaining_ticks = remaining;
        dot.extra_ticks = 0;
        let aura = dot.aura;
        self.auras[aura.0].duration = source_expires.saturating_sub(now);
        self.update_aura_expires(aura, source_expires);
        self.activate_aura(aura);

        if let Some(action) = self.dots[id.0].tick_action.take() {
            self.clock.cancel(action);
        }
        if next_tick_at != NEVER_EXPIRES && self.is_dot_active(id) {
            let due = next_tick_at.max(now);
            self.schedule_dot_tick(id, due);
        }
    }

    /// Extend a running effect while re-snapshotting and recomputing its period
    ///
    /// The next tick is re-derived from the previous tick plus the new period and
    /// the total is capped at what a fresh application would be entitled to.
    ///
    /// # Panics
    ///
    /// If the effect is not active.
    pub fn duration_extend_snapshot(&mut self, id: DotId, extend_by: Duration) {
        let now = self.now();
        assert!(
            self.is_dot_active(id),
            "cannot extend inactive periodic effect of '{}' at {:?}",
            self.spells[self.dots[id.0].spell.0].label,
            now
        );
        self.take_dot_snapshot(id, false);

        let dot = &self.dots[id.0];
        let previous_tick = dot.next_tick_at.saturating_sub(dot.tick_period);
        let period = self.calc_tick_period(id);
        self.dots[id.0].tick_period = period;

        let next_tick = (previous_tick + period).max(now + TICK_GRANULARITY);
        if let Some(action) = self.dots[id.0].tick_action.take() {
            self.clock.cancel(action);
        }
        self.schedule_dot_tick(id, next_tick);

        let aura = self.dots[id.0].aura;
        let until_next = next_tick - now;
        let entitled = self.dots[id.0].hasted_tick_count().max(1) as u32 - 1;
        let extended = (self.auras[aura.0].remaining_duration(now) + extend_by).min(period * entitled + until_next);

        let remaining = (extended.saturating_sub(until_next).as_nanos() / period.as_nanos()) as u32 + 1;
        self.dots[id.0].remaining_ticks = remaining as i32;
        self.auras[aura.0].duration = until_next + period * (remaining - 1);
        self.refresh_aura(aura);
    }

    pub fn save_dot_state(&self, id: DotId) -> DotState {
        let dot = &self.dots[id.0];
        DotState {
            aura: self.save_aura_state(dot.aura),
            snapshot: dot.snapshot,
            tick_period: dot.tick_period,
            remaining_ticks: dot.remaining_ticks,
            extra_ticks: dot.extra_ticks,
            next_tick_in: self.time_until_next_tick(id),
        }
    }

    /// Put an effect back into a saved state without delivering a pending tick
    pub fn restore_dot_state(&mut self, id: DotId, state: DotState) {
        let aura = self.dots[id.0].aura;
        if let Some(action) = self.dots[id.0].tick_action.take() {
            self.clock.cancel(action);
        }
        self.dots[id.0].next_tick_at = NEVER_EXPIRES;
        self.deactivate_aura(aura);
        self.dots[id.0].tick_period = state.tick_period;
        self.restore_aura_state(aura, state.aura);

        let dot = &mut self.dots[id.0];
        dot.snapshot = state.snapshot;
        dot.remaining_ticks = state.remaining_ticks;
        dot.extra_ticks = state.extra_ticks;
        if self.auras[aura.0].active {
            if let Some(action) = self.dots[id.0].tick_action.take() {
                self.clock.cancel(action);
            }
            let due = self.now() + state.next_tick_in;
            self.schedule_dot_tick(id, due);
        }
    }

    /// Whether a running channel may be cut short right now
    pub fn channel_can_be_interrupted(&self, id: DotId) -> bool {
        let dot = &self.dots[id.0];
        if !dot.channeled || dot.remaining_ticks == 0 {
            return false;
        }
        let caster = self.spells[dot.spell.0].unit;
        self.should_interrupt_channel(caster, id)
    }

    /// End the caster's channel immediately, without a final tick
    pub fn interrupt_channel(&mut self, unit: UnitId) {
        let Some(id) = self.units[unit.0].channeled_dot else {
            return;
        };
        debug!(at_ms = as_millis_f64(self.now()), %unit, spell = %self.spells[self.dots[id.0].spell.0].label, "channel interrupted");
        if let Some(action) = self.dots[id.0].tick_action.take() {
            self.clock.cancel(action);
        }
        self.dots[id.0].next_tick_at = NEVER_EXPIRES;
        let aura = self.dots[id.0].aura;
        self.deactivate_aura(aura);
    }

    pub(crate) fn dot_tick_action(&mut self, id: DotId) {
        let now = self.now();
        self.dots[id.0].tick_action = None;
        let dot = &mut self.dots[id.0];
        assert!(
            dot.remaining_ticks > 0,
            "periodic effect {} of spell {} ticked with {} remaining ticks at {:?}",
            id,
            dot.spell,
            dot.remaining_ticks,
            now
        );
        dot.remaining_ticks -= 1;
        self.tick_dot_once(id);

        let dot = &self.dots[id.0];
        let (spell, remaining, aura) = (dot.spell, dot.remaining_ticks, dot.aura);
        if dot.channeled {
            let caster = self.spells[spell.0].unit;
            if remaining == 0 {
                if self.gcd_ready(caster) {
                    let delay = self.channel_clip_delay(caster, spell);
                    self.wait_until(caster, now + delay);
                }
            } else if self.should_interrupt_channel(caster, id) {
                debug!(at_ms = as_millis_f64(now), unit = %caster, spell = %self.spells[spell.0].label, "channel interrupted by rotation");
                self.dots[id.0].next_tick_at = NEVER_EXPIRES;
                self.deactivate_aura(aura);
                if self.gcd_ready(caster) {
                    let delay = self.channel_clip_delay(caster, spell);
                    self.wait_until(caster, now + delay);
                }
                return;
            }
        }

        if !self.auras[aura.0].active || self.dots[id.0].tick_action.is_some() {
            return;
        }
        if remaining == 0 {
            self.deactivate_aura(aura);
        } else {
            let period = self.dots[id.0].tick_period;
            self.schedule_dot_tick(id, now + period);
        }
    }

    pub(crate) fn dot_on_gain(&mut self, id: DotId) {
        let now = self.now();
        let period = self.dots[id.0].tick_period;
        self.schedule_dot_tick(id, now + period);
        if self.dots[id.0].channeled {
            let caster = self.spells[self.dots[id.0].spell.0].unit;
            self.units[caster.0].channeled_dot = Some(id);
        }
    }

    pub(crate) fn dot_on_expire(&mut self, id: DotId) {
        let now = self.now();
        let (spell, aura) = (self.dots[id.0].spell, self.dots[id.0].aura);
        let caster = self.spells[spell.0].unit;

        if let Some(action) = self.dots[id.0].tick_action.take() {
            let due_now = self.dots[id.0].next_tick_at == now && self.clock.is_pending(action);
            self.clock.cancel(action);
            if due_now {
                // the expiration beat a same-instant tick in the queue
                let dot = &mut self.dots[id.0];
                assert!(
                    dot.remaining_ticks > 0,
                    "periodic effect {} of spell {} expired with {} remaining ticks at {:?}",
                    id,
                    dot.spell,
                    dot.remaining_ticks,
                    now
                );
                dot.remaining_ticks -= 1;
                self.tick_dot_once(id);
                if self.dots[id.0].channeled && self.gcd_ready(caster) {
                    let delay = self.channel_clip_delay(caster, spell);
                    self.wait_until(caster, now + delay);
                }
            }
        }
        self.dots[id.0].next_tick_at = NEVER_EXPIRES;

        if self.dots[id.0].channeled {
            if self.units[caster.0].channeled_dot == Some(id) {
                self.units[caster.0].channeled_dot = None;
            }
            let target = self.dots[id.0].target;
            let channel_time = self.auras[aura.0]
                .fade_time
                .saturating_sub(self.auras[aura.0].started_at);
            self.spells[spell.0].metrics[target.0].total_cast_time += channel_time;
            self.with_rotation(caster, |rotation, sim| rotation.on_channel_end(sim, caster));
            if !self.has_pending_ready(caster) {
                let at = (now + self.units[caster.0].channel_clip_delay).max(self.gcd_ready_at(caster));
                self.wait_until(caster, at);
            }
        }

        self.dots[id.0].snapshot = DotSnapshot::default();
    }

    /// Pause before the caster acts after a channel; zero when it would recast the same channel
    pub(crate) fn channel_clip_delay(&self, caster: UnitId, spell: SpellId) -> Duration {
        let next = self
            .rotation(caster)
            .and_then(|rotation| rotation.peek_next_spell(self, caster));
        if next == Some(spell) {
            Duration::ZERO
        } else {
            self.units[caster.0].channel_clip_delay
        }
    }

    fn should_interrupt_channel(&self, caster: UnitId, id: DotId) -> bool {
        self.rotation(caster)
            .is_some_and(|rotation| rotation.should_interrupt_channel(self, caster, id))
    }

    fn schedule_dot_tick(&mut self, id: DotId, due: Duration) {
        let action = self.clock.schedule(due, ActionPriority::Dot, Action::DotTick(id));
        let dot = &mut self.dots[id.0];
        dot.next_tick_at = due;
        dot.tick_action = Some(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::testing::sim_with_target;
    use crate::spell::{AbilityBehavior, SpellConfig};
    use crate::dot::DotConfig;
    use std::sync::{Arc, Mutex};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[derive(Default, Clone)]
    struct TickLog(Arc<Mutex<Vec<u64>>>);

    impl AbilityBehavior for TickLog {
        fn on_tick(&self, sim: &mut Simulation, _target: UnitId, _dot: DotId) {
            self.0.lock().unwrap().push(sim.now().as_millis() as u64);
        }
    }

    fn burn(sim: &mut Simulation, player: UnitId, target: UnitId, log: &TickLog) -> DotId {
        let spell = sim
            .register_spell(
                player,
                SpellConfig::new("burn")
                    .with_dot(DotConfig::new(ms(3000), 5))
                    .with_behavior(log.clone()),
            )
            .unwrap();
        sim.spell(spell).dot_on(target).unwrap()
    }

    #[test]
    fn test_ticks_land_on_period_and_final_tick_at_expiry() {
        let (mut sim, player, target) = sim_with_target();
        let log = TickLog::default();
        let dot = burn(&mut sim, player, target, &log);
        sim.apply_dot(dot);
        assert_eq!(sim.dot(dot).remaining_ticks(), 5);
        sim.run_until(ms(30_000));
        assert_eq!(*log.0.lock().unwrap(), vec![3000, 6000, 9000, 12000, 15000]);
        assert!(!sim.is_dot_active(dot));
        assert_eq!(sim.dot(dot).next_tick_at(), NEVER_EXPIRES);
    }

    #[test]
    fn test_reapply_keeps_in_flight_tick() {
        let (mut sim, player, target) = sim_with_target();
        let log = TickLog::default();
        let dot = burn(&mut sim, player, target, &log);
        sim.apply_dot(dot);
        sim.run_until(ms(7000));
        sim.apply_dot(dot);
        assert_eq!(sim.dot(dot).remaining_ticks(), 6);
        assert_eq!(sim.dot(dot).next_tick_at(), ms(9000));
        assert_eq!(sim.aura(sim.dot(dot).aura()).expires_at(), ms(24_000));
        sim.run_until(ms(40_000));
        assert_eq!(
            *log.0.lock().unwrap(),
            vec![3000, 6000, 9000, 12000, 15000, 18000, 21000, 24000]
        );
    }

    #[test]
    fn test_add_tick_extends_by_one_period() {
        let (mut sim, player, target) = sim_with_target();
        let log = TickLog::default();
        let dot = burn(&mut sim, player, target, &log);
        sim.apply_dot(dot);
        sim.run_until(ms(1000));
        sim.add_dot_tick(dot);
        assert_eq!(sim.dot(dot).extra_ticks(), 1);
        sim.run_until(ms(40_000));
        assert_eq!(log.0.lock().unwrap().len(), 6);
        assert_eq!(log.0.lock().unwrap().last(), Some(&18000));
    }

    #[test]
    fn test_duration_extend_is_capped() {
        let (mut sim, player, target) = sim_with_target();
        let log = TickLog::default();
        let dot = burn(&mut sim, player, target, &log);
        sim.apply_dot(dot);
        sim.run_until(ms(4000));
        sim.duration_extend_snapshot(dot, ms(30_000));
        assert_eq!(sim.dot(dot).remaining_ticks(), 5);
        assert_eq!(sim.aura(sim.dot(dot).aura()).expires_at(), ms(18_000));
        sim.run_until(ms(40_000));
        assert_eq!(*log.0.lock().unwrap(), vec![3000, 6000, 9000, 12000, 15000, 18000]);
    }

    #[test]
    #[should_panic(expected = "cannot extend inactive periodic effect")]
    fn test_extend_inactive_panics() {
        let (mut sim, player, target) = sim_with_target();
        let dot = burn(&mut sim, player, target, &TickLog::default());
        sim.duration_extend_snapshot(dot, ms(1000));
    }

    #[test]
    fn test_save_and_restore_state() {
        let (mut sim, player, target) = sim_with_target();
        let log = TickLog::default();
        let dot = burn(&mut sim, player, target, &log);
        sim.apply_dot(dot);
        sim.run_until(ms(4000));
        let state = sim.save_dot_state(dot);
        assert_eq!(state.next_tick_in, ms(2000));
        assert_eq!(state.remaining_ticks, 4);

        sim.run_until(ms(16_000));
        assert!(!sim.is_dot_active(dot));
        sim.restore_dot_state(dot, state);
        assert!(sim.is_dot_active(dot));
        assert_eq!(sim.dot(dot).next_tick_at(), ms(18_000));
        assert_eq!(sim.dot(dot).remaining_ticks(), 4);
    }

    #[test]
    fn test_restore_at_tick_instant_deals_no_tick() {
        let (mut sim, player, target) = sim_with_target();
        let log = TickLog::default();
        let dot = burn(&mut sim, player, target, &log);
        sim.apply_dot(dot);
        sim.run_until(ms(2000));
        let state = sim.save_dot_state(dot);

        sim.schedule_callback(ms(3000), ActionPriority::Expire, move |sim| {
            assert_eq!(sim.dot(dot).next_tick_at(), ms(3000));
            sim.restore_dot_state(dot, state);
        });
        sim.run_until(ms(3000));
        assert!(log.0.lock().unwrap().is_empty());
        assert_eq!(sim.dot(dot).remaining_ticks(), 5);
        assert_eq!(sim.dot(dot).next_tick_at(), ms(4000));
    }
}
