//! Aura transitions: activate, refresh, stack changes, expiration

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use super::{Aura, AuraConfig, AuraHandler};
use crate::clock::ActionPriority;
use crate::error::SimError;
use crate::sim::{Action, Simulation};
use crate::time::{as_millis_f64, NEVER_EXPIRES};
use crate::types::{AuraId, SpellId, UnitId};

/// Snapshot of an aura's observable state, for save/restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuraState {
    pub active: bool,
    pub stacks: u32,
    pub remaining: Duration,
}

impl Simulation {
    /// Register a new aura on `unit`; labels are unique per unit
    pub fn register_aura(&mut self, unit: UnitId, config: AuraConfig) -> Result<AuraId, SimError> {
        if self.units[unit.0].auras.get(&config.label).is_some() {
            return Err(SimError::unit(
                self.units[unit.0].label.clone(),
                format!("aura '{}' registered twice", config.label),
            ));
        }
        let id = AuraId(self.auras.len());
        self.units[unit.0].auras.insert(config.label.clone(), id);
        self.auras.push(Aura::new(id, unit, config));
        Ok(id)
    }

    /// Look up an aura by label, registering it from `config` if absent
    pub fn get_or_register_aura(&mut self, unit: UnitId, config: AuraConfig) -> AuraId {
        match self.units[unit.0].auras.get(&config.label) {
            Some(id) => id,
            None => {
                let id = AuraId(self.auras.len());
                self.units[unit.0].auras.insert(config.label.clone(), id);
                self.auras.push(Aura::new(id, unit, config));
                id
            }
        }
    }

    pub fn get_aura(&self, unit: UnitId, label: &str) -> Option<AuraId> {
        self.units[unit.0].auras.get(label)
    }

    pub fn aura(&self, id: AuraId) -> &Aura {
        &self.auras[id.0]
    }

    pub fn aura_mut(&mut self, id: AuraId) -> &mut Aura {
        &mut self.auras[id.0]
    }

    pub fn is_aura_active(&self, id: AuraId) -> bool {
        self.auras[id.0].active
    }

    /// Activate an aura, or refresh it if it is already active
    ///
    /// Activating a suppressed aura does nothing.
    pub fn activate_aura(&mut self, id: AuraId) {
        let now = self.now();
        let aura = &mut self.auras[id.0];
        if aura.suppressed {
            return;
        }
        if aura.active {
            let refire = aura.refire_gain_on_refresh;
            self.refresh_aura(id);
            if refire {
                self.fire_aura_hooks(id, |h, sim| h.on_gain(sim, id));
            }
            return;
        }

        aura.active = true;
        aura.started_at = now;
        aura.expires = now.saturating_add(aura.duration);
        aura.activations += 1;
        trace!(
            at_ms = as_millis_f64(now),
            aura = %aura.label,
            unit = %aura.unit,
            expires_ms = as_millis_f64(aura.expires),
            "aura gained"
        );
        self.schedule_aura_expiration(id);
        self.fire_aura_hooks(id, |h, sim| h.on_gain(sim, id));
        if let Some(dot) = self.auras[id.0].periodic {
            if self.auras[id.0].active {
                self.dot_on_gain(dot);
            }
        }
    }

    /// Re-arm an active aura's expiration with its current duration
    pub fn refresh_aura(&mut self, id: AuraId) {
        let now = self.now();
        let aura = &mut self.auras[id.0];
        if !aura.active {
            return;
        }
        aura.expires = now.saturating_add(aura.duration);
        aura.refreshes += 1;
        trace!(
            at_ms = as_millis_f64(now),
            aura = %aura.label,
            unit = %aura.unit,
            expires_ms = as_millis_f64(aura.expires),
            "aura refreshed"
        );
        self.schedule_aura_expiration(id);
        self.fire_aura_hooks(id, |h, sim| h.on_refresh(sim, id));
    }

    /// Move the expiration of an aura; on an inactive aura only the field changes
    pub fn update_aura_expires(&mut self, id: AuraId, expires: Duration) {
        self.auras[id.0].expires = expires;
        if self.auras[id.0].active {
            self.schedule_aura_expiration(id);
        }
    }

    /// Deactivate an aura, firing its expire hooks
    pub fn deactivate_aura(&mut self, id: AuraId) {
        let now = self.now();
        let aura = &mut self.auras[id.0];
        if !aura.active {
            return;
        }
        aura.active = false;
        aura.fade_time = now;
        aura.uptime += now.saturating_sub(aura.started_at);
        if let Some(action) = aura.expire_action.take() {
            self.clock.cancel(action);
        }
        trace!(at_ms = as_millis_f64(now), aura = %self.auras[id.0].label, "aura faded");

        let old = self.auras[id.0].stacks;
        if old > 0 {
            self.auras[id.0].stacks = 0;
            self.fire_aura_hooks(id, |h, sim| h.on_stacks_change(sim, id, old, 0));
        }
        self.fire_aura_hooks(id, |h, sim| h.on_expire(sim, id));
        if let Some(dot) = self.auras[id.0].periodic {
            self.dot_on_expire(dot);
        }
    }

    /// Set the stack count, clamped to the aura's maximum
    ///
    /// Raising stacks on an inactive aura activates it; dropping to zero deactivates it.
    ///
    /// # Panics
    ///
    /// If the aura was registered without stacks.
    pub fn set_aura_stacks(&mut self, id: AuraId, stacks: u32) {
        let aura = &self.auras[id.0];
        assert!(
            aura.max_stacks > 0,
            "aura '{}' on {} has no stacks",
            aura.label,
            aura.unit
        );
        let stacks = stacks.min(aura.max_stacks);
        if !aura.active {
            if stacks == 0 {
                return;
            }
            self.activate_aura(id);
            if !self.auras[id.0].active {
                return;
            }
        }

        let old = self.auras[id.0].stacks;
        if old == stacks {
            return;
        }
        self.auras[id.0].stacks = stacks;
        trace!(at_ms = as_millis_f64(self.now()), aura = %self.auras[id.0].label, old, new = stacks, "aura stacks");
        self.fire_aura_hooks(id, |h, sim| h.on_stacks_change(sim, id, old, stacks));
        if stacks == 0 {
            self.deactivate_aura(id);
        }
    }

    pub fn add_aura_stack(&mut self, id: AuraId) {
        let stacks = if self.auras[id.0].active { self.auras[id.0].stacks } else { 0 };
        self.set_aura_stacks(id, stacks.saturating_add(1));
    }

    pub fn remove_aura_stack(&mut self, id: AuraId) {
        let (active, stacks) = (self.auras[id.0].active, self.auras[id.0].stacks);
        if active && stacks > 0 {
            self.set_aura_stacks(id, stacks - 1);
        }
    }

    /// Deactivate every active aura on `unit`, in registration order
    pub fn expire_all_auras(&mut self, unit: UnitId) {
        let ids: Vec<AuraId> = self.units[unit.0].auras.iter().collect();
        for id in ids {
            self.deactivate_aura(id);
        }
    }

    pub fn save_aura_state(&self, id: AuraId) -> AuraState {
        let aura = &self.auras[id.0];
        AuraState {
            active: aura.active,
            stacks: aura.stacks,
            remaining: aura.remaining_duration(self.now()),
        }
    }

    /// Put an aura back into a saved state; hooks fire as for ordinary transitions
    pub fn restore_aura_state(&mut self, id: AuraId, state: AuraState) {
        self.deactivate_aura(id);
        if !state.active {
            return;
        }
        let duration = self.auras[id.0].duration;
        self.auras[id.0].duration = state.remaining;
        self.activate_aura(id);
        self.auras[id.0].duration = duration;
        if self.auras[id.0].max_stacks > 0 && state.stacks > 0 {
            self.set_aura_stacks(id, state.stacks);
        }
    }

    pub(crate) fn expire_aura_action(&mut self, id: AuraId) {
        self.auras[id.0].expire_action = None;
        self.deactivate_aura(id);
    }

    pub(crate) fn fire_cast_complete_hooks(&mut self, caster: UnitId, spell: SpellId, target: UnitId) {
        let ids: Vec<AuraId> = self.units[caster.0]
            .auras
            .iter()
            .filter(|id| {
                let aura = &self.auras[id.0];
                aura.active && !aura.handlers.is_empty()
            })
            .collect();
        for id in ids {
            if self.auras[id.0].active {
                self.fire_aura_hooks(id, |h, sim| h.on_cast_complete(sim, id, spell, target));
            }
        }
    }

    fn schedule_aura_expiration(&mut self, id: AuraId) {
        if let Some(action) = self.auras[id.0].expire_action.take() {
            self.clock.cancel(action);
        }
        let expires = self.auras[id.0].expires;
        if expires != NEVER_EXPIRES {
            let action = self
                .clock
                .schedule(expires, ActionPriority::Expire, Action::ExpireAura(id));
            self.auras[id.0].expire_action = Some(action);
        }
    }

    fn fire_aura_hooks(&mut self, id: AuraId, mut hook: impl FnMut(&dyn AuraHandler, &mut Simulation)) {
        if self.auras[id.0].handlers.is_empty() {
            return;
        }
        let handlers: Vec<Arc<dyn AuraHandler>> = self.auras[id.0].handlers.clone();
        for handler in &handlers {
            hook(handler.as_ref(), self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::testing::sim_with_target;
    use std::sync::Mutex;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    struct RecordingHandler(Arc<Recorder>);

    impl AuraHandler for RecordingHandler {
        fn on_gain(&self, sim: &mut Simulation, _aura: AuraId) {
            self.0.events.lock().unwrap().push(format!("gain@{}", sim.now().as_millis()));
        }
        fn on_expire(&self, sim: &mut Simulation, _aura: AuraId) {
            self.0.events.lock().unwrap().push(format!("expire@{}", sim.now().as_millis()));
        }
        fn on_refresh(&self, sim: &mut Simulation, _aura: AuraId) {
            self.0.events.lock().unwrap().push(format!("refresh@{}", sim.now().as_millis()));
        }
        fn on_stacks_change(&self, _sim: &mut Simulation, _aura: AuraId, old: u32, new: u32) {
            self.0.events.lock().unwrap().push(format!("stacks {}->{}", old, new));
        }
    }

    fn recorded(recorder: &Recorder) -> Vec<String> {
        recorder.events.lock().unwrap().clone()
    }

    #[test]
    fn test_activate_and_expire() {
        let (mut sim, player, _) = sim_with_target();
        let rec = Arc::new(Recorder::default());
        let id = sim
            .register_aura(player, AuraConfig::new("buff", ms(10_000)).with_handler(RecordingHandler(rec.clone())))
            .unwrap();

        sim.activate_aura(id);
        assert!(sim.is_aura_active(id));
        assert_eq!(sim.aura(id).expires_at(), ms(10_000));

        sim.run_until(ms(9_999));
        assert!(sim.is_aura_active(id));
        sim.run_until(ms(10_000));
        assert!(!sim.is_aura_active(id));
        assert_eq!(recorded(&rec), vec!["gain@0", "expire@10000"]);
        assert_eq!(sim.aura(id).uptime(sim.now()), ms(10_000));
    }

    #[test]
    fn test_reactivate_refreshes_without_gain() {
        let (mut sim, player, _) = sim_with_target();
        let rec = Arc::new(Recorder::default());
        let id = sim
            .register_aura(player, AuraConfig::new("buff", ms(10_000)).with_handler(RecordingHandler(rec.clone())))
            .unwrap();

        sim.activate_aura(id);
        sim.run_until(ms(4_000));
        sim.activate_aura(id);
        assert_eq!(sim.aura(id).expires_at(), ms(14_000));

        sim.run_until(ms(10_000));
        assert!(sim.is_aura_active(id), "stale expiration must not fire");
        sim.run_until(ms(14_000));
        assert!(!sim.is_aura_active(id));
        assert_eq!(recorded(&rec), vec!["gain@0", "refresh@4000", "expire@14000"]);
    }

    #[test]
    fn test_refire_gain_on_refresh() {
        let (mut sim, player, _) = sim_with_target();
        let rec = Arc::new(Recorder::default());
        let id = sim
            .register_aura(
                player,
                AuraConfig::new("buff", ms(5_000))
                    .refire_gain_on_refresh()
                    .with_handler(RecordingHandler(rec.clone())),
            )
            .unwrap();
        sim.activate_aura(id);
        sim.activate_aura(id);
        assert_eq!(recorded(&rec), vec!["gain@0", "refresh@0", "gain@0"]);
    }

    #[test]
    fn test_suppressed_aura_is_noop() {
        let (mut sim, player, _) = sim_with_target();
        let id = sim
            .register_aura(player, AuraConfig::new("muted", ms(5_000)).suppressed(true))
            .unwrap();
        sim.activate_aura(id);
        assert!(!sim.is_aura_active(id));
        assert_eq!(sim.clock.pending_len(), 0);
    }

    #[test]
    fn test_stacks_clamp_and_zero_deactivates() {
        let (mut sim, player, _) = sim_with_target();
        let rec = Arc::new(Recorder::default());
        let id = sim
            .register_aura(
                player,
                AuraConfig::new("stacking", ms(20_000))
                    .with_max_stacks(3)
                    .with_handler(RecordingHandler(rec.clone())),
            )
            .unwrap();

        sim.add_aura_stack(id);
        sim.add_aura_stack(id);
        sim.set_aura_stacks(id, 10);
        assert_eq!(sim.aura(id).stacks(), 3);

        sim.remove_aura_stack(id);
        sim.set_aura_stacks(id, 0);
        assert!(!sim.is_aura_active(id));
        assert_eq!(
            recorded(&rec),
            vec!["gain@0", "stacks 0->1", "stacks 1->2", "stacks 2->3", "stacks 3->2", "stacks 2->0", "expire@0"]
        );
    }

    #[test]
    fn test_expire_clears_stacks() {
        let (mut sim, player, _) = sim_with_target();
        let id = sim
            .register_aura(player, AuraConfig::new("stacking", ms(1_000)).with_max_stacks(5))
            .unwrap();
        sim.set_aura_stacks(id, 4);
        sim.run_until(ms(1_000));
        assert!(!sim.is_aura_active(id));
        assert_eq!(sim.aura(id).stacks(), 0);
    }

    #[test]
    fn test_permanent_aura_schedules_nothing() {
        let (mut sim, player, _) = sim_with_target();
        let id = sim.register_aura(player, AuraConfig::permanent("stance")).unwrap();
        sim.activate_aura(id);
        assert_eq!(sim.aura(id).expires_at(), NEVER_EXPIRES);
        assert_eq!(sim.aura(id).remaining_duration(sim.now()), NEVER_EXPIRES);
        assert_eq!(sim.clock.pending_len(), 0);
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let (mut sim, player, _) = sim_with_target();
        sim.register_aura(player, AuraConfig::new("a", ms(1))).unwrap();
        assert!(sim.register_aura(player, AuraConfig::new("a", ms(1))).is_err());
        let again = sim.get_or_register_aura(player, AuraConfig::new("a", ms(1)));
        assert_eq!(Some(again), sim.get_aura(player, "a"));
    }

    #[test]
    fn test_update_expires() {
        let (mut sim, player, _) = sim_with_target();
        let id = sim.register_aura(player, AuraConfig::new("buff", ms(10_000))).unwrap();
        sim.activate_aura(id);
        sim.update_aura_expires(id, ms(3_000));
        sim.run_until(ms(3_000));
        assert!(!sim.is_aura_active(id));
    }

    #[test]
    fn test_save_and_restore_state() {
        let (mut sim, player, _) = sim_with_target();
        let id = sim
            .register_aura(player, AuraConfig::new("buff", ms(10_000)).with_max_stacks(5))
            .unwrap();
        sim.set_aura_stacks(id, 3);
        sim.run_until(ms(2_000));
        let saved = sim.save_aura_state(id);
        assert_eq!(saved, AuraState { active: true, stacks: 3, remaining: ms(8_000) });

        sim.deactivate_aura(id);
        sim.restore_aura_state(id, saved);
        assert_eq!(sim.aura(id).stacks(), 3);
        assert_eq!(sim.aura(id).expires_at(), ms(10_000));
        assert_eq!(sim.aura(id).duration, ms(10_000));
    }

    #[test]
    fn test_expire_all() {
        let (mut sim, player, _) = sim_with_target();
        let a = sim.register_aura(player, AuraConfig::new("a", ms(10_000))).unwrap();
        let b = sim.register_aura(player, AuraConfig::permanent("b")).unwrap();
        sim.activate_aura(a);
        sim.activate_aura(b);
        sim.expire_all_auras(player);
        assert!(!sim.is_aura_active(a));
        assert!(!sim.is_aura_active(b));
        assert_eq!(sim.clock.pending_len(), 0);
    }
}
