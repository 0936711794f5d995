//! The simulation: arenas, the event loop and per-iteration reset

use std::fmt;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::aura::Aura;
use crate::clock::{ActionId, ActionPriority, Clock};
use crate::combat::AttackTable;
use crate::config::constants;
use crate::dot::Dot;
use crate::encounter::{Encounter, EncounterConfig};
use crate::error::SimError;
use crate::metrics::{IterationReport, MetricsSink};
use crate::resource::{ResourceBarConfig, ResourcePool};
use crate::rotation::Rotation;
use crate::runner::iteration_seed;
use crate::spell::Spell;
use crate::time::as_millis_f64;
use crate::types::{UnitId, UnitKind};
use crate::unit::{Hardcast, Unit, UnitConfig, UnitStats};

/// Deferred work owned by the clock
pub enum Action {
    ExpireAura(crate::types::AuraId),
    DotTick(crate::types::DotId),
    Recharge(crate::types::SpellId),
    CastComplete {
        spell: crate::types::SpellId,
        target: UnitId,
    },
    /// The unit may make its next decision
    UnitReady(UnitId),
    Callback(Box<dyn FnOnce(&mut Simulation) + Send>),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ExpireAura(id) => write!(f, "ExpireAura({})", id),
            Action::DotTick(id) => write!(f, "DotTick({})", id),
            Action::Recharge(id) => write!(f, "Recharge({})", id),
            Action::CastComplete { spell, target } => write!(f, "CastComplete({} -> {})", spell, target),
            Action::UnitReady(id) => write!(f, "UnitReady({})", id),
            Action::Callback(_) => write!(f, "Callback"),
        }
    }
}

/// One encounter with every unit, aura, periodic effect and ability in it
///
/// Build it once (targets from the encounter, then players, then abilities and
/// auras), then [`reset`](Simulation::reset) and run it once per iteration.
pub struct Simulation {
    pub(crate) clock: Clock<Action>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) units: Vec<Unit>,
    pub(crate) auras: Vec<Aura>,
    pub(crate) dots: Vec<Dot>,
    pub(crate) spells: Vec<Spell>,
    /// Ready-at time of every cooldown timer
    pub(crate) timers: Vec<Duration>,
    /// Indexed `[attacker][defender]`
    pub(crate) attack_tables: Vec<Vec<AttackTable>>,
    pub(crate) encounter: Encounter,
    pub(crate) spells_registered: bool,
}

impl Simulation {
    pub fn new(encounter: EncounterConfig) -> Result<Self, SimError> {
        let mut sim = Simulation {
            clock: Clock::new(),
            rng: ChaCha8Rng::seed_from_u64(0),
            units: Vec::new(),
            auras: Vec::new(),
            dots: Vec::new(),
            spells: Vec::new(),
            timers: Vec::new(),
            attack_tables: Vec::new(),
            encounter: Encounter::default(),
            spells_registered: false,
        };
        sim.build_encounter(encounter)?;
        sim.rebuild_attack_tables();
        Ok(sim)
    }

    /// Add a player-side unit; all units must be added before any ability is registered
    pub fn add_player(&mut self, config: UnitConfig) -> Result<UnitId, SimError> {
        if self.spells_registered {
            return Err(SimError::unit(
                config.label,
                "units must be added before abilities are registered",
            ));
        }
        config
            .stats
            .validate()
            .map_err(|message| SimError::unit(config.label.clone(), message))?;
        let level = config.level.unwrap_or(constants().levels.player_level);
        let id = self.push_unit(
            config.label,
            UnitKind::Player,
            level,
            config.stats,
            config.resources,
            config.rotation,
        );
        if let Some(delay) = config.channel_clip_delay {
            self.units[id.0].channel_clip_delay = delay;
        }
        self.units[id.0].distance_from_target = config.distance_from_target;
        self.rebuild_attack_tables();
        debug!(unit = %self.units[id.0].label, %id, level, "added player");
        Ok(id)
    }

    pub(crate) fn push_unit(
        &mut self,
        label: String,
        kind: UnitKind,
        level: u32,
        stats: UnitStats,
        resources: Vec<ResourceBarConfig>,
        rotation: Option<Box<dyn Rotation>>,
    ) -> UnitId {
        let id = UnitId(self.units.len());
        let gcd = self.new_timer();
        self.units.push(Unit {
            id,
            label,
            kind,
            level,
            stats,
            moving: false,
            distance_from_target: 0.0,
            channel_clip_delay: constants().casting.channel_clip_delay(),
            current_target: None,
            enabled: true,
            enabled_at_start: true,
            gcd,
            named_timers: Default::default(),
            hardcast: Hardcast::default(),
            channeled_dot: None,
            ready_action: None,
            rotation,
            auras: Default::default(),
            spellbook: Vec::new(),
            resources: ResourcePool::new(&resources),
            damage_taken: 0.0,
            healing_taken: 0.0,
        });
        id
    }

    /// Current simulated time
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// The iteration's random stream
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.0]
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut Unit {
        &mut self.units[id.0]
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    /// Player-side units in creation order
    pub fn players(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().filter(|u| u.kind == UnitKind::Player).map(|u| u.id)
    }

    /// Replace a unit's stats and rebuild its attack tables
    pub fn update_unit_stats(&mut self, unit: UnitId, stats: UnitStats) {
        self.units[unit.0].stats = stats;
        self.recompute_attack_tables(unit);
    }

    pub fn set_rotation(&mut self, unit: UnitId, rotation: impl Rotation + 'static) {
        self.units[unit.0].rotation = Some(Box::new(rotation));
    }

    pub fn rotation(&self, unit: UnitId) -> Option<&dyn Rotation> {
        self.units[unit.0].rotation.as_deref()
    }

    /// Run `f` with the unit's rotation taken out of the unit for the duration of the call
    pub fn with_rotation<R>(
        &mut self,
        unit: UnitId,
        f: impl FnOnce(&mut dyn Rotation, &mut Simulation) -> R,
    ) -> Option<R> {
        let mut rotation = self.units[unit.0].rotation.take()?;
        let result = f(rotation.as_mut(), self);
        self.units[unit.0].rotation = Some(rotation);
        Some(result)
    }

    /// Schedule the unit's next decision, replacing any pending one
    pub fn wait_until(&mut self, unit: UnitId, at: Duration) {
        let at = at.max(self.now());
        if let Some(action) = self.units[unit.0].ready_action.take() {
            self.clock.cancel(action);
        }
        let action = self.clock.schedule(at, ActionPriority::Gcd, Action::UnitReady(unit));
        self.units[unit.0].ready_action = Some(action);
    }

    pub fn has_pending_ready(&self, unit: UnitId) -> bool {
        self.units[unit.0]
            .ready_action
            .is_some_and(|action| self.clock.is_pending(action))
    }

    /// Run `f` at `at`
    pub fn schedule_callback(
        &mut self,
        at: Duration,
        priority: ActionPriority,
        f: impl FnOnce(&mut Simulation) + Send + 'static,
    ) -> ActionId {
        self.clock.schedule(at, priority, Action::Callback(Box::new(f)))
    }

    pub fn cancel_action(&mut self, id: ActionId) -> bool {
        self.clock.cancel(id)
    }

    /// Restore every piece of state to the start of an iteration
    pub fn reset(&mut self, seed: u64) {
        self.clock.reset();
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.timers.iter_mut().for_each(|t| *t = Duration::ZERO);
        for unit in &mut self.units {
            unit.reset();
        }
        for aura in &mut self.auras {
            aura.reset();
        }
        for dot in &mut self.dots {
            dot.reset();
        }
        for spell in &mut self.spells {
            spell.reset();
        }

        let active: Vec<UnitId> = self
            .encounter
            .all_targets()
            .iter()
            .copied()
            .filter(|t| self.units[t.0].enabled)
            .collect();
        let first_target = active.first().copied();
        let first_player = self.players().next();
        self.encounter.reset(active, &mut self.rng);
        for unit in &mut self.units {
            unit.current_target = match unit.kind {
                UnitKind::Player => first_target,
                UnitKind::Enemy if unit.enabled => first_player,
                UnitKind::Enemy => None,
            };
        }

        for index in 0..self.units.len() {
            if self.units[index].enabled && self.units[index].rotation.is_some() {
                self.wait_until(UnitId(index), Duration::ZERO);
            }
        }
        trace!(seed, duration_ms = as_millis_f64(self.encounter.duration()), "simulation reset");
    }

    /// Fire the next pending action; returns false when nothing is pending
    pub fn advance(&mut self) -> bool {
        let Some(fired) = self.clock.pop() else {
            return false;
        };
        trace!(at_ms = as_millis_f64(fired.at), action = ?fired.payload, priority = ?fired.priority, "fire");
        match fired.payload {
            Action::ExpireAura(id) => self.expire_aura_action(id),
            Action::DotTick(id) => self.dot_tick_action(id),
            Action::Recharge(id) => self.recharge_action(id),
            Action::CastComplete { spell, target } => self.cast_complete_action(spell, target),
            Action::UnitReady(id) => self.unit_ready_action(id),
            Action::Callback(f) => f(self),
        }
        true
    }

    /// Fire everything due at or before `time`, then move the clock to `time`
    pub fn run_until(&mut self, time: Duration) {
        while self.clock.next_due().is_some_and(|due| due <= time) {
            self.advance();
        }
        self.clock.advance_to(time);
    }

    /// Run until the encounter ends or nothing is left to do
    ///
    /// The end condition is checked once per fired action; everything due at
    /// exactly the end time still fires. Auras still active at the end are
    /// expired so their uptime is complete.
    pub fn run_to_end(&mut self) {
        let end = self.encounter.duration();
        loop {
            if self.is_encounter_over() {
                break;
            }
            match self.clock.next_due() {
                Some(due) if due <= end => {
                    self.advance();
                }
                _ => {
                    self.clock.advance_to(end);
                    break;
                }
            }
        }
        for index in 0..self.units.len() {
            self.expire_all_auras(UnitId(index));
        }
        let now = self.now();
        for unit in &mut self.units {
            unit.resources.settle(now);
        }
    }

    /// Reset with the seed for iteration `index` of a run, run it, and report
    pub fn run_iteration(&mut self, run_seed: u64, index: u32) -> IterationReport {
        self.reset(iteration_seed(run_seed, index));
        self.run_to_end();
        let mut report = IterationReport::new(index);
        self.report_metrics(&mut report);
        report
    }

    /// Write the iteration's numbers into `sink`
    pub fn report_metrics(&self, sink: &mut dyn MetricsSink) {
        for spell in &self.spells {
            let caster = &self.units[spell.unit.0].label;
            for (index, metrics) in spell.metrics.iter().enumerate() {
                if !metrics.is_empty() {
                    sink.record_spell(caster, &spell.label, &self.units[index].label, metrics);
                }
            }
        }
        for unit in &self.units {
            for (kind, bar) in unit.resources.iter() {
                sink.record_resource(&unit.label, kind, bar.totals());
            }
            for id in unit.auras.iter() {
                let aura = &self.auras[id.0];
                if aura.activations() > 0 {
                    sink.record_aura(&unit.label, &aura.label, aura.uptime(self.now()), aura.activations());
                }
            }
        }
        sink.finish(self.now());
    }

    fn unit_ready_action(&mut self, unit: UnitId) {
        let now = self.now();
        let u = &mut self.units[unit.0];
        u.ready_action = None;
        if !u.enabled || u.is_hardcasting(now) || u.is_channeling() {
            return;
        }
        self.with_rotation(unit, |rotation, sim| rotation.on_ready(sim, unit));
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now())
            .field("units", &self.units.len())
            .field("auras", &self.auras.len())
            .field("dots", &self.dots.len())
            .field("spells", &self.spells.len())
            .field("pending", &self.clock.pending_len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A reset simulation with the given player against one default boss
    pub fn sim_with_unit(config: UnitConfig) -> (Simulation, UnitId, UnitId) {
        let mut sim = Simulation::new(EncounterConfig::single_target(Duration::from_secs(300))).unwrap();
        let player = sim.add_player(config).unwrap();
        let target = sim.encounter().all_targets()[0];
        sim.reset(0);
        (sim, player, target)
    }

    pub fn sim_with_target() -> (Simulation, UnitId, UnitId) {
        sim_with_unit(UnitConfig::new("player"))
    }

    pub fn sim_with_encounter(config: EncounterConfig) -> (Simulation, UnitId) {
        let mut sim = Simulation::new(config).unwrap();
        let player = sim.add_player(UnitConfig::new("player")).unwrap();
        sim.reset(0);
        (sim, player)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::aura::AuraConfig;
    use crate::combat::{HitOutcome, SpellResult};
    use crate::dot::DotConfig;
    use crate::encounter::TargetConfig;
    use crate::rotation::PriorityRotation;
    use crate::spell::{CastConfig, DirectDamage, SpellConfig};
    use spell_data::{OptionValue, SpellSchool};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_callbacks_fire_in_order() {
        let (mut sim, _, _) = sim_with_target();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for (at, priority, tag) in [
            (5, ActionPriority::Low, "b"),
            (5, ActionPriority::Default, "a"),
            (3, ActionPriority::Default, "c"),
            (7, ActionPriority::Default, "d"),
        ] {
            let log = Arc::clone(&log);
            sim.schedule_callback(ms(at), priority, move |_| log.lock().unwrap().push(tag));
        }
        let cancelled = {
            let log = Arc::clone(&log);
            sim.schedule_callback(ms(4), ActionPriority::Default, move |_| log.lock().unwrap().push("x"))
        };
        assert!(sim.cancel_action(cancelled));
        sim.run_until(ms(10));
        assert_eq!(*log.lock().unwrap(), vec!["c", "a", "b", "d"]);
        assert_eq!(sim.now(), ms(10));
    }

    #[test]
    fn test_callback_scheduled_during_callback_fires_later() {
        let (mut sim, _, _) = sim_with_target();
        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        sim.schedule_callback(ms(1), ActionPriority::Default, move |sim| {
            let now = sim.now();
            sim.schedule_callback(now, ActionPriority::Default, move |_| {
                inner.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert!(sim.advance());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(sim.advance());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!sim.advance());
    }

    #[test]
    fn test_reset_restores_state() {
        let (mut sim, player, target) = sim_with_target();
        let spell = sim
            .register_spell(
                player,
                SpellConfig::new("nuke")
                    .with_cast(CastConfig::instant(ms(1500)))
                    .with_cooldown(ms(30_000))
                    .with_charges(1, ms(20_000)),
            )
            .unwrap();
        let aura = sim.register_aura(player, AuraConfig::new("buff", ms(10_000))).unwrap();
        sim.activate_aura(aura);
        assert!(sim.cast(spell, Some(target)));

        sim.reset(1);
        assert_eq!(sim.now(), Duration::ZERO);
        assert!(!sim.is_aura_active(aura));
        assert!(sim.can_cast(spell, target));
        assert_eq!(sim.charges(spell), 1);
        assert_eq!(sim.spell(spell).casts(), 0);
        assert_eq!(sim.clock.pending_len(), 0);
    }

    #[test]
    fn test_invalid_stats_rejected() {
        let mut sim = Simulation::new(EncounterConfig::single_target(ms(60_000))).unwrap();
        let mut stats = UnitStats::default();
        stats.cast_speed = 0.0;
        assert!(sim.add_player(UnitConfig::new("p").with_stats(stats)).is_err());
    }

    fn dps_sim() -> Simulation {
        let mut sim = Simulation::new(EncounterConfig::single_target(ms(60_000))).unwrap();
        let player = sim.add_player(UnitConfig::new("mage")).unwrap();
        let bolt = sim
            .register_spell(
                player,
                SpellConfig::new("bolt")
                    .with_school(SpellSchool::Fire)
                    .with_cast(CastConfig::hardcast(ms(2000), ms(1500)))
                    .with_behavior(DirectDamage)
                    .with_option("base_damage", OptionValue::Number(1000.0)),
            )
            .unwrap();
        let burn = sim
            .register_spell(
                player,
                SpellConfig::new("burn")
                    .with_school(SpellSchool::Fire)
                    .with_cast(CastConfig::instant(ms(1500)))
                    .with_cooldown(ms(18_000))
                    .with_dot(DotConfig::new(ms(3000), 6).with_tick_damage(200.0)),
            )
            .unwrap();
        sim.set_rotation(player, PriorityRotation::new(vec![burn, bolt]));
        sim
    }

    #[test]
    fn test_run_iteration_is_deterministic() {
        let mut a = dps_sim();
        let mut b = dps_sim();
        let first = a.run_iteration(42, 3);
        let second = b.run_iteration(42, 3);
        assert_eq!(first, second);
        assert!(first.total_damage() > 0.0);
        assert_eq!(first.duration_secs, 60.0);

        let again = a.run_iteration(42, 3);
        assert_eq!(first, again, "reset must fully restore state");
    }

    #[test]
    fn test_run_to_end_expires_auras() {
        let mut sim = dps_sim();
        let report = sim.run_iteration(7, 0);
        let target = sim.encounter().all_targets()[0];
        let burn = sim.find_spell(UnitId(1), "burn").unwrap();
        let dot = sim.spell(burn).dot_on(target).unwrap();
        assert!(!sim.is_dot_active(dot));
        assert!(report.auras.iter().any(|a| a.aura.starts_with("burn")));
    }

    #[test]
    fn test_actions_due_at_end_all_fire() {
        let mut sim = Simulation::new(EncounterConfig::single_target(ms(1000))).unwrap();
        sim.add_player(UnitConfig::new("player")).unwrap();
        sim.reset(0);
        let fired = Arc::new(AtomicU32::new(0));
        for priority in [ActionPriority::Expire, ActionPriority::Dot, ActionPriority::Low] {
            let fired = Arc::clone(&fired);
            sim.schedule_callback(ms(1000), priority, move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        let late = Arc::clone(&fired);
        sim.schedule_callback(ms(1001), ActionPriority::PrePull, move |_| {
            late.fetch_add(100, Ordering::SeqCst);
        });

        sim.run_to_end();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(sim.now(), ms(1000));
    }

    #[test]
    fn test_health_threshold_ends_run() {
        let (mut sim, player) = sim_with_encounter(EncounterConfig {
            duration: ms(60_000),
            duration_variation: Duration::ZERO,
            use_health: true,
            targets: vec![TargetConfig::new("boss").with_health(1000.0)],
        });
        let target = sim.encounter().all_targets()[0];
        let nuke = sim
            .register_spell(player, SpellConfig::new("nuke").with_school(SpellSchool::Arcane))
            .unwrap();
        sim.reset(0);

        let hit = move |amount: f64| SpellResult {
            spell: nuke,
            target,
            outcome: HitOutcome::Hit,
            amount,
            is_healing: false,
            is_periodic: false,
        };
        // reaching the threshold exactly is not enough
        sim.schedule_callback(ms(1000), ActionPriority::Default, move |sim| sim.deal_damage(&hit(1000.0)));
        sim.schedule_callback(ms(2000), ActionPriority::Default, move |sim| sim.deal_damage(&hit(1.0)));
        let after = Arc::new(AtomicU32::new(0));
        for at in [2000, 3000] {
            let after = Arc::clone(&after);
            sim.schedule_callback(ms(at), ActionPriority::Low, move |_| {
                after.fetch_add(1, Ordering::SeqCst);
            });
        }

        sim.run_to_end();
        assert_eq!(sim.now(), ms(2000));
        assert_eq!(sim.encounter().damage_dealt(), 1001.0);
        assert_eq!(after.load(Ordering::SeqCst), 0);
        assert!(sim.is_encounter_over());
    }

    #[test]
    fn test_hardcast_blocks_rotation() {
        let mut sim = dps_sim();
        sim.reset(5);
        let player = UnitId(1);
        // burn at 0, bolt starts at 1500 and lands at 3500
        sim.run_until(ms(1500));
        assert!(sim.unit(player).is_hardcasting(sim.now()));
        sim.run_until(ms(3499));
        let bolt = sim.find_spell(player, "bolt").unwrap();
        assert_eq!(sim.spell(bolt).casts(), 0);
        sim.run_until(ms(3500));
        assert_eq!(sim.spell(bolt).casts(), 1);
    }
}
