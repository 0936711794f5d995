//! Decision policies
//!
//! A [`Rotation`] is asked what to do whenever its unit becomes ready to act. The
//! engine only requires that a decision either casts something or schedules the
//! next decision with [`Simulation::wait_until`]; [`PriorityRotation`] covers the
//! common "first castable ability in a fixed list" policy.

use std::time::Duration;

use crate::config::constants;
use crate::sim::Simulation;
use crate::types::{DotId, SpellId, UnitId};

pub trait Rotation: Send {
    /// The unit is free to act
    fn on_ready(&mut self, sim: &mut Simulation, unit: UnitId);

    /// Asked after every tick of the unit's channel
    fn should_interrupt_channel(&self, _sim: &Simulation, _unit: UnitId, _channel: DotId) -> bool {
        false
    }

    /// What the next decision would cast; a channel followed by itself skips the clip delay
    fn peek_next_spell(&self, _sim: &Simulation, _unit: UnitId) -> Option<SpellId> {
        None
    }

    fn on_channel_end(&mut self, _sim: &Simulation, _unit: UnitId) {}

    /// Called at the start of every iteration
    fn reset(&mut self) {}
}

/// Casts the first ability in priority order that passes every gate
#[derive(Debug, Clone, Default)]
pub struct PriorityRotation {
    priorities: Vec<SpellId>,
    /// Cut channels short once a higher-priority ability is ready
    clip_channels: bool,
}

impl PriorityRotation {
    pub fn new(priorities: Vec<SpellId>) -> Self {
        PriorityRotation {
            priorities,
            clip_channels: false,
        }
    }

    pub fn clip_channels(mut self) -> Self {
        self.clip_channels = true;
        self
    }

    pub fn priorities(&self) -> &[SpellId] {
        &self.priorities
    }

    fn busy(sim: &Simulation, unit: UnitId) -> bool {
        sim.has_pending_ready(unit) || sim.unit(unit).is_channeling()
    }

    /// Earliest moment any listed ability could pass its timers
    fn next_opportunity(&self, sim: &Simulation, unit: UnitId) -> Duration {
        let now = sim.now();
        let gcd = sim.gcd_ready_at(unit);
        self.priorities
            .iter()
            .map(|&spell| {
                let uses_gcd = sim.spell(spell).cast_config().is_some_and(|c| !c.gcd.is_zero());
                let ready = sim.spell_ready_at(spell);
                if uses_gcd {
                    ready.max(gcd)
                } else {
                    ready
                }
            })
            .filter(|at| *at > now)
            .min()
            .unwrap_or(now + constants().casting.idle_poll())
    }
}

impl Rotation for PriorityRotation {
    fn on_ready(&mut self, sim: &mut Simulation, unit: UnitId) {
        let Some(target) = sim.unit(unit).current_target else {
            return;
        };
        for &spell in &self.priorities {
            if Self::busy(sim, unit) {
                return;
            }
            if sim.can_cast(spell, target) {
                sim.cast(spell, Some(target));
            }
        }
        if !Self::busy(sim, unit) {
            let at = self.next_opportunity(sim, unit);
            sim.wait_until(unit, at);
        }
    }

    fn should_interrupt_channel(&self, sim: &Simulation, unit: UnitId, channel: DotId) -> bool {
        if !self.clip_channels {
            return false;
        }
        let channel_spell = sim.dot(channel).spell();
        self.priorities
            .iter()
            .take_while(|&&spell| spell != channel_spell)
            .any(|&spell| sim.is_spell_ready(spell) && sim.unit(unit).current_target.is_some())
    }

    fn peek_next_spell(&self, sim: &Simulation, unit: UnitId) -> Option<SpellId> {
        sim.unit(unit).current_target?;
        self.priorities
            .iter()
            .copied()
            .find(|&spell| sim.is_spell_ready(spell) && sim.can_afford(spell))
    }
}
