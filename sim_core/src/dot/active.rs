//! Per-target periodic effect state

use std::time::Duration;

use serde::Serialize;
use spell_data::TickHaste;

use super::types::DotConfig;
use crate::aura::AuraState;
use crate::clock::ActionId;
use crate::time::{round_half_even, scale, NEVER_EXPIRES};
use crate::types::{AuraId, DotId, SpellId, UnitId};

/// Values captured when the effect is applied and reused by every tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DotSnapshot {
    pub base_damage: f64,
    /// Probability in [0, 1]
    pub crit_chance: f64,
    pub attacker_multiplier: f64,
}

impl Default for DotSnapshot {
    fn default() -> Self {
        DotSnapshot {
            base_damage: 0.0,
            crit_chance: 0.0,
            attacker_multiplier: 1.0,
        }
    }
}

/// Saved state of one periodic effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotState {
    pub aura: AuraState,
    pub snapshot: DotSnapshot,
    pub tick_period: Duration,
    pub remaining_ticks: i32,
    pub extra_ticks: i32,
    pub next_tick_in: Duration,
}

/// Number of ticks that fit in `duration`, ties to even
pub fn calculate_tick_count(duration: Duration, tick_period: Duration) -> i32 {
    if tick_period.is_zero() {
        return 0;
    }
    round_half_even(duration.as_nanos() as f64 / tick_period.as_nanos() as f64) as i32
}

pub struct Dot {
    pub(crate) id: DotId,
    pub(crate) spell: SpellId,
    pub(crate) aura: AuraId,
    pub(crate) target: UnitId,
    pub(crate) is_hot: bool,
    pub(crate) channeled: bool,
    pub(crate) aoe: bool,
    pub(crate) base_tick_length: Duration,
    pub(crate) base_tick_count: u32,
    pub(crate) haste: TickHaste,
    pub(crate) haste_reduces_duration: bool,
    pub base_duration_multiplier: f64,
    pub bonus_coefficient: f64,
    pub periodic_damage_multiplier: f64,
    pub base_tick_damage: f64,

    /// Written by snapshot callbacks, read by tick callbacks
    pub snapshot: DotSnapshot,
    pub(crate) tick_period: Duration,
    pub(crate) remaining_ticks: i32,
    pub(crate) extra_ticks: i32,
    pub(crate) next_tick_at: Duration,
    pub(crate) tick_action: Option<ActionId>,
}

impl Dot {
    pub(crate) fn new(
        id: DotId,
        spell: SpellId,
        aura: AuraId,
        target: UnitId,
        config: &DotConfig,
        is_hot: bool,
        channeled: bool,
    ) -> Self {
        Dot {
            id,
            spell,
            aura,
            target,
            is_hot,
            channeled,
            aoe: config.aoe,
            base_tick_length: config.tick_length,
            base_tick_count: config.ticks,
            haste: config.haste,
            haste_reduces_duration: config.haste_reduces_duration,
            base_duration_multiplier: config.base_duration_multiplier,
            bonus_coefficient: config.bonus_coefficient,
            periodic_damage_multiplier: config.periodic_damage_multiplier,
            base_tick_damage: config.base_tick_damage,
            snapshot: DotSnapshot::default(),
            tick_period: config.tick_length,
            remaining_ticks: 0,
            extra_ticks: 0,
            next_tick_at: NEVER_EXPIRES,
            tick_action: None,
        }
    }

    pub fn id(&self) -> DotId {
        self.id
    }

    pub fn spell(&self) -> SpellId {
        self.spell
    }

    pub fn aura(&self) -> AuraId {
        self.aura
    }

    /// Unit the effect sits on
    pub fn target(&self) -> UnitId {
        self.target
    }

    pub fn is_hot(&self) -> bool {
        self.is_hot
    }

    pub fn is_channeled(&self) -> bool {
        self.channeled
    }

    /// Sits on the caster and hits every active target
    pub fn is_aoe(&self) -> bool {
        self.aoe
    }

    pub fn base_tick_length(&self) -> Duration {
        self.base_tick_length
    }

    pub fn base_tick_count(&self) -> u32 {
        self.base_tick_count
    }

    /// Unhasted total duration
    pub fn base_duration(&self) -> Duration {
        scale(
            self.base_tick_length * self.base_tick_count,
            self.base_duration_multiplier,
        )
    }

    /// Period of the current application
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn remaining_ticks(&self) -> i32 {
        self.remaining_ticks
    }

    pub fn extra_ticks(&self) -> i32 {
        self.extra_ticks
    }

    /// Due time of the pending tick, or [`NEVER_EXPIRES`]
    pub fn next_tick_at(&self) -> Duration {
        self.next_tick_at
    }

    /// Ticks the base duration yields at the current tick period
    pub fn hasted_tick_count(&self) -> i32 {
        calculate_tick_count(self.base_duration(), self.tick_period)
    }

    /// Ticks a full application is expected to deliver, including added ticks
    pub fn expected_tick_count(&self) -> i32 {
        let ticks = if self.haste.is_hasted() && !self.haste_reduces_duration {
            self.hasted_tick_count()
        } else {
            self.base_tick_count as i32
        };
        ticks + self.extra_ticks
    }

    /// Ticks already delivered by the current application
    pub fn tick_count(&self) -> i32 {
        self.expected_tick_count() - self.remaining_ticks
    }

    pub(crate) fn reset(&mut self) {
        self.snapshot = DotSnapshot::default();
        self.tick_period = self.base_tick_length;
        self.remaining_ticks = 0;
        self.extra_ticks = 0;
        self.next_tick_at = NEVER_EXPIRES;
        self.tick_action = None;
    }
}

impl std::fmt::Debug for Dot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dot")
            .field("id", &self.id)
            .field("spell", &self.spell)
            .field("target", &self.target)
            .field("tick_period", &self.tick_period)
            .field("remaining_ticks", &self.remaining_ticks)
            .field("next_tick_at", &self.next_tick_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_tick_count_banker_rounding() {
        assert_eq!(calculate_tick_count(ms(15_000), ms(3_000)), 5);
        // 2.5 ticks rounds down, 3.5 rounds up
        assert_eq!(calculate_tick_count(ms(5_000), ms(2_000)), 2);
        assert_eq!(calculate_tick_count(ms(7_000), ms(2_000)), 4);
        assert_eq!(calculate_tick_count(ms(15_000), Duration::ZERO), 0);
    }

    #[test]
    fn test_haste_breakpoint() {
        // 15s / 2.308s = 6.499 -> 6 ticks, 15s / 2.307s = 6.502 -> 7 ticks
        assert_eq!(calculate_tick_count(ms(15_000), ms(2_308)), 6);
        assert_eq!(calculate_tick_count(ms(15_000), ms(2_307)), 7);
    }

    proptest! {
        #[test]
        fn tick_count_matches_half_even(duration in 1u64..120_000, period in 1u64..10_000) {
            let count = calculate_tick_count(ms(duration), ms(period));
            let exact = duration as f64 / period as f64;
            prop_assert!((count as f64 - exact).abs() <= 0.5);
            if (exact.fract() - 0.5).abs() < f64::EPSILON {
                prop_assert_eq!(count % 2, 0);
            }
        }
    }
}
