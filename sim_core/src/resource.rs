//! Resource bars (mana, energy, rage, ...)
//!
//! Regeneration is applied lazily: a bar remembers when it was last settled and
//! reports the regenerated amount on read.

use serde::Serialize;
use spell_data::ResourceKind;
use std::collections::BTreeMap;
use std::time::Duration;

/// Starting shape of one resource bar
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBarConfig {
    pub kind: ResourceKind,
    pub max: f64,
    /// Amount at the start of each iteration; `None` starts full
    pub initial: Option<f64>,
    pub regen_per_second: f64,
}

impl ResourceBarConfig {
    pub fn new(kind: ResourceKind, max: f64) -> Self {
        ResourceBarConfig {
            kind,
            max,
            initial: None,
            regen_per_second: 0.0,
        }
    }

    pub fn with_regen(mut self, per_second: f64) -> Self {
        self.regen_per_second = per_second;
        self
    }

    pub fn starting_at(mut self, amount: f64) -> Self {
        self.initial = Some(amount);
        self
    }
}

/// Totals reported per iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceTotals {
    pub gained: f64,
    pub spent: f64,
    pub refunded: f64,
}

#[derive(Debug, Clone)]
pub struct ResourceBar {
    config: ResourceBarConfig,
    current: f64,
    settled_at: Duration,
    totals: ResourceTotals,
}

impl ResourceBar {
    fn new(config: ResourceBarConfig) -> Self {
        let mut bar = ResourceBar {
            current: 0.0,
            settled_at: Duration::ZERO,
            totals: ResourceTotals::default(),
            config,
        };
        bar.reset();
        bar
    }

    fn reset(&mut self) {
        self.current = self.config.initial.unwrap_or(self.config.max).clamp(0.0, self.config.max);
        self.settled_at = Duration::ZERO;
        self.totals = ResourceTotals::default();
    }

    fn regenerated(&self, now: Duration) -> f64 {
        let elapsed = now.saturating_sub(self.settled_at).as_secs_f64();
        (self.config.regen_per_second * elapsed).min(self.config.max - self.current).max(0.0)
    }

    /// Amount available at `now`, including pending regeneration
    pub fn current(&self, now: Duration) -> f64 {
        self.current + self.regenerated(now)
    }

    pub fn max(&self) -> f64 {
        self.config.max
    }

    pub fn totals(&self) -> ResourceTotals {
        self.totals
    }

    fn settle(&mut self, now: Duration) {
        let regen = self.regenerated(now);
        self.current += regen;
        self.totals.gained += regen;
        if now > self.settled_at {
            self.settled_at = now;
        }
    }
}

/// All resource bars of one unit
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    bars: BTreeMap<ResourceKind, ResourceBar>,
}

impl ResourcePool {
    pub fn new(configs: &[ResourceBarConfig]) -> Self {
        ResourcePool {
            bars: configs
                .iter()
                .map(|c| (c.kind, ResourceBar::new(c.clone())))
                .collect(),
        }
    }

    pub fn has(&self, kind: ResourceKind) -> bool {
        self.bars.contains_key(&kind)
    }

    pub fn bar(&self, kind: ResourceKind) -> Option<&ResourceBar> {
        self.bars.get(&kind)
    }

    /// Available amount; zero for a resource the unit does not have
    pub fn current(&self, kind: ResourceKind, now: Duration) -> f64 {
        self.bars.get(&kind).map_or(0.0, |bar| bar.current(now))
    }

    /// Remove `amount`, clamping at zero; returns what was actually removed
    pub fn spend(&mut self, kind: ResourceKind, amount: f64, now: Duration) -> f64 {
        let Some(bar) = self.bars.get_mut(&kind) else {
            return 0.0;
        };
        bar.settle(now);
        let spent = amount.max(0.0).min(bar.current);
        if spent < amount {
            tracing::debug!(resource = %kind, requested = amount, available = bar.current, "overspent resource");
        }
        bar.current -= spent;
        bar.totals.spent += spent;
        spent
    }

    /// Add `amount`, capped at the bar's maximum; returns what was actually added
    pub fn gain(&mut self, kind: ResourceKind, amount: f64, now: Duration) -> f64 {
        let Some(bar) = self.bars.get_mut(&kind) else {
            return 0.0;
        };
        bar.settle(now);
        let gained = amount.max(0.0).min(bar.config.max - bar.current);
        bar.current += gained;
        bar.totals.gained += gained;
        gained
    }

    /// Give back part of a spent cost; counted separately from ordinary gains
    pub fn refund(&mut self, kind: ResourceKind, amount: f64, now: Duration) -> f64 {
        let Some(bar) = self.bars.get_mut(&kind) else {
            return 0.0;
        };
        bar.settle(now);
        let refunded = amount.max(0.0).min(bar.config.max - bar.current);
        bar.current += refunded;
        bar.totals.refunded += refunded;
        refunded
    }

    /// Fold pending regeneration into the totals
    pub fn settle(&mut self, now: Duration) {
        for bar in self.bars.values_mut() {
            bar.settle(now);
        }
    }

    pub fn reset(&mut self) {
        for bar in self.bars.values_mut() {
            bar.reset();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &ResourceBar)> {
        self.bars.iter().map(|(k, v)| (*k, v))
    }
}
