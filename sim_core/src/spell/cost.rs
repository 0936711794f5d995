//! Resource costs
//!
//! Each cost model answers three questions: can the caster afford it, what does
//! spending it do, and how much comes back on a refund.

use std::fmt;
use std::time::Duration;

use spell_data::{CostDef, ResourceKind};

use crate::unit::Unit;

pub trait ResourceCost: fmt::Debug + Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Cost before modifiers
    fn base_cost(&self, caster: &Unit) -> f64;

    fn can_afford(&self, caster: &Unit, cost: f64, now: Duration) -> bool {
        cost <= 0.0 || caster.resources().current(self.kind(), now) >= cost
    }

    /// Remove the cost from the caster; returns what was actually spent
    fn spend(&self, caster: &mut Unit, cost: f64, now: Duration) -> f64 {
        caster.resources_mut().spend(self.kind(), cost, now)
    }

    /// Portion of a spent amount given back by a refund
    fn refund_amount(&self, _spent: f64) -> f64 {
        0.0
    }
}

/// Mana cost as a percentage of base mana plus a flat part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManaCost {
    pub base_cost_percent: f64,
    pub flat: f64,
}

impl ManaCost {
    pub fn percent_of_base(percent: f64) -> Self {
        ManaCost {
            base_cost_percent: percent,
            flat: 0.0,
        }
    }

    pub fn flat(amount: f64) -> Self {
        ManaCost {
            base_cost_percent: 0.0,
            flat: amount,
        }
    }
}

impl ResourceCost for ManaCost {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Mana
    }

    fn base_cost(&self, caster: &Unit) -> f64 {
        caster.stats.base_mana * self.base_cost_percent / 100.0 + self.flat
    }
}

/// Flat cost of energy, rage, focus or holy power, partly refundable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerCost {
    pub kind: ResourceKind,
    pub amount: f64,
    pub refund_fraction: f64,
}

impl PowerCost {
    pub fn new(kind: ResourceKind, amount: f64) -> Self {
        PowerCost {
            kind,
            amount,
            refund_fraction: 0.0,
        }
    }

    pub fn with_refund(mut self, fraction: f64) -> Self {
        self.refund_fraction = fraction;
        self
    }
}

impl ResourceCost for PowerCost {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn base_cost(&self, _caster: &Unit) -> f64 {
        self.amount
    }

    fn refund_amount(&self, spent: f64) -> f64 {
        spent * self.refund_fraction
    }
}

/// A cost model plus the modifiers other effects layer on it
#[derive(Debug)]
pub struct SpellCost {
    model: Box<dyn ResourceCost>,
    /// Added to the base cost
    pub flat_modifier: f64,
    /// Applied after the flat modifier
    pub percent_modifier: f64,
    last_spent: f64,
}

impl SpellCost {
    pub fn new(model: impl ResourceCost + 'static) -> Self {
        SpellCost {
            model: Box::new(model),
            flat_modifier: 0.0,
            percent_modifier: 1.0,
            last_spent: 0.0,
        }
    }

    pub fn from_def(def: &CostDef) -> Self {
        match *def {
            CostDef::Mana { base_cost_percent, flat } => SpellCost::new(ManaCost {
                base_cost_percent,
                flat,
            }),
            CostDef::Power {
                kind,
                amount,
                refund_fraction,
            } => SpellCost::new(PowerCost {
                kind,
                amount,
                refund_fraction,
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.model.kind()
    }

    /// Cost after modifiers, never negative
    pub fn current_cost(&self, caster: &Unit) -> f64 {
        ((self.model.base_cost(caster) + self.flat_modifier).max(0.0) * self.percent_modifier).max(0.0)
    }

    pub fn can_afford(&self, caster: &Unit, now: Duration) -> bool {
        self.model.can_afford(caster, self.current_cost(caster), now)
    }

    pub(crate) fn spend(&mut self, caster: &mut Unit, now: Duration) -> f64 {
        let cost = self.current_cost(caster);
        self.last_spent = self.model.spend(caster, cost, now);
        self.last_spent
    }

    /// Amount spent by the most recent cast
    pub fn last_spent(&self) -> f64 {
        self.last_spent
    }

    pub(crate) fn refund_amount(&self) -> f64 {
        self.model.refund_amount(self.last_spent)
    }

    pub(crate) fn reset(&mut self) {
        self.last_spent = 0.0;
    }
}
