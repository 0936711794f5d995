//! Per-iteration recording and run-level aggregation
//!
//! The engine writes into a [`MetricsSink`] at the end of each iteration and never
//! reads back what it wrote. [`IterationReport`] is the sink the runner uses;
//! [`MetricsAggregator`] folds reports into [`RunMetrics`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use spell_data::ResourceKind;

use crate::combat::{HitOutcome, SpellResult};
use crate::resource::ResourceTotals;

/// Counters for one ability against one target
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpellMetrics {
    pub casts: u32,
    pub hits: u32,
    pub crits: u32,
    pub misses: u32,
    pub dodges: u32,
    pub parries: u32,
    pub blocks: u32,
    pub glances: u32,
    pub ticks: u32,
    pub crit_ticks: u32,
    pub damage: f64,
    pub healing: f64,
    /// Time spent hardcasting or channeling
    #[serde(skip)]
    pub total_cast_time: Duration,
}

impl SpellMetrics {
    pub fn record(&mut self, result: &SpellResult) {
        if result.is_periodic {
            self.ticks += 1;
            if result.is_crit() {
                self.crit_ticks += 1;
            }
        } else {
            match result.outcome {
                HitOutcome::Miss => self.misses += 1,
                HitOutcome::Dodge => self.dodges += 1,
                HitOutcome::Parry => self.parries += 1,
                HitOutcome::Block => self.blocks += 1,
                HitOutcome::Glance => self.glances += 1,
                HitOutcome::Crit => self.crits += 1,
                HitOutcome::Hit => self.hits += 1,
            }
        }
        if result.is_healing {
            self.healing += result.amount;
        } else {
            self.damage += result.amount;
        }
    }

    fn add(&mut self, other: &SpellMetrics) {
        self.casts += other.casts;
        self.hits += other.hits;
        self.crits += other.crits;
        self.misses += other.misses;
        self.dodges += other.dodges;
        self.parries += other.parries;
        self.blocks += other.blocks;
        self.glances += other.glances;
        self.ticks += other.ticks;
        self.crit_ticks += other.crit_ticks;
        self.damage += other.damage;
        self.healing += other.healing;
        self.total_cast_time += other.total_cast_time;
    }

    /// Nothing happened
    pub fn is_empty(&self) -> bool {
        self.casts == 0 && self.ticks == 0 && self.damage == 0.0 && self.healing == 0.0 && self.misses == 0
    }
}

/// Write-only destination for the numbers an iteration produced
pub trait MetricsSink {
    fn record_spell(&mut self, unit: &str, spell: &str, target: &str, metrics: &SpellMetrics);
    fn record_resource(&mut self, unit: &str, kind: ResourceKind, totals: ResourceTotals);
    fn record_aura(&mut self, unit: &str, aura: &str, uptime: Duration, activations: u32);
    fn finish(&mut self, duration: Duration);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpellRecord {
    pub unit: String,
    pub spell: String,
    pub target: String,
    pub metrics: SpellMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecord {
    pub unit: String,
    pub kind: ResourceKind,
    pub totals: ResourceTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuraRecord {
    pub unit: String,
    pub aura: String,
    pub uptime_secs: f64,
    pub activations: u32,
}

/// Everything one iteration reported
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IterationReport {
    pub index: u32,
    pub duration_secs: f64,
    pub spells: Vec<SpellRecord>,
    pub resources: Vec<ResourceRecord>,
    pub auras: Vec<AuraRecord>,
}

impl IterationReport {
    pub fn new(index: u32) -> Self {
        IterationReport {
            index,
            ..IterationReport::default()
        }
    }

    pub fn total_damage(&self) -> f64 {
        self.spells.iter().map(|s| s.metrics.damage).sum()
    }

    pub fn total_healing(&self) -> f64 {
        self.spells.iter().map(|s| s.metrics.healing).sum()
    }

    pub fn dps(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total_damage() / self.duration_secs
        } else {
            0.0
        }
    }

    pub fn hps(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total_healing() / self.duration_secs
        } else {
            0.0
        }
    }
}

impl MetricsSink for IterationReport {
    fn record_spell(&mut self, unit: &str, spell: &str, target: &str, metrics: &SpellMetrics) {
        self.spells.push(SpellRecord {
            unit: unit.to_string(),
            spell: spell.to_string(),
            target: target.to_string(),
            metrics: metrics.clone(),
        });
    }

    fn record_resource(&mut self, unit: &str, kind: ResourceKind, totals: ResourceTotals) {
        self.resources.push(ResourceRecord {
            unit: unit.to_string(),
            kind,
            totals,
        });
    }

    fn record_aura(&mut self, unit: &str, aura: &str, uptime: Duration, activations: u32) {
        self.auras.push(AuraRecord {
            unit: unit.to_string(),
            aura: aura.to_string(),
            uptime_secs: uptime.as_secs_f64(),
            activations,
        });
    }

    fn finish(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }
}

/// Mean, standard deviation and range of one per-iteration value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DistributionMetrics {
    pub mean: f64,
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
}

/// Welford's online mean and variance
#[derive(Debug, Clone, Copy, Default)]
struct Distribution {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Distribution {
    fn push(&mut self, value: f64) {
        if self.n == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn finish(&self) -> DistributionMetrics {
        let variance = if self.n > 1 { self.m2 / self.n as f64 } else { 0.0 };
        DistributionMetrics {
            mean: self.mean,
            stdev: variance.sqrt(),
            min: self.min,
            max: self.max,
        }
    }
}

/// Per-iteration averages for one ability, summed over targets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AbilityAverages {
    pub casts: f64,
    pub hits: f64,
    pub crits: f64,
    pub misses: f64,
    pub ticks: f64,
    pub damage: f64,
    pub healing: f64,
    /// Share of landed direct hits that crit
    pub crit_rate: f64,
}

/// Aggregated result of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub iterations: u32,
    pub dps: DistributionMetrics,
    pub hps: DistributionMetrics,
    pub duration_secs: DistributionMetrics,
    /// Keyed by `unit/ability`
    pub abilities: BTreeMap<String, AbilityAverages>,
    /// Keyed by `unit/resource`
    pub resources: BTreeMap<String, ResourceTotals>,
    /// Average uptime in percent of the iteration, keyed by `unit/aura`
    pub aura_uptime_percent: BTreeMap<String, f64>,
}

impl RunMetrics {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Folds iteration reports, in the order given, into [`RunMetrics`]
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    iterations: u32,
    dps: Distribution,
    hps: Distribution,
    duration: Distribution,
    abilities: BTreeMap<String, SpellMetrics>,
    resources: BTreeMap<String, ResourceTotals>,
    uptime_fraction: BTreeMap<String, f64>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: &IterationReport) {
        self.iterations += 1;
        self.dps.push(report.dps());
        self.hps.push(report.hps());
        self.duration.push(report.duration_secs);

        for record in &report.spells {
            self.abilities
                .entry(format!("{}/{}", record.unit, record.spell))
                .or_default()
                .add(&record.metrics);
        }
        for record in &report.resources {
            let totals = self
                .resources
                .entry(format!("{}/{}", record.unit, record.kind))
                .or_default();
            totals.gained += record.totals.gained;
            totals.spent += record.totals.spent;
            totals.refunded += record.totals.refunded;
        }
        if report.duration_secs > 0.0 {
            for record in &report.auras {
                *self
                    .uptime_fraction
                    .entry(format!("{}/{}", record.unit, record.aura))
                    .or_default() += record.uptime_secs / report.duration_secs;
            }
        }
    }

    pub fn finish(self) -> RunMetrics {
        let n = f64::from(self.iterations.max(1));
        let abilities = self
            .abilities
            .into_iter()
            .map(|(key, m)| {
                let landed = m.hits + m.crits + m.blocks + m.glances;
                let averages = AbilityAverages {
                    casts: f64::from(m.casts) / n,
                    hits: f64::from(m.hits) / n,
                    crits: f64::from(m.crits) / n,
                    misses: f64::from(m.misses) / n,
                    ticks: f64::from(m.ticks) / n,
                    damage: m.damage / n,
                    healing: m.healing / n,
                    crit_rate: if landed > 0 {
                        f64::from(m.crits) / f64::from(landed)
                    } else {
                        0.0
                    },
                };
                (key, averages)
            })
            .collect();
        let resources = self
            .resources
            .into_iter()
            .map(|(key, t)| {
                let averaged = ResourceTotals {
                    gained: t.gained / n,
                    spent: t.spent / n,
                    refunded: t.refunded / n,
                };
                (key, averaged)
            })
            .collect();
        let aura_uptime_percent = self
            .uptime_fraction
            .into_iter()
            .map(|(key, fraction)| (key, fraction / n * 100.0))
            .collect();

        RunMetrics {
            iterations: self.iterations,
            dps: self.dps.finish(),
            hps: self.hps.finish(),
            duration_secs: self.duration.finish(),
            abilities,
            resources,
            aura_uptime_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SpellId, UnitId};

    fn result(outcome: HitOutcome, amount: f64, is_periodic: bool) -> SpellResult {
        SpellResult {
            spell: SpellId(0),
            target: UnitId(1),
            outcome,
            amount,
            is_healing: false,
            is_periodic,
        }
    }

    fn report(index: u32, damage: f64, secs: f64) -> IterationReport {
        let mut report = IterationReport::new(index);
        let metrics = SpellMetrics {
            casts: 2,
            hits: 1,
            crits: 1,
            damage,
            ..SpellMetrics::default()
        };
        report.record_spell("mage", "bolt", "boss", &metrics);
        report.record_resource(
            "mage",
            ResourceKind::Mana,
            ResourceTotals {
                spent: 100.0,
                ..ResourceTotals::default()
            },
        );
        report.record_aura("mage", "power", Duration::from_secs_f64(secs / 2.0), 1);
        report.finish(Duration::from_secs_f64(secs));
        report
    }

    #[test]
    fn test_record_counts_outcomes() {
        let mut metrics = SpellMetrics::default();
        metrics.record(&result(HitOutcome::Hit, 100.0, false));
        metrics.record(&result(HitOutcome::Crit, 200.0, false));
        metrics.record(&result(HitOutcome::Miss, 0.0, false));
        metrics.record(&result(HitOutcome::Crit, 50.0, true));
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.crits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.ticks, 1);
        assert_eq!(metrics.crit_ticks, 1);
        assert_eq!(metrics.damage, 350.0);
    }

    #[test]
    fn test_aggregate_distribution() {
        let mut aggregator = MetricsAggregator::new();
        aggregator.add(&report(0, 1000.0, 10.0));
        aggregator.add(&report(1, 3000.0, 10.0));
        let run = aggregator.finish();

        assert_eq!(run.iterations, 2);
        assert_eq!(run.dps.mean, 200.0);
        assert_eq!(run.dps.min, 100.0);
        assert_eq!(run.dps.max, 300.0);
        assert_eq!(run.dps.stdev, 100.0);

        let bolt = &run.abilities["mage/bolt"];
        assert_eq!(bolt.casts, 2.0);
        assert_eq!(bolt.damage, 2000.0);
        assert_eq!(bolt.crit_rate, 0.5);
        assert_eq!(run.resources["mage/Mana"].spent, 100.0);
        assert_eq!(run.aura_uptime_percent["mage/power"], 50.0);
    }

    #[test]
    fn test_to_json() {
        let mut aggregator = MetricsAggregator::new();
        aggregator.add(&report(0, 500.0, 5.0));
        let json = aggregator.finish().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["iterations"], 1);
        assert_eq!(value["dps"]["mean"], 100.0);
        assert!(value["abilities"]["mage/bolt"].is_object());
    }

    #[test]
    fn test_empty_run() {
        let run = MetricsAggregator::new().finish();
        assert_eq!(run.iterations, 0);
        assert_eq!(run.dps, DistributionMetrics::default());
    }
}
