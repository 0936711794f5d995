//! Monte-Carlo runner: many independent iterations folded into one report

use rayon::prelude::*;
use spell_data::RunSettingsDef;
use tracing::{debug, info};

use crate::error::SimError;
use crate::metrics::{IterationReport, MetricsAggregator, RunMetrics};
use crate::sim::Simulation;

/// How many iterations to run and the seed they derive from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub iterations: u32,
    pub seed: u64,
}

impl RunSettings {
    pub fn new(iterations: u32, seed: u64) -> Self {
        RunSettings { iterations, seed }
    }

    pub fn from_def(def: &RunSettingsDef) -> Result<Self, SimError> {
        let settings = RunSettings::new(def.iterations, def.seed);
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.iterations == 0 {
            return Err(SimError::InvalidSettings("iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Seed of iteration `index` of a run seeded with `seed` (SplitMix64 finalizer)
pub fn iteration_seed(seed: u64, index: u32) -> u64 {
    let mut z = seed.wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run `settings.iterations` iterations in parallel
///
/// `setup` builds a ready-to-run simulation; it is called once up front so a
/// configuration error surfaces before any work is fanned out, then once per
/// worker. Reports are folded in iteration order, so the result does not
/// depend on the number of threads.
pub fn run<F>(settings: RunSettings, setup: F) -> Result<RunMetrics, SimError>
where
    F: Fn() -> Result<Simulation, SimError> + Sync + Send,
{
    settings.validate()?;
    let checked = setup()?;
    debug!(?checked, "setup validated");
    drop(checked);

    info!(iterations = settings.iterations, seed = settings.seed, "run started");
    let reports: Vec<IterationReport> = (0..settings.iterations)
        .into_par_iter()
        .map_init(&setup, |sim, index| match sim {
            Ok(sim) => Ok(sim.run_iteration(settings.seed, index)),
            Err(err) => Err(err.clone()),
        })
        .collect::<Result<_, _>>()?;

    let metrics = aggregate(&reports);
    info!(
        iterations = metrics.iterations,
        dps_mean = metrics.dps.mean,
        dps_stdev = metrics.dps.stdev,
        "run finished"
    );
    Ok(metrics)
}

/// Run every iteration on the calling thread
pub fn run_sequential<F>(settings: RunSettings, setup: F) -> Result<RunMetrics, SimError>
where
    F: Fn() -> Result<Simulation, SimError>,
{
    settings.validate()?;
    let mut sim = setup()?;
    let reports: Vec<IterationReport> = (0..settings.iterations)
        .map(|index| sim.run_iteration(settings.seed, index))
        .collect();
    Ok(aggregate(&reports))
}

fn aggregate(reports: &[IterationReport]) -> RunMetrics {
    let mut aggregator = MetricsAggregator::new();
    for report in reports {
        aggregator.add(report);
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encounter::EncounterConfig;
    use crate::resource::ResourceBarConfig;
    use crate::rotation::PriorityRotation;
    use crate::spell::{CastConfig, DirectDamage, PowerCost, SpellConfig, SpellCost};
    use crate::unit::{UnitConfig, UnitStats};
    use crate::spell::BehaviorRegistry;
    use spell_data::{AbilityRegistry, OptionValue, ResourceKind, ScenarioDef, SpellSchool};
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::Duration;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn rogue() -> Result<Simulation, SimError> {
        let mut encounter = EncounterConfig::single_target(ms(120_000));
        encounter.duration_variation = ms(10_000);
        let mut sim = Simulation::new(encounter)?;
        let stats = UnitStats {
            physical_crit_percent: 25.0,
            melee_hit_percent: 7.5,
            expertise_percent: 7.5,
            ..UnitStats::default()
        };
        let player = sim.add_player(
            UnitConfig::new("rogue")
                .with_stats(stats)
                .with_resource(ResourceBarConfig::new(ResourceKind::Energy, 100.0).with_regen(10.0)),
        )?;
        let strike = sim.register_spell(
            player,
            SpellConfig::new("strike")
                .with_school(SpellSchool::Physical)
                .with_cast(CastConfig::instant(ms(1000)))
                .with_cost(SpellCost::new(PowerCost::new(ResourceKind::Energy, 40.0)))
                .with_behavior(DirectDamage)
                .with_option("base_damage", OptionValue::Number(5000.0)),
        )?;
        sim.set_rotation(player, PriorityRotation::new(vec![strike]));
        Ok(sim)
    }

    #[test]
    fn test_iteration_seeds_are_distinct() {
        let seeds: HashSet<u64> = (0..1000).map(|i| iteration_seed(7, i)).collect();
        assert_eq!(seeds.len(), 1000);
        assert_ne!(iteration_seed(1, 0), iteration_seed(2, 0));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let settings = RunSettings::new(24, 99);
        let parallel = run(settings, rogue).unwrap();
        let sequential = run_sequential(settings, rogue).unwrap();
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.iterations, 24);
        assert!(parallel.dps.mean > 0.0);
        assert!(parallel.dps.min <= parallel.dps.max);
        assert!(parallel.to_json().unwrap().contains("rogue/strike"));
    }

    #[test]
    fn test_setup_error_surfaces_before_fan_out() {
        let err = run(RunSettings::new(4, 0), || {
            Simulation::new(EncounterConfig {
                targets: vec![crate::encounter::TargetConfig::new("add").disabled_at_start()],
                ..EncounterConfig::single_target(ms(1000))
            })
        })
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidEncounter(_)));
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    }

    #[test]
    fn test_scenario_from_toml() {
        init_logging();
        let scenario = ScenarioDef::parse(
            r#"
[settings]
iterations = 8
seed = 3

[encounter]
duration_secs = 30.0

[[encounter.targets]]
name = "boss"
"#,
            Path::new("scenario.toml"),
        )
        .unwrap();
        let mut abilities = AbilityRegistry::new();
        abilities
            .load_str(
                r#"
[[ability]]
id = "fireball"
school = "fire"
behavior = "direct_damage"
cast_time_ms = 2500
gcd_ms = 1500

[ability.options]
base_damage = 1200.0
"#,
                Path::new("mage.toml"),
            )
            .unwrap();
        let behaviors = BehaviorRegistry::with_builtins();
        let settings = RunSettings::from_def(&scenario.settings).unwrap();

        let metrics = run(settings, || {
            let mut sim = Simulation::new(EncounterConfig::from_def(&scenario.encounter)?)?;
            let mage = sim.add_player(UnitConfig::new("mage"))?;
            let def = abilities
                .get("fireball")
                .ok_or_else(|| SimError::UnknownAbility("fireball".to_string()))?;
            let fireball = sim.register_ability(mage, def, &behaviors)?;
            sim.set_rotation(mage, PriorityRotation::new(vec![fireball]));
            Ok(sim)
        })
        .unwrap();

        assert_eq!(metrics.iterations, 8);
        assert_eq!(metrics.duration_secs.mean, 30.0);
        // back-to-back 2.5s casts, the last one landing exactly at the end
        assert_eq!(metrics.abilities["mage/fireball"].casts, 12.0);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let def = RunSettingsDef {
            iterations: 0,
            seed: 1,
        };
        assert!(matches!(RunSettings::from_def(&def), Err(SimError::InvalidSettings(_))));
    }
}
