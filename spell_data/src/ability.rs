use crate::config::{AbilityConfig, CostConfig, OptionValue, PeriodicConfig};
use crate::types::{ResourceKind, SpellSchool, TickHaste};
use crate::DefinitionError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Flag names understood by the engine
pub const KNOWN_FLAGS: &[&str] = &[
    "channeled",
    "can_cast_while_moving",
    "cast_while_channeling",
    "suppress_dot_apply",
    "no_metrics",
    "no_on_cast_complete",
    "ignore_haste",
    "swapped",
];

/// A validated ability definition
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityDef {
    pub id: String,
    pub name: String,
    pub school: SpellSchool,
    pub flags: Vec<String>,
    pub behavior: Option<String>,
    pub cast_time: Duration,
    pub gcd: Duration,
    pub cooldown: Duration,
    pub shared_cooldown: Option<CooldownDef>,
    pub charges: u32,
    pub recharge_time: Duration,
    pub min_range: f64,
    pub max_range: f64,
    pub damage_multiplier: f64,
    pub damage_multiplier_additive: f64,
    pub crit_multiplier: f64,
    pub bonus_crit_percent: f64,
    pub bonus_hit_percent: f64,
    pub cost: Option<CostDef>,
    pub dot: Option<PeriodicDef>,
    pub hot: Option<PeriodicDef>,
    pub options: BTreeMap<String, OptionValue>,
}

/// Named cooldown group shared by several abilities
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownDef {
    pub group: String,
    pub duration: Duration,
}

/// Resource cost of an ability
#[derive(Debug, Clone, PartialEq)]
pub enum CostDef {
    /// Percent of base mana plus a flat part
    Mana { base_cost_percent: f64, flat: f64 },
    /// Flat cost of any other resource
    Power {
        kind: ResourceKind,
        amount: f64,
        refund_fraction: f64,
    },
}

/// Periodic effect attached to an ability
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicDef {
    pub tick_length: Duration,
    pub ticks: u32,
    pub haste: TickHaste,
    pub haste_reduces_duration: bool,
    pub aoe: bool,
    pub self_only: bool,
    pub bonus_coefficient: f64,
    pub periodic_damage_multiplier: f64,
    pub base_tick_damage: f64,
    pub label: Option<String>,
    pub max_stacks: u32,
}

impl AbilityDef {
    /// Validate and convert a raw ability config
    pub fn from_config(config: AbilityConfig) -> Result<Self, DefinitionError> {
        let id = config.id.clone();
        let invalid = |message: String| DefinitionError::InvalidAbility {
            ability: id.clone(),
            message,
        };

        if config.id.trim().is_empty() {
            return Err(invalid("ability id must not be empty".to_string()));
        }

        if let Some(flag) = config.flags.iter().find(|f| !KNOWN_FLAGS.contains(&f.as_str())) {
            return Err(invalid(format!("unknown flag '{}'", flag)));
        }

        if config.charges > 0 && config.recharge_time_ms == 0 {
            return Err(invalid("has charges but no recharge time".to_string()));
        }

        let shared_cooldown = match config.shared_cooldown {
            Some(shared) if shared.duration_ms == 0 => {
                return Err(invalid(format!(
                    "shared cooldown '{}' without a duration",
                    shared.group
                )));
            }
            Some(shared) => Some(CooldownDef {
                group: shared.group,
                duration: Duration::from_millis(shared.duration_ms),
            }),
            None => None,
        };

        let cost = config.cost.map(|c| cost_from_config(c, &id)).transpose()?;
        let dot = config.dot.map(|p| periodic_from_config(p, &id)).transpose()?;
        let hot = config.hot.map(|p| periodic_from_config(p, &id)).transpose()?;

        Ok(AbilityDef {
            name: config.name.unwrap_or_else(|| config.id.clone()),
            id: config.id,
            school: config.school,
            flags: config.flags,
            behavior: config.behavior,
            cast_time: Duration::from_millis(config.cast_time_ms),
            gcd: Duration::from_millis(config.gcd_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
            shared_cooldown,
            charges: config.charges,
            recharge_time: Duration::from_millis(config.recharge_time_ms),
            min_range: config.min_range,
            max_range: config.max_range,
            damage_multiplier: config.damage_multiplier,
            damage_multiplier_additive: config.damage_multiplier_additive,
            crit_multiplier: config.crit_multiplier,
            bonus_crit_percent: config.bonus_crit_percent,
            bonus_hit_percent: config.bonus_hit_percent,
            cost,
            dot,
            hot,
            options: config.options,
        })
    }

    /// Whether the named flag is set
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Numeric option, if present
    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.options.get(key).and_then(OptionValue::as_f64)
    }

    /// Boolean option, defaulting to false
    pub fn option_bool(&self, key: &str) -> bool {
        self.options
            .get(key)
            .and_then(OptionValue::as_bool)
            .unwrap_or(false)
    }
}

fn cost_from_config(config: CostConfig, ability: &str) -> Result<CostDef, DefinitionError> {
    let invalid = |message: &str| DefinitionError::InvalidAbility {
        ability: ability.to_string(),
        message: message.to_string(),
    };

    if !(0.0..=1.0).contains(&config.refund_fraction) {
        return Err(invalid("refund_fraction must be within [0, 1]"));
    }
    if config.amount < 0.0 || config.base_cost_percent < 0.0 {
        return Err(invalid("cost must not be negative"));
    }

    match config.kind {
        ResourceKind::Mana => Ok(CostDef::Mana {
            base_cost_percent: config.base_cost_percent,
            flat: config.amount,
        }),
        kind => {
            if config.base_cost_percent != 0.0 {
                return Err(invalid("base_cost_percent only applies to mana costs"));
            }
            Ok(CostDef::Power {
                kind,
                amount: config.amount,
                refund_fraction: config.refund_fraction,
            })
        }
    }
}

fn periodic_from_config(
    config: PeriodicConfig,
    ability: &str,
) -> Result<PeriodicDef, DefinitionError> {
    if (config.ticks == 0) != (config.tick_length_ms == 0) {
        return Err(DefinitionError::InvalidAbility {
            ability: ability.to_string(),
            message: "periodic effect needs both ticks and tick_length_ms".to_string(),
        });
    }
    if config.aoe && config.self_only {
        return Err(DefinitionError::InvalidAbility {
            ability: ability.to_string(),
            message: "periodic effect cannot be both aoe and self_only".to_string(),
        });
    }

    Ok(PeriodicDef {
        tick_length: Duration::from_millis(config.tick_length_ms),
        ticks: config.ticks,
        haste: config.haste,
        haste_reduces_duration: config.haste_reduces_duration,
        aoe: config.aoe,
        self_only: config.self_only,
        bonus_coefficient: config.bonus_coefficient,
        periodic_damage_multiplier: config.periodic_damage_multiplier,
        base_tick_damage: config.base_tick_damage,
        label: config.label,
        max_stacks: config.max_stacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AbilityFileConfig;

    fn parse_single(toml: &str) -> AbilityConfig {
        let file: AbilityFileConfig = toml::from_str(toml).unwrap();
        file.abilities.into_iter().next().unwrap()
    }

    #[test]
    fn test_basic_ability() {
        let config = parse_single(
            r#"
[[ability]]
id = "smite"
school = "holy"
cast_time_ms = 1500
gcd_ms = 1500

[ability.cost]
kind = "mana"
base_cost_percent = 5.0
"#,
        );
        let def = AbilityDef::from_config(config).unwrap();
        assert_eq!(def.name, "smite");
        assert_eq!(def.school, SpellSchool::Holy);
        assert_eq!(def.cast_time, Duration::from_millis(1500));
        assert_eq!(
            def.cost,
            Some(CostDef::Mana {
                base_cost_percent: 5.0,
                flat: 0.0
            })
        );
    }

    #[test]
    fn test_charges_without_recharge_rejected() {
        let config = parse_single(
            r#"
[[ability]]
id = "roll"
charges = 2
"#,
        );
        let err = AbilityDef::from_config(config).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidAbility { ref ability, .. } if ability == "roll"));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let config = parse_single(
            r#"
[[ability]]
id = "bolt"
flags = ["teleports"]
"#,
        );
        assert!(AbilityDef::from_config(config).is_err());
    }

    #[test]
    fn test_periodic_requires_tick_length() {
        let config = parse_single(
            r#"
[[ability]]
id = "corruption"

[ability.dot]
ticks = 6
"#,
        );
        assert!(AbilityDef::from_config(config).is_err());
    }

    #[test]
    fn test_options() {
        let config = parse_single(
            r#"
[[ability]]
id = "pain"
behavior = "periodic_damage"

[ability.dot]
ticks = 6
tick_length_ms = 3000
haste = "cast_speed"

[ability.options]
tick_damage = 1200
refresh = true
"#,
        );
        let def = AbilityDef::from_config(config).unwrap();
        assert_eq!(def.option_f64("tick_damage"), Some(1200.0));
        assert!(def.option_bool("refresh"));
        assert!(!def.option_bool("missing"));
        let dot = def.dot.unwrap();
        assert_eq!(dot.haste, TickHaste::CastSpeed);
        assert_eq!(dot.tick_length, Duration::from_millis(3000));
    }

    #[test]
    fn test_power_cost_refund_range() {
        let config = parse_single(
            r#"
[[ability]]
id = "strike"

[ability.cost]
kind = "rage"
amount = 30
refund_fraction = 1.5
"#,
        );
        assert!(AbilityDef::from_config(config).is_err());
    }
}
