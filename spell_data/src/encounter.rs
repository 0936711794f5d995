use crate::{ConfigError, DefinitionError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// A full scenario file: run settings plus the encounter
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioDef {
    #[serde(default)]
    pub settings: RunSettingsDef,
    pub encounter: EncounterDef,
}

/// Monte-Carlo run settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunSettingsDef {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub seed: u64,
}

impl Default for RunSettingsDef {
    fn default() -> Self {
        RunSettingsDef {
            iterations: default_iterations(),
            seed: 0,
        }
    }
}

fn default_iterations() -> u32 {
    1000
}

/// Encounter definition
#[derive(Debug, Clone, Deserialize)]
pub struct EncounterDef {
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,
    #[serde(default)]
    pub duration_variation_secs: f64,
    /// End the fight once the targets' summed health has been dealt
    #[serde(default)]
    pub use_health: bool,
    #[serde(default)]
    pub targets: Vec<TargetDef>,
}

fn default_duration_secs() -> f64 {
    180.0
}

/// A single enemy target
#[derive(Debug, Clone, Deserialize)]
pub struct TargetDef {
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub health: f64,
    #[serde(default)]
    pub disabled_at_start: bool,
}

impl EncounterDef {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }

    pub fn duration_variation(&self) -> Duration {
        Duration::from_secs_f64(self.duration_variation_secs.max(0.0))
    }

    /// Check the encounter can be simulated
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(DefinitionError::InvalidEncounter(format!(
                "duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if !self.duration_variation_secs.is_finite()
            || self.duration_variation_secs < 0.0
            || self.duration_variation_secs >= self.duration_secs
        {
            return Err(DefinitionError::InvalidEncounter(
                "duration variation must be within [0, duration)".to_string(),
            ));
        }
        if !self.targets.is_empty() && self.targets.iter().all(|t| t.disabled_at_start) {
            return Err(DefinitionError::InvalidEncounter(
                "at least one target must be active at the start".to_string(),
            ));
        }
        Ok(())
    }
}

impl ScenarioDef {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            error: e,
            path: Some(path.to_path_buf()),
        })?;
        Self::parse(&content, path)
    }

    /// Parse a scenario from a TOML string; `path` is only used for error reporting
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let scenario: ScenarioDef = toml::from_str(content).map_err(|e| ConfigError::Parse {
            error: e,
            path: path.to_path_buf(),
        })?;

        scenario
            .encounter
            .validate()
            .map_err(|e| ConfigError::Validation {
                message: e.to_string(),
                path: path.to_path_buf(),
            })?;

        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let scenario = ScenarioDef::parse(
            r#"
[settings]
iterations = 250
seed = 7

[encounter]
duration_secs = 120.0
duration_variation_secs = 10.0

[[encounter.targets]]
name = "Training Dummy"
level = 93
"#,
            Path::new("inline.toml"),
        )
        .unwrap();

        assert_eq!(scenario.settings.iterations, 250);
        assert_eq!(scenario.settings.seed, 7);
        assert_eq!(scenario.encounter.duration(), Duration::from_secs(120));
        assert_eq!(scenario.encounter.targets[0].level, 93);
    }

    #[test]
    fn test_defaults() {
        let scenario = ScenarioDef::parse("[encounter]\n", Path::new("inline.toml")).unwrap();
        assert_eq!(scenario.settings.iterations, 1000);
        assert_eq!(scenario.encounter.duration(), Duration::from_secs(180));
        assert!(scenario.encounter.targets.is_empty());
    }

    #[test]
    fn test_variation_longer_than_fight_rejected() {
        let result = ScenarioDef::parse(
            "[encounter]\nduration_secs = 10.0\nduration_variation_secs = 20.0\n",
            Path::new("inline.toml"),
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_all_targets_disabled_rejected() {
        let result = ScenarioDef::parse(
            r#"
[encounter]
[[encounter.targets]]
name = "Add"
disabled_at_start = true
"#,
            Path::new("inline.toml"),
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }
}
