use crate::ability::AbilityDef;
use crate::config::AbilityFileConfig;
use crate::{ConfigError, DefinitionError};
use std::collections::BTreeMap;
use std::path::Path;

/// Registry of all ability definitions, loaded from TOML files
#[derive(Debug, Default)]
pub struct AbilityRegistry {
    abilities: BTreeMap<String, AbilityDef>,
}

impl AbilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all abilities from a directory (recursively)
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.load_dir(dir)?;
        Ok(registry)
    }

    /// Load abilities from a directory recursively
    fn load_dir(&mut self, dir: &Path) -> Result<(), ConfigError> {
        if !dir.exists() {
            return Ok(());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
            error: e,
            path: Some(dir.to_path_buf()),
        })?;

        // Sort so duplicate detection reports the same file every run
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::Io {
                error: e,
                path: Some(dir.to_path_buf()),
            })?;
            paths.push(entry.path());
        }
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self.load_dir(&path)?;
            } else if path.extension().is_some_and(|ext| ext == "toml") {
                self.load_file(&path)?;
            }
        }

        Ok(())
    }

    /// Load a single ability file
    fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            error: e,
            path: Some(path.to_path_buf()),
        })?;

        self.load_str(&content, path)
    }

    /// Add every ability in a TOML string; `path` is only used for error reporting
    pub fn load_str(&mut self, content: &str, path: &Path) -> Result<(), ConfigError> {
        let config: AbilityFileConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            error: e,
            path: path.to_path_buf(),
        })?;

        for ability in config.abilities {
            let def = AbilityDef::from_config(ability).map_err(|e| ConfigError::Validation {
                message: e.to_string(),
                path: path.to_path_buf(),
            })?;
            self.insert(def).map_err(|e| ConfigError::Validation {
                message: e.to_string(),
                path: path.to_path_buf(),
            })?;
        }

        Ok(())
    }

    /// Insert a definition, rejecting duplicate ids
    pub fn insert(&mut self, def: AbilityDef) -> Result<(), DefinitionError> {
        if self.abilities.contains_key(&def.id) {
            return Err(DefinitionError::DuplicateAbility(def.id));
        }
        self.abilities.insert(def.id.clone(), def);
        Ok(())
    }

    /// Get an ability by ID
    pub fn get(&self, id: &str) -> Option<&AbilityDef> {
        self.abilities.get(id)
    }

    /// Check if an ability exists
    pub fn contains(&self, id: &str) -> bool {
        self.abilities.contains_key(id)
    }

    /// List all ability IDs in sorted order
    pub fn ability_ids(&self) -> impl Iterator<Item = &str> {
        self.abilities.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_ability_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(format!("{}.toml", name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_simple_file() {
        let dir = TempDir::new().unwrap();
        create_ability_file(
            dir.path(),
            "priest",
            r#"
[[ability]]
id = "smite"
school = "holy"
cast_time_ms = 1500
gcd_ms = 1500

[[ability]]
id = "shadow_word_pain"
school = "shadow"
gcd_ms = 1500

[ability.dot]
ticks = 6
tick_length_ms = 3000
haste = "cast_speed"
"#,
        );

        let registry = AbilityRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("smite"));
        assert!(registry.get("shadow_word_pain").unwrap().dot.is_some());
    }

    #[test]
    fn test_load_nested_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("warrior");
        std::fs::create_dir(&nested).unwrap();
        create_ability_file(
            &nested,
            "arms",
            r#"
[[ability]]
id = "mortal_strike"
school = "physical"
cooldown_ms = 6000
"#,
        );
        create_ability_file(
            dir.path(),
            "shared",
            r#"
[[ability]]
id = "potion"
"#,
        );

        let registry = AbilityRegistry::load(dir.path()).unwrap();
        let ids: Vec<&str> = registry.ability_ids().collect();
        assert_eq!(ids, vec!["mortal_strike", "potion"]);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = AbilityRegistry::load(&dir.path().join("nope")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let dir = TempDir::new().unwrap();
        create_ability_file(dir.path(), "a", "[[ability]]\nid = \"dup\"\n");
        create_ability_file(dir.path(), "b", "[[ability]]\nid = \"dup\"\n");

        let result = AbilityRegistry::load(dir.path());
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = TempDir::new().unwrap();
        create_ability_file(dir.path(), "broken", "[[ability]\nid = ");

        match AbilityRegistry::load(dir.path()) {
            Err(ConfigError::Parse { path, .. }) => {
                assert!(path.ends_with("broken.toml"));
            }
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_error_names_ability() {
        let dir = TempDir::new().unwrap();
        create_ability_file(
            dir.path(),
            "bad",
            "[[ability]]\nid = \"blink\"\ncharges = 1\n",
        );

        match AbilityRegistry::load(dir.path()) {
            Err(ConfigError::Validation { message, .. }) => {
                assert!(message.contains("blink"), "message was {}", message);
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }
}
