//! Combat constants configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use super::ConfigError;

/// Global combat constants instance
static COMBAT_CONSTANTS: OnceLock<CombatConstants> = OnceLock::new();

/// Initialize the global combat constants from a TOML file
///
/// Must be called before the first simulation is built if the defaults are not wanted.
/// Returns error if already initialized or if loading fails.
pub fn init_constants(path: &Path) -> Result<(), ConfigError> {
    let constants = CombatConstants::load_from_path(path)?;
    constants.validate().map_err(|message| ConfigError::Validation {
        message,
        path: path.to_path_buf(),
    })?;
    COMBAT_CONSTANTS
        .set(constants)
        .map_err(|_| ConfigError::AlreadyInitialized("CombatConstants"))
}

/// Initialize the global combat constants with default values
pub fn init_constants_default() -> Result<(), ConfigError> {
    COMBAT_CONSTANTS
        .set(CombatConstants::default())
        .map_err(|_| ConfigError::AlreadyInitialized("CombatConstants"))
}

/// Get a reference to the global combat constants
///
/// Falls back to defaults when nothing was initialized.
pub fn constants() -> &'static CombatConstants {
    COMBAT_CONSTANTS.get_or_init(CombatConstants::default)
}

/// Check if constants have been initialized
pub fn constants_initialized() -> bool {
    COMBAT_CONSTANTS.get().is_some()
}

/// Tunable combat constants
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombatConstants {
    #[serde(default)]
    pub attack_table: AttackTableConstants,
    #[serde(default)]
    pub casting: CastingConstants,
    #[serde(default)]
    pub levels: LevelConstants,
    #[serde(default)]
    pub encounter: EncounterConstants,
}

impl CombatConstants {
    /// Load constants from a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            error,
            path: Some(path.to_path_buf()),
        })?;
        toml::from_str(&content).map_err(|error| ConfigError::Parse {
            error,
            path: path.to_path_buf(),
        })
    }

    /// Check ranges that would otherwise break the engine mid-run
    pub fn validate(&self) -> Result<(), String> {
        if self.casting.idle_poll_ms == 0 {
            return Err("casting.idle_poll_ms must be positive".to_string());
        }
        if self.casting.min_gcd_ms == 0 {
            return Err("casting.min_gcd_ms must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.attack_table.block_reduction) {
            return Err("attack_table.block_reduction must be within [0, 1]".to_string());
        }
        if self.encounter.aoe_cap_targets == 0 {
            return Err("encounter.aoe_cap_targets must be positive".to_string());
        }
        if self.encounter.health_fight_duration_secs <= 0.0 {
            return Err("encounter.health_fight_duration_secs must be positive".to_string());
        }
        Ok(())
    }
}

/// Level-difference ladders, indexed by `defender level - attacker level` clamped to 0..=3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackTableConstants {
    #[serde(default = "default_enemy_spell_miss")]
    pub enemy_spell_miss: [f64; 4],
    #[serde(default = "default_enemy_avoidance")]
    pub enemy_miss: [f64; 4],
    #[serde(default = "default_enemy_avoidance")]
    pub enemy_dodge: [f64; 4],
    #[serde(default = "default_enemy_avoidance")]
    pub enemy_parry: [f64; 4],
    #[serde(default = "default_enemy_avoidance")]
    pub enemy_block: [f64; 4],
    #[serde(default = "default_enemy_glance")]
    pub enemy_glance: [f64; 4],
    #[serde(default = "default_enemy_glance_multiplier")]
    pub enemy_glance_multiplier: [f64; 4],
    #[serde(default = "default_crit_suppression")]
    pub enemy_melee_crit_suppression: [f64; 4],
    #[serde(default = "default_crit_suppression")]
    pub enemy_spell_crit_suppression: [f64; 4],
    #[serde(default = "default_player_spell_miss")]
    pub player_spell_miss: [f64; 4],
    #[serde(default = "default_player_miss")]
    pub player_miss: [f64; 4],
    #[serde(default = "default_player_avoidance")]
    pub player_dodge: [f64; 4],
    #[serde(default = "default_player_avoidance")]
    pub player_parry: [f64; 4],
    #[serde(default = "default_player_avoidance")]
    pub player_block: [f64; 4],
    /// Fraction of damage removed by a block
    #[serde(default = "default_block_reduction")]
    pub block_reduction: f64,
}

impl Default for AttackTableConstants {
    fn default() -> Self {
        AttackTableConstants {
            enemy_spell_miss: default_enemy_spell_miss(),
            enemy_miss: default_enemy_avoidance(),
            enemy_dodge: default_enemy_avoidance(),
            enemy_parry: default_enemy_avoidance(),
            enemy_block: default_enemy_avoidance(),
            enemy_glance: default_enemy_glance(),
            enemy_glance_multiplier: default_enemy_glance_multiplier(),
            enemy_melee_crit_suppression: default_crit_suppression(),
            enemy_spell_crit_suppression: default_crit_suppression(),
            player_spell_miss: default_player_spell_miss(),
            player_miss: default_player_miss(),
            player_dodge: default_player_avoidance(),
            player_parry: default_player_avoidance(),
            player_block: default_player_avoidance(),
            block_reduction: default_block_reduction(),
        }
    }
}

fn default_enemy_spell_miss() -> [f64; 4] {
    [0.06, 0.09, 0.12, 0.15]
}
fn default_enemy_avoidance() -> [f64; 4] {
    [0.03, 0.045, 0.06, 0.075]
}
fn default_enemy_glance() -> [f64; 4] {
    [0.06, 0.12, 0.18, 0.24]
}
fn default_enemy_glance_multiplier() -> [f64; 4] {
    [0.95, 0.95, 0.85, 0.75]
}
fn default_crit_suppression() -> [f64; 4] {
    [0.0, 0.01, 0.02, 0.03]
}
fn default_player_spell_miss() -> [f64; 4] {
    [0.06, 0.03, 0.0, -0.03]
}
fn default_player_miss() -> [f64; 4] {
    [0.03, 0.015, 0.0, -0.015]
}
fn default_player_avoidance() -> [f64; 4] {
    [0.0, -0.015, -0.03, -0.045]
}
fn default_block_reduction() -> f64 {
    0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastingConstants {
    /// Floor for hasted global cooldowns
    #[serde(default = "default_min_gcd_ms")]
    pub min_gcd_ms: u64,
    /// Default pause between the end of a channel and the next action
    #[serde(default)]
    pub channel_clip_delay_ms: u64,
    /// Hard cap on abilities registered per unit
    #[serde(default = "default_max_spells_per_unit")]
    pub max_spells_per_unit: usize,
    /// Critical strike multiplier of physical abilities that leave theirs unset
    #[serde(default = "default_crit_multiplier")]
    pub physical_crit_multiplier: f64,
    /// Critical strike multiplier of magic abilities that leave theirs unset
    #[serde(default = "default_crit_multiplier")]
    pub spell_crit_multiplier: f64,
    /// How long an idle unit waits before deciding again when nothing becomes ready
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

impl CastingConstants {
    pub fn min_gcd(&self) -> Duration {
        Duration::from_millis(self.min_gcd_ms)
    }

    pub fn channel_clip_delay(&self) -> Duration {
        Duration::from_millis(self.channel_clip_delay_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl Default for CastingConstants {
    fn default() -> Self {
        CastingConstants {
            min_gcd_ms: default_min_gcd_ms(),
            channel_clip_delay_ms: 0,
            max_spells_per_unit: default_max_spells_per_unit(),
            physical_crit_multiplier: default_crit_multiplier(),
            spell_crit_multiplier: default_crit_multiplier(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

fn default_min_gcd_ms() -> u64 {
    1000
}
fn default_max_spells_per_unit() -> usize {
    100
}
fn default_idle_poll_ms() -> u64 {
    100
}
fn default_crit_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelConstants {
    #[serde(default = "default_player_level")]
    pub player_level: u32,
    /// Levels a boss sits above the player when a target leaves its level unset
    #[serde(default = "default_boss_level_offset")]
    pub boss_level_offset: u32,
}

impl LevelConstants {
    pub fn boss_level(&self) -> u32 {
        self.player_level + self.boss_level_offset
    }
}

impl Default for LevelConstants {
    fn default() -> Self {
        LevelConstants {
            player_level: default_player_level(),
            boss_level_offset: default_boss_level_offset(),
        }
    }
}

fn default_player_level() -> u32 {
    90
}
fn default_boss_level_offset() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterConstants {
    /// Number of targets beyond which area damage is scaled down
    #[serde(default = "default_aoe_cap_targets")]
    pub aoe_cap_targets: u32,
    /// Upper bound on a health-based fight
    #[serde(default = "default_health_fight_duration_secs")]
    pub health_fight_duration_secs: f64,
}

impl Default for EncounterConstants {
    fn default() -> Self {
        EncounterConstants {
            aoe_cap_targets: default_aoe_cap_targets(),
            health_fight_duration_secs: default_health_fight_duration_secs(),
        }
    }
}

fn default_aoe_cap_targets() -> u32 {
    20
}
fn default_health_fight_duration_secs() -> f64 {
    600.0
}
