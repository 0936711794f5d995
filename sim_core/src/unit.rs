//! Units taking part in the encounter

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use spell_data::ResourceKind;

use crate::aura::AuraTracker;
use crate::resource::{ResourceBarConfig, ResourcePool};
use crate::rotation::Rotation;
use crate::clock::ActionId;
use crate::types::{DotId, SpellId, TimerId, UnitId, UnitKind};

/// Combat statistics that feed cast times, tick periods and the attack table
#[derive(Debug, Clone, PartialEq)]
pub struct UnitStats {
    /// Cast speed multiplier; 1.25 casts 25% faster
    pub cast_speed: f64,
    /// Real haste multiplier for effects that scale with it
    pub real_haste: f64,
    pub spell_crit_percent: f64,
    pub physical_crit_percent: f64,
    pub spell_hit_percent: f64,
    pub melee_hit_percent: f64,
    pub expertise_percent: f64,
    /// Base mana pool, the reference for percentage-of-base mana costs
    pub base_mana: f64,
    pub health: f64,
}

impl Default for UnitStats {
    fn default() -> Self {
        UnitStats {
            cast_speed: 1.0,
            real_haste: 1.0,
            spell_crit_percent: 0.0,
            physical_crit_percent: 0.0,
            spell_hit_percent: 0.0,
            melee_hit_percent: 0.0,
            expertise_percent: 0.0,
            base_mana: 0.0,
            health: 0.0,
        }
    }
}

impl UnitStats {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.cast_speed > 0.0 && self.cast_speed.is_finite()) {
            return Err(format!("cast_speed must be positive, got {}", self.cast_speed));
        }
        if !(self.real_haste > 0.0 && self.real_haste.is_finite()) {
            return Err(format!("real_haste must be positive, got {}", self.real_haste));
        }
        Ok(())
    }
}

/// Everything needed to add a player-side unit
pub struct UnitConfig {
    pub label: String,
    /// Defaults to the configured player level
    pub level: Option<u32>,
    pub stats: UnitStats,
    pub resources: Vec<ResourceBarConfig>,
    /// Pause after a channel before the next decision; defaults to the configured value
    pub channel_clip_delay: Option<Duration>,
    pub distance_from_target: f64,
    pub rotation: Option<Box<dyn Rotation>>,
}

impl UnitConfig {
    pub fn new(label: impl Into<String>) -> Self {
        UnitConfig {
            label: label.into(),
            level: None,
            stats: UnitStats::default(),
            resources: Vec::new(),
            channel_clip_delay: None,
            distance_from_target: 0.0,
            rotation: None,
        }
    }

    pub fn with_stats(mut self, stats: UnitStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_resource(mut self, bar: ResourceBarConfig) -> Self {
        self.resources.push(bar);
        self
    }

    pub fn with_rotation(mut self, rotation: impl Rotation + 'static) -> Self {
        self.rotation = Some(Box::new(rotation));
        self
    }

    pub fn with_channel_clip_delay(mut self, delay: Duration) -> Self {
        self.channel_clip_delay = Some(delay);
        self
    }
}

impl fmt::Debug for UnitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitConfig")
            .field("label", &self.label)
            .field("level", &self.level)
            .field("stats", &self.stats)
            .field("resources", &self.resources)
            .field("rotation", &self.rotation.is_some())
            .finish()
    }
}

/// An in-progress cast with a cast time
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Hardcast {
    pub expires: Duration,
    pub spell: Option<SpellId>,
    pub action: Option<ActionId>,
}

pub struct Unit {
    pub(crate) id: UnitId,
    pub label: String,
    pub kind: UnitKind,
    pub level: u32,
    pub stats: UnitStats,
    pub moving: bool,
    pub distance_from_target: f64,
    pub channel_clip_delay: Duration,
    pub current_target: Option<UnitId>,
    pub(crate) enabled: bool,
    pub(crate) enabled_at_start: bool,
    pub(crate) gcd: TimerId,
    pub(crate) named_timers: BTreeMap<String, TimerId>,
    pub(crate) hardcast: Hardcast,
    pub(crate) channeled_dot: Option<DotId>,
    pub(crate) ready_action: Option<ActionId>,
    pub(crate) rotation: Option<Box<dyn Rotation>>,
    pub(crate) auras: AuraTracker,
    pub(crate) spellbook: Vec<SpellId>,
    pub(crate) resources: ResourcePool,
    pub(crate) damage_taken: f64,
    pub(crate) healing_taken: f64,
}

impl Unit {
    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_channeling(&self) -> bool {
        self.channeled_dot.is_some()
    }

    pub fn channeled_dot(&self) -> Option<DotId> {
        self.channeled_dot
    }

    pub fn gcd_timer(&self) -> TimerId {
        self.gcd
    }

    pub fn spellbook(&self) -> &[SpellId] {
        &self.spellbook
    }

    pub fn resources(&self) -> &ResourcePool {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourcePool {
        &mut self.resources
    }

    pub fn damage_taken(&self) -> f64 {
        self.damage_taken
    }

    pub fn healing_taken(&self) -> f64 {
        self.healing_taken
    }

    pub fn current_resource(&self, kind: ResourceKind, now: Duration) -> f64 {
        self.resources.current(kind, now)
    }

    /// Whether a cast with a cast time is still running at `now`
    pub fn is_hardcasting(&self, now: Duration) -> bool {
        self.hardcast.expires > now
    }

    pub(crate) fn reset(&mut self) {
        self.enabled = self.enabled_at_start;
        self.moving = false;
        self.hardcast = Hardcast::default();
        self.channeled_dot = None;
        self.ready_action = None;
        self.resources.reset();
        self.damage_taken = 0.0;
        self.healing_taken = 0.0;
        if let Some(rotation) = self.rotation.as_mut() {
            rotation.reset();
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("level", &self.level)
            .field("enabled", &self.enabled)
            .finish()
    }
}
