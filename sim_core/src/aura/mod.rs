//! Aura tracker
//!
//! An aura is a timed state machine attached to one unit: inactive, or active with
//! an expiration time (possibly [`NEVER_EXPIRES`]). Auras are registered once at setup
//! and activated many times per iteration; all state is reset between iterations.

mod lifecycle;

pub use lifecycle::AuraState;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::ActionId;
use crate::sim::Simulation;
use crate::time::NEVER_EXPIRES;
use crate::types::{AuraId, DotId, SpellId, UnitId};

/// Hooks fired on aura transitions, in registration order
///
/// Handlers receive the simulation mutably and may activate other auras, cast,
/// or schedule actions; they must not assume anything about ordering relative
/// to other auras' handlers.
pub trait AuraHandler: Send + Sync {
    fn on_gain(&self, _sim: &mut Simulation, _aura: AuraId) {}
    fn on_expire(&self, _sim: &mut Simulation, _aura: AuraId) {}
    fn on_refresh(&self, _sim: &mut Simulation, _aura: AuraId) {}
    fn on_stacks_change(&self, _sim: &mut Simulation, _aura: AuraId, _old: u32, _new: u32) {}
    /// Fired for every active aura of a caster when one of its spells lands
    fn on_cast_complete(&self, _sim: &mut Simulation, _aura: AuraId, _spell: SpellId, _target: UnitId) {}
}

/// Setup-time description of an aura
#[derive(Clone)]
pub struct AuraConfig {
    pub label: String,
    pub duration: Duration,
    /// Zero means the aura does not use stacks
    pub max_stacks: u32,
    /// Activation of a suppressed aura is silently ignored
    pub suppressed: bool,
    pub refire_gain_on_refresh: bool,
    pub handlers: Vec<Arc<dyn AuraHandler>>,
}

impl AuraConfig {
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        AuraConfig {
            label: label.into(),
            duration,
            max_stacks: 0,
            suppressed: false,
            refire_gain_on_refresh: false,
            handlers: Vec::new(),
        }
    }

    /// An aura that stays up until explicitly deactivated
    pub fn permanent(label: impl Into<String>) -> Self {
        Self::new(label, NEVER_EXPIRES)
    }

    pub fn with_max_stacks(mut self, max_stacks: u32) -> Self {
        self.max_stacks = max_stacks;
        self
    }

    pub fn with_handler(mut self, handler: impl AuraHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn with_shared_handler(mut self, handler: Arc<dyn AuraHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn suppressed(mut self, suppressed: bool) -> Self {
        self.suppressed = suppressed;
        self
    }

    pub fn refire_gain_on_refresh(mut self) -> Self {
        self.refire_gain_on_refresh = true;
        self
    }
}

impl fmt::Debug for AuraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuraConfig")
            .field("label", &self.label)
            .field("duration", &self.duration)
            .field("max_stacks", &self.max_stacks)
            .field("suppressed", &self.suppressed)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

pub struct Aura {
    pub(crate) id: AuraId,
    pub(crate) unit: UnitId,
    pub label: String,
    /// Duration used by the next activation or refresh
    pub duration: Duration,
    pub(crate) max_stacks: u32,
    pub(crate) suppressed: bool,
    pub(crate) refire_gain_on_refresh: bool,
    pub(crate) handlers: Vec<Arc<dyn AuraHandler>>,
    pub(crate) periodic: Option<DotId>,

    pub(crate) active: bool,
    pub(crate) stacks: u32,
    pub(crate) started_at: Duration,
    pub(crate) expires: Duration,
    pub(crate) fade_time: Duration,
    pub(crate) expire_action: Option<ActionId>,
    base_duration: Duration,

    pub(crate) uptime: Duration,
    pub(crate) activations: u32,
    pub(crate) refreshes: u32,
}

impl Aura {
    pub(crate) fn new(id: AuraId, unit: UnitId, config: AuraConfig) -> Self {
        Aura {
            id,
            unit,
            label: config.label,
            duration: config.duration,
            max_stacks: config.max_stacks,
            suppressed: config.suppressed,
            refire_gain_on_refresh: config.refire_gain_on_refresh,
            handlers: config.handlers,
            periodic: None,
            active: false,
            stacks: 0,
            started_at: Duration::ZERO,
            expires: Duration::ZERO,
            fade_time: Duration::ZERO,
            expire_action: None,
            base_duration: config.duration,
            uptime: Duration::ZERO,
            activations: 0,
            refreshes: 0,
        }
    }

    pub fn id(&self) -> AuraId {
        self.id
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stacks(&self) -> u32 {
        self.stacks
    }

    pub fn max_stacks(&self) -> u32 {
        self.max_stacks
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn started_at(&self) -> Duration {
        self.started_at
    }

    /// Expiration time of the current activation
    pub fn expires_at(&self) -> Duration {
        self.expires
    }

    /// When the aura last went inactive
    pub fn fade_time(&self) -> Duration {
        self.fade_time
    }

    /// The periodic effect riding on this aura, if any
    pub fn periodic(&self) -> Option<DotId> {
        self.periodic
    }

    pub fn remaining_duration(&self, now: Duration) -> Duration {
        if !self.active {
            Duration::ZERO
        } else if self.expires == NEVER_EXPIRES {
            NEVER_EXPIRES
        } else {
            self.expires.saturating_sub(now)
        }
    }

    /// Time spent active in the current activation
    pub fn time_active(&self, now: Duration) -> Duration {
        if self.active {
            now.saturating_sub(self.started_at)
        } else {
            Duration::ZERO
        }
    }

    /// Total active time this iteration, including the running activation
    pub fn uptime(&self, now: Duration) -> Duration {
        self.uptime + self.time_active(now)
    }

    pub fn activations(&self) -> u32 {
        self.activations
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes
    }

    pub(crate) fn reset(&mut self) {
        self.active = false;
        self.stacks = 0;
        self.started_at = Duration::ZERO;
        self.expires = Duration::ZERO;
        self.fade_time = Duration::ZERO;
        self.expire_action = None;
        self.duration = self.base_duration;
        self.uptime = Duration::ZERO;
        self.activations = 0;
        self.refreshes = 0;
    }
}

impl fmt::Debug for Aura {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aura")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("unit", &self.unit)
            .field("active", &self.active)
            .field("stacks", &self.stacks)
            .field("expires", &self.expires)
            .finish()
    }
}

/// Per-unit index of registered auras
#[derive(Debug, Default)]
pub struct AuraTracker {
    auras: Vec<AuraId>,
    by_label: HashMap<String, AuraId>,
}

impl AuraTracker {
    pub fn get(&self, label: &str) -> Option<AuraId> {
        self.by_label.get(label).copied()
    }

    /// Auras in registration order
    pub fn iter(&self) -> impl Iterator<Item = AuraId> + '_ {
        self.auras.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.auras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auras.is_empty()
    }

    pub(crate) fn insert(&mut self, label: String, id: AuraId) {
        self.auras.push(id);
        self.by_label.insert(label, id);
    }
}
