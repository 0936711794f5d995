use serde::Serialize;

use super::outcome::HitOutcome;
use crate::types::{SpellId, UnitId};

/// What one damage or healing event did
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpellResult {
    pub spell: SpellId,
    pub target: UnitId,
    pub outcome: HitOutcome,
    /// Final amount after every multiplier; zero when the effect did not land
    pub amount: f64,
    pub is_healing: bool,
    pub is_periodic: bool,
}

impl SpellResult {
    pub fn landed(&self) -> bool {
        self.outcome.landed()
    }

    pub fn is_crit(&self) -> bool {
        self.outcome == HitOutcome::Crit
    }
}
