//! Handles into the simulation's arenas
//!
//! Every long-lived object (unit, aura, periodic effect, spell, cooldown timer)
//! is owned by the [`Simulation`](crate::Simulation) and referred to by index.

use serde::Serialize;
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position in the owning arena
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// A player, pet or target
    UnitId,
    "unit"
);
arena_id!(
    /// A named status effect attached to one unit
    AuraId,
    "aura"
);
arena_id!(
    /// A periodic effect of one spell on one unit
    DotId,
    "dot"
);
arena_id!(
    /// A registered ability
    SpellId,
    "spell"
);
arena_id!(
    /// A cooldown timer, possibly shared between abilities
    TimerId,
    "timer"
);

/// Whether a unit is on the player's side or the encounter's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Player,
    Enemy,
}

impl UnitKind {
    pub fn is_opponent_of(self, other: UnitKind) -> bool {
        self != other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(UnitId(3).to_string(), "unit#3");
        assert_eq!(DotId(0).to_string(), "dot#0");
        assert_eq!(SpellId(12).index(), 12);
    }

    #[test]
    fn test_opponents() {
        assert!(UnitKind::Player.is_opponent_of(UnitKind::Enemy));
        assert!(!UnitKind::Enemy.is_opponent_of(UnitKind::Enemy));
    }
}
