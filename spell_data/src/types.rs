use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic school of an ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellSchool {
    #[default]
    None,
    Physical,
    Arcane,
    Fire,
    Frost,
    Holy,
    Nature,
    Shadow,
}

impl SpellSchool {
    pub fn is_physical(&self) -> bool {
        matches!(self, SpellSchool::Physical)
    }
}

impl fmt::Display for SpellSchool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpellSchool::None => write!(f, "None"),
            SpellSchool::Physical => write!(f, "Physical"),
            SpellSchool::Arcane => write!(f, "Arcane"),
            SpellSchool::Fire => write!(f, "Fire"),
            SpellSchool::Frost => write!(f, "Frost"),
            SpellSchool::Holy => write!(f, "Holy"),
            SpellSchool::Nature => write!(f, "Nature"),
            SpellSchool::Shadow => write!(f, "Shadow"),
        }
    }
}

/// Resource pools an ability can spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Mana,
    Energy,
    Rage,
    Focus,
    HolyPower,
}

impl ResourceKind {
    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::Mana,
            ResourceKind::Energy,
            ResourceKind::Rage,
            ResourceKind::Focus,
            ResourceKind::HolyPower,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Mana => write!(f, "Mana"),
            ResourceKind::Energy => write!(f, "Energy"),
            ResourceKind::Rage => write!(f, "Rage"),
            ResourceKind::Focus => write!(f, "Focus"),
            ResourceKind::HolyPower => write!(f, "Holy Power"),
        }
    }
}

/// Which haste category shortens a periodic effect's tick length
///
/// The categories are mutually exclusive per effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickHaste {
    #[default]
    None,
    /// Spell haste (cast speed)
    CastSpeed,
    /// Melee/ranged haste, not affected by spell haste
    RealHaste,
}

impl TickHaste {
    pub fn is_hasted(&self) -> bool {
        !matches!(self, TickHaste::None)
    }
}
