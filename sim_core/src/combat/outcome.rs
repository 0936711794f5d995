//! Outcome classification

use serde::Serialize;

/// Mutually exclusive result of one attack roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HitOutcome {
    Miss,
    Dodge,
    Parry,
    Block,
    Glance,
    Crit,
    Hit,
}

impl HitOutcome {
    /// The effect reached the target
    pub fn landed(self) -> bool {
        !matches!(self, HitOutcome::Miss | HitOutcome::Dodge | HitOutcome::Parry)
    }
}

/// Which rows of the attack table an effect rolls against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutcomeKind {
    /// Yellow melee: miss, dodge, parry, block, crit
    MeleeSpecial,
    /// Auto attacks: as melee specials, plus glancing blows
    MeleeWhite,
    Ranged,
    Spell,
    /// Crit only
    Periodic,
    /// Crit only
    Healing,
}

impl OutcomeKind {
    pub fn from_name(name: &str) -> Option<OutcomeKind> {
        let kind = match name {
            "melee_special" => OutcomeKind::MeleeSpecial,
            "melee_white" => OutcomeKind::MeleeWhite,
            "ranged" => OutcomeKind::Ranged,
            "spell" => OutcomeKind::Spell,
            "periodic" => OutcomeKind::Periodic,
            "healing" => OutcomeKind::Healing,
            _ => return None,
        };
        Some(kind)
    }
}

/// Probabilities in [0, 1] for each row; whatever is left over is a plain hit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OutcomeChances {
    pub miss: f64,
    pub dodge: f64,
    pub parry: f64,
    pub block: f64,
    pub glance: f64,
    pub crit: f64,
}

impl OutcomeChances {
    pub(crate) fn clamped(self) -> Self {
        let c = |v: f64| v.clamp(0.0, 1.0);
        OutcomeChances {
            miss: c(self.miss),
            dodge: c(self.dodge),
            parry: c(self.parry),
            block: c(self.block),
            glance: c(self.glance),
            crit: c(self.crit),
        }
    }

    /// Classify a uniform roll in [0, 1) with a single pass over the rows
    ///
    /// Rows are checked in the fixed order miss, dodge, parry, block, glance, crit.
    pub fn classify(&self, roll: f64) -> HitOutcome {
        let rows = [
            (self.miss, HitOutcome::Miss),
            (self.dodge, HitOutcome::Dodge),
            (self.parry, HitOutcome::Parry),
            (self.block, HitOutcome::Block),
            (self.glance, HitOutcome::Glance),
            (self.crit, HitOutcome::Crit),
        ];
        let mut threshold = 0.0;
        for (chance, outcome) in rows {
            threshold += chance;
            if roll < threshold {
                return outcome;
            }
        }
        HitOutcome::Hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> OutcomeChances {
        OutcomeChances {
            miss: 0.1,
            dodge: 0.1,
            parry: 0.1,
            block: 0.1,
            glance: 0.1,
            crit: 0.1,
        }
    }

    #[test]
    fn test_classify_order() {
        let chances = table();
        assert_eq!(chances.classify(0.0), HitOutcome::Miss);
        assert_eq!(chances.classify(0.15), HitOutcome::Dodge);
        assert_eq!(chances.classify(0.25), HitOutcome::Parry);
        assert_eq!(chances.classify(0.35), HitOutcome::Block);
        assert_eq!(chances.classify(0.45), HitOutcome::Glance);
        assert_eq!(chances.classify(0.55), HitOutcome::Crit);
        assert_eq!(chances.classify(0.65), HitOutcome::Hit);
    }

    #[test]
    fn test_empty_rows_are_skipped() {
        let chances = OutcomeChances {
            miss: 0.05,
            crit: 0.25,
            ..OutcomeChances::default()
        };
        assert_eq!(chances.classify(0.04), HitOutcome::Miss);
        assert_eq!(chances.classify(0.05), HitOutcome::Crit);
        assert_eq!(chances.classify(0.29), HitOutcome::Crit);
        assert_eq!(chances.classify(0.30), HitOutcome::Hit);
    }

    #[test]
    fn test_landed() {
        assert!(!HitOutcome::Miss.landed());
        assert!(!HitOutcome::Parry.landed());
        assert!(HitOutcome::Block.landed());
        assert!(HitOutcome::Glance.landed());
        assert!(HitOutcome::Hit.landed());
    }

    #[test]
    fn test_clamped_removes_negative_rows() {
        let chances = OutcomeChances {
            miss: -0.015,
            crit: 1.5,
            ..OutcomeChances::default()
        }
        .clamped();
        assert_eq!(chances.miss, 0.0);
        assert_eq!(chances.crit, 1.0);
        assert_eq!(chances.classify(0.0), HitOutcome::Crit);
    }

    #[test]
    fn test_outcome_kind_names() {
        assert_eq!(OutcomeKind::from_name("melee_white"), Some(OutcomeKind::MeleeWhite));
        assert_eq!(OutcomeKind::from_name("ranged"), Some(OutcomeKind::Ranged));
        assert_eq!(OutcomeKind::from_name("holy"), None);
    }

    proptest! {
        #[test]
        fn classify_matches_cumulative_thresholds(
            miss in 0.0f64..0.2,
            crit in 0.0f64..0.5,
            roll in 0.0f64..1.0
        ) {
            let chances = OutcomeChances { miss, crit, ..OutcomeChances::default() };
            let expected = if roll < miss {
                HitOutcome::Miss
            } else if roll < miss + crit {
                HitOutcome::Crit
            } else {
                HitOutcome::Hit
            };
            prop_assert_eq!(chances.classify(roll), expected);
        }
    }
}
