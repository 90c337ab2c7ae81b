//! Affinity declarations on compute descriptions.
//!
//! A description's `affinity` list holds entries of the form
//! `[!]name[:soft|:hard]`:
//!
//! - `db`: hard affinity toward instances of description `db`
//! - `db:soft`: soft affinity
//! - `!db`: hard anti-affinity
//! - `!db:soft`: soft anti-affinity

use std::fmt;
use std::str::FromStr;

use crate::error::{PlacementError, PlacementResult};

/// Marks an entry as anti-affinity.
pub const ANTI_AFFINITY_PREFIX: char = '!';

const SOFT_SUFFIX: &str = "soft";
const HARD_SUFFIX: &str = "hard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enforcement {
    /// Must hold; violating it fails placement.
    Hard,
    /// A preference that gives way rather than failing.
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffinityDirection {
    Affinity,
    AntiAffinity,
}

/// A typed affinity entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffinityConstraint {
    /// Name of another compute description.
    pub target_name: String,
    pub enforcement: Enforcement,
    pub direction: AffinityDirection,
}

impl AffinityConstraint {
    pub fn is_hard(&self) -> bool {
        self.enforcement == Enforcement::Hard
    }

    pub fn is_anti(&self) -> bool {
        self.direction == AffinityDirection::AntiAffinity
    }
}

impl FromStr for AffinityConstraint {
    type Err = PlacementError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let entry = raw.trim();
        let (direction, rest) = match entry.strip_prefix(ANTI_AFFINITY_PREFIX) {
            Some(rest) => (AffinityDirection::AntiAffinity, rest),
            None => (AffinityDirection::Affinity, entry),
        };

        // Only a trailing `soft`/`hard` is a marker; other colons belong to the name.
        let (name, enforcement) = match rest.rsplit_once(':') {
            Some((name, suffix)) if suffix.trim() == SOFT_SUFFIX => (name.trim(), Enforcement::Soft),
            Some((name, suffix)) if suffix.trim() == HARD_SUFFIX => (name.trim(), Enforcement::Hard),
            _ => (rest.trim(), Enforcement::Hard),
        };

        if name.is_empty() {
            return Err(PlacementError::InvalidConstraint(raw.to_string()));
        }

        Ok(Self {
            target_name: name.to_string(),
            enforcement,
            direction,
        })
    }
}

impl fmt::Display for AffinityConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anti() {
            write!(f, "{ANTI_AFFINITY_PREFIX}")?;
        }
        write!(f, "{}", self.target_name)?;
        if self.enforcement == Enforcement::Soft {
            write!(f, ":{SOFT_SUFFIX}")?;
        }
        Ok(())
    }
}

/// Parse every entry of an affinity list, preserving declaration order.
///
/// When the same target and direction is declared twice, the later entry
/// wins.
pub fn parse_constraints<S: AsRef<str>>(entries: &[S]) -> PlacementResult<Vec<AffinityConstraint>> {
    let mut constraints: Vec<AffinityConstraint> = Vec::with_capacity(entries.len());
    for entry in entries {
        let parsed: AffinityConstraint = entry.as_ref().parse()?;
        constraints.retain(|c| !(c.target_name == parsed.target_name && c.direction == parsed.direction));
        constraints.push(parsed);
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_is_hard_affinity() {
        let c: AffinityConstraint = "db".parse().unwrap();
        assert_eq!(c.target_name, "db");
        assert_eq!(c.enforcement, Enforcement::Hard);
        assert_eq!(c.direction, AffinityDirection::Affinity);
    }

    #[test]
    fn soft_suffix() {
        let c: AffinityConstraint = "db:soft".parse().unwrap();
        assert_eq!(c.enforcement, Enforcement::Soft);
        assert!(!c.is_anti());
    }

    #[test]
    fn anti_affinity_prefix_with_soft() {
        let c: AffinityConstraint = " !cache:soft ".parse().unwrap();
        assert_eq!(c.target_name, "cache");
        assert_eq!(c.enforcement, Enforcement::Soft);
        assert!(c.is_anti());
    }

    #[test]
    fn explicit_hard_suffix() {
        let c: AffinityConstraint = "!db:hard".parse().unwrap();
        assert!(c.is_hard());
        assert!(c.is_anti());
    }

    #[test]
    fn rejects_empty_name() {
        assert!("".parse::<AffinityConstraint>().is_err());
        assert!("!".parse::<AffinityConstraint>().is_err());
        assert!(matches!(
            " :soft".parse::<AffinityConstraint>(),
            Err(PlacementError::InvalidConstraint(s)) if s == " :soft"
        ));
    }

    #[test]
    fn colon_in_name_is_not_a_marker() {
        let c: AffinityConstraint = "db:v1".parse().unwrap();
        assert_eq!(c.target_name, "db:v1");
        assert!(c.is_hard());

        let c: AffinityConstraint = "!db:v1:soft".parse().unwrap();
        assert_eq!(c.target_name, "db:v1");
        assert_eq!(c.enforcement, Enforcement::Soft);
        assert_eq!(c.to_string(), "!db:v1:soft");
    }

    #[test]
    fn whitespace_around_marker() {
        let c: AffinityConstraint = "web: soft".parse().unwrap();
        assert_eq!(c.target_name, "web");
        assert_eq!(c.enforcement, Enforcement::Soft);

        let c: AffinityConstraint = "! web : hard".parse().unwrap();
        assert_eq!(c.target_name, "web");
        assert!(c.is_anti() && c.is_hard());
    }

    #[test]
    fn display_round_trips_markers() {
        for entry in ["db", "db:soft", "!db", "!db:soft"] {
            let c: AffinityConstraint = entry.parse().unwrap();
            assert_eq!(c.to_string(), entry);
        }
    }

    #[test]
    fn empty_list_has_no_constraints() {
        let empty: Vec<String> = Vec::new();
        assert!(parse_constraints(&empty).unwrap().is_empty());
    }

    #[test]
    fn later_duplicate_wins() {
        let parsed = parse_constraints(&["db", "!cache", "db:soft"]).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].target_name, "cache");
        assert_eq!(parsed[1].target_name, "db");
        assert_eq!(parsed[1].enforcement, Enforcement::Soft);
    }

    #[test]
    fn affinity_and_anti_affinity_to_same_target_coexist() {
        let parsed = parse_constraints(&["db", "!db"]).unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
