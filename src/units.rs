//! Length units used by the tracker, templates and depth measurements.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// A length unit. Written to files as `"m"`, `"cm"` or `"mm"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    /// Metres
    M,
    /// Centimetres, what the tracker reports in metric mode.
    Cm,
    /// Millimetres
    Mm,
}

/// A unit name other than m, cm or mm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid unit {0:?}, expected m, cm or mm")]
pub struct InvalidUnit(pub String);

impl Unit {
    /// How many of this unit make up a metre.
    fn per_metre(self) -> f64 {
        match self {
            Unit::M => 1.0,
            Unit::Cm => 100.0,
            Unit::Mm => 1000.0,
        }
    }

    /// Factor that turns a length in `self` into a length in `target`.
    pub fn factor_to(self, target: Unit) -> f64 {
        target.per_metre() / self.per_metre()
    }

    /// Convert `value` from `self` into `target`.
    pub fn convert(self, value: f64, target: Unit) -> f64 {
        value * self.factor_to(target)
    }
}

impl FromStr for Unit {
    type Err = InvalidUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m" => Ok(Unit::M),
            "cm" => Ok(Unit::Cm),
            "mm" => Ok(Unit::Mm),
            other => Err(InvalidUnit(other.to_owned())),
        }
    }
}

impl TryFrom<String> for Unit {
    type Error = InvalidUnit;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.to_string()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::M => "m",
            Unit::Cm => "cm",
            Unit::Mm => "mm",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors() {
        assert_eq!(Unit::Cm.factor_to(Unit::M), 0.01);
        assert_eq!(Unit::M.factor_to(Unit::Mm), 1000.0);
        assert_eq!(Unit::Mm.factor_to(Unit::Cm), 0.1);
        assert_eq!(Unit::Cm.factor_to(Unit::Cm), 1.0);
        assert_eq!(Unit::Cm.convert(7.5, Unit::Mm), 75.0);
    }

    #[test]
    fn parses_and_rejects() {
        assert_eq!("mm".parse::<Unit>(), Ok(Unit::Mm));
        assert_eq!(" cm".parse::<Unit>(), Ok(Unit::Cm));
        assert!("inch".parse::<Unit>().is_err());
        assert_eq!(Unit::M.to_string(), "m");
    }

    #[test]
    fn reads_and_writes_quoted_names() {
        assert_eq!(ron::from_str::<Unit>("\"cm\"").unwrap(), Unit::Cm);
        assert_eq!(ron::to_string(&Unit::Mm).unwrap(), "\"mm\"");
        assert!(ron::from_str::<Unit>("\"ft\"").is_err());
    }
}
