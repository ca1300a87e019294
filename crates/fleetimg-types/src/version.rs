// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FleetImg.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Semantic image versions and upgrade classification

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{0}', expected X.Y.Z")]
pub struct VersionParseError(pub String);

/// Image version as a (major, minor, patch) triple.
///
/// Field order matters: the derived `Ord` compares major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// How far an available update moves away from the installed version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateClass {
    Major,
    Minor,
    Patch,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Total order over versions. Same as `Ord::cmp`, kept as a named entry point.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    /// Returns true if `candidate` is strictly newer than `self`
    pub fn is_older_than(&self, candidate: &Self) -> bool {
        candidate > self
    }

    /// Classify `candidate` as an update of `self`.
    ///
    /// Returns `None` unless `candidate > self`.
    pub fn classify(&self, candidate: &Self) -> Option<UpdateClass> {
        if candidate <= self {
            return None;
        }
        if candidate.major > self.major {
            return Some(UpdateClass::Major);
        }
        if candidate.minor > self.minor {
            return Some(UpdateClass::Minor);
        }
        Some(UpdateClass::Patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parse semver-like version strings (e.g., "1.2.3", "v1.2.3")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let mut parts = trimmed.split('.');

        let mut next = || -> Result<u32, VersionParseError> {
            parts
                .next()
                .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| VersionParseError(s.to_owned()))
        };

        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(VersionParseError(s.to_owned()));
        }
        Ok(version)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(v("0.2.38"), Version::new(0, 2, 38));
        assert_eq!(v("v0.2.38"), Version::new(0, 2, 38));
        assert_eq!(v("V1.0.0"), Version::new(1, 0, 0));
        assert_eq!(v("10.20.30"), Version::new(10, 20, 30));
    }

    #[test]
    fn test_parse_version_invalid() {
        assert!("invalid".parse::<Version>().is_err());
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
        assert!("1.-2.3".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn test_parse_version_single_prefix_only() {
        assert_eq!(v("V1.2.3"), Version::new(1, 2, 3));
        assert!("vV1.2.3".parse::<Version>().is_err());
        assert!("vv1.2.3".parse::<Version>().is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.9") < v("1.1.0"));
        assert!(v("1.9.9") < v("2.0.0"));
        assert!(v("0.10.0") > v("0.9.99"));
        assert_eq!(v("1.2.3").compare(&v("1.2.3")), Ordering::Equal);
        assert_eq!(v("2.0.0").compare(&v("1.99.99")), Ordering::Greater);
    }

    #[test]
    fn test_ordering_is_transitive_over_sample() {
        let mut versions = vec![
            v("2.0.0"),
            v("0.0.1"),
            v("1.1.0"),
            v("1.0.1"),
            v("1.0.0"),
            v("0.9.9"),
        ];
        versions.sort();
        for window in versions.windows(2) {
            assert!(window[0] < window[1]);
        }
        for a in &versions {
            for b in &versions {
                for c in &versions {
                    if a < b && b < c {
                        assert!(a < c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_classify() {
        let installed = v("1.0.0");
        assert_eq!(installed.classify(&v("2.0.0")), Some(UpdateClass::Major));
        assert_eq!(installed.classify(&v("1.1.0")), Some(UpdateClass::Minor));
        assert_eq!(installed.classify(&v("1.0.1")), Some(UpdateClass::Patch));
        assert_eq!(v("1.2.9").classify(&v("2.0.0")), Some(UpdateClass::Major));
        assert_eq!(v("1.2.9").classify(&v("1.3.0")), Some(UpdateClass::Minor));
    }

    #[test]
    fn test_classify_requires_newer_candidate() {
        let installed = v("1.1.0");
        assert_eq!(installed.classify(&v("1.1.0")), None);
        assert_eq!(installed.classify(&v("1.0.9")), None);
        assert_eq!(installed.classify(&v("0.9.0")), None);
        assert!(!installed.is_older_than(&v("1.1.0")));
        assert!(installed.is_older_than(&v("1.1.1")));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("1.2.3")).unwrap();
        assert_eq!(json, "\"1.2.3\"");
        let parsed: Version = serde_json::from_str("\"v3.0.1\"").unwrap();
        assert_eq!(parsed, Version::new(3, 0, 1));
        assert!(serde_json::from_str::<Version>("\"3.0\"").is_err());
    }
}
