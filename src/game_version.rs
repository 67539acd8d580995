//! The calendar-versioned osu! client build a replay was played on.
//!
//! osu!'s versioning scheme is a variant of [CalVer](https://calver.org/): a
//! release's version is the `YYYYMMDD` day it shipped. A `GameVersion` is
//! either [`GameVersion::Unknown`] (no information at all, not even an
//! estimate) or [`GameVersion::Known`], which additionally distinguishes
//! whether the version is the replay's *actual* build (`concrete`) or just
//! an estimate derived from other data.

use std::cmp::Ordering;

/// The osu! client version a replay was played on, if known.
///
/// Modeled as one enum with an `Unknown` variant rather than a base class
/// plus a "no version" subclass, since Rust has no use for inheritance to
/// express the absence of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GameVersion {
    /// No information about the version is available, not even an estimate.
    Unknown,
    /// A `YYYYMMDD` calendar version, either the replay's actual build
    /// (`concrete = true`) or an estimate of it (`concrete = false`).
    Known {
        /// The `YYYYMMDD` version number.
        version: u32,
        /// Whether `version` is known to be the exact build, as opposed to
        /// an estimate.
        concrete: bool,
    },
}

impl GameVersion {
    /// Whether any version information at all is available.
    pub fn available(&self) -> bool {
        !matches!(self, GameVersion::Unknown)
    }

    /// Whether this version is known to be exact, as opposed to an estimate.
    /// `Unknown` is neither.
    pub fn is_concrete(&self) -> bool {
        matches!(self, GameVersion::Known { concrete: true, .. })
    }

    /// The raw `YYYYMMDD` version number, if available.
    pub fn version(&self) -> Option<u32> {
        match self {
            GameVersion::Unknown => None,
            GameVersion::Known { version, .. } => Some(*version),
        }
    }
}

impl Default for GameVersion {
    fn default() -> Self {
        GameVersion::Unknown
    }
}

impl PartialOrd for GameVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.version(), other.version()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}
