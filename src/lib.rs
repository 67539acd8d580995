//! # circleguard
//!
//! `circleguard` analyses osu! replays for signs of cheating: replay
//! stealing (via [`similarity`]), aim assistance (via [`stats::ur`]), aim
//! correction (via [`snap`]), timewarp (via [`stats::frametime`]), and
//! per-hitobject judgment classification (via [`judgment`]).
//!
//! The crate is built leaves-first: small, independently testable types
//! ([`mods`], [`span`], [`game_version`], [`keys`]) compose into the replay
//! normalization pipeline ([`replay`]), which the analysis engines
//! ([`judgment`], [`snap`], [`similarity`], [`stats`]) consume. With the
//! `api` feature enabled, a [`loadable`] graph plus a [`loader`] and
//! [`cache`] can fetch and persist replay data from the osu! API v1, and
//! [`circleguard`] ties it all together behind a single façade.
//!
//! Parsing `.osu` beatmap files and decoding `.osr` replay file headers are
//! explicitly out of scope; see [`beatmap::Beatmap`] and
//! [`replay::RawReplayFrame`] for the narrow boundaries this crate expects
//! callers to cross.

#![deny(missing_docs)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate thiserror;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

pub(crate) mod float;

/// The osu! API v1 client boundary: a narrow `ApiClient` trait plus the
/// error taxonomy spec'd for its string-keyed error responses.
#[cfg(feature = "api")]
pub mod api;
/// A narrow beatmap view (hit objects, CS/OD/AR with EZ/HR scaling).
pub mod beatmap;
/// The persistent, lossily-compressed replay-data cache.
#[cfg(feature = "api")]
pub mod cache;
/// The top-level façade: `Circleguard` and `KeylessCircleguard`.
#[cfg(feature = "api")]
pub mod circleguard;
/// Gamemodes.
pub mod enums;
/// The calendar-versioned osu! client build a replay was played on.
pub mod game_version;
/// The narrow hitobject view the judgment and snap engines need.
pub mod hitobject;
/// Per-hitobject hit/miss classification: the notelock state machine.
pub mod judgment;
/// Keys/buttons held during a replay frame.
pub mod keys;
/// The two-phase (info -> data) loadable graph: `Map`, `User`, `MapUser`,
/// `ReplayMap`, `ReplayPath`, `ReplayString`, `ReplayID`, `ReplayDir`,
/// `ReplayCache`, `CachedReplay`.
#[cfg(feature = "api")]
pub mod loadable;
/// Composes an `ApiClient`, a `Cache`, and a `RateLimiter` to resolve
/// `ReplayInfo` and replay bytes.
#[cfg(feature = "api")]
pub mod loader;
/// Small geometric helpers shared by the snap detector and similarity engine.
pub mod math;
/// The osu! mod bitset.
pub mod mods;
/// The sliding-window gate in front of heavy API calls.
#[cfg(feature = "api")]
pub mod rate_limiter;
/// Raw replay frames, the negative-time normalization pipeline, and the
/// loaded-replay time series it produces.
pub mod replay;
/// Replay-pair comparison: HR-axis-flip fuzzing and the similarity/
/// correlation algorithms.
pub mod similarity;
/// Aim-correction ("snap") detection over consecutive cursor samples.
pub mod snap;
/// A comma-separated, range-expanding set of positive integers bounded to
/// `1..=100`.
pub mod span;
/// Unstable rate, frametime, and the `cv`/`ucv` statistic conversion.
pub mod stats;
/// How expensive a loadable's `load` call is against the remote API.
pub mod weight;

/// Exports the crate's common types.
pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::*;
    pub use crate::beatmap::*;
    #[cfg(feature = "api")]
    pub use crate::cache::*;
    #[cfg(feature = "api")]
    pub use crate::circleguard::*;
    pub use crate::enums::*;
    pub use crate::game_version::*;
    pub use crate::hitobject::*;
    pub use crate::judgment::*;
    pub use crate::keys::*;
    #[cfg(feature = "api")]
    pub use crate::loadable::*;
    #[cfg(feature = "api")]
    pub use crate::loader::*;
    pub use crate::math::*;
    pub use crate::mods::*;
    #[cfg(feature = "api")]
    pub use crate::rate_limiter::*;
    pub use crate::replay::*;
    pub use crate::similarity::*;
    pub use crate::snap::*;
    pub use crate::span::*;
    pub use crate::stats::*;
    pub use crate::weight::*;
}
