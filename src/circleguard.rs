//! The top-level façade (spec.md §4.8): `Circleguard` (API + cache backed)
//! and `KeylessCircleguard` (local files/cache only), each exposing the
//! load operations plus every analysis engine as a single convenient
//! surface that loads a [`ReplayLoadable`] lazily before running an
//! analysis on it.

use std::path::Path;

use crate::api::{ApiClient, OsuApiV1};
use crate::beatmap::Beatmap;
use crate::cache::Cache;
use crate::judgment::{Hit, Judgment};
use crate::loadable::{Loadable, LoadableError, LoadableResult, ReplayContainer, ReplayLoadable};
use crate::loader::{Loader, LoaderError};
use crate::replay::Replay;
use crate::similarity::{self, Method, ModsUnknown, SimilarityResult};
use crate::snap::{self, Snap};
use crate::stats;

pub use crate::similarity::{CORR_LIMIT, SIM_LIMIT};
pub use crate::snap::{DEFAULT_MAX_ANGLE, DEFAULT_MIN_DISTANCE};

/// The conventional default chunk count for [`similarity`](Circleguard::similarity)'s
/// [`Method::Correlation`].
pub const DEFAULT_NUM_CHUNKS: usize = 5;

/// Configuration for building a [`Circleguard`], mirroring the shape (not
/// the global-module-state pattern) of `circleguard.py`'s `config` module:
/// one value object passed to the constructor rather than settings mutated
/// on a shared singleton.
#[derive(Debug, Clone)]
pub struct CircleguardOptions {
    /// Path to the on-disk replay cache database.
    pub cache_path: std::path::PathBuf,
    /// Whether fetched replay data should be persisted to the cache.
    pub should_cache: bool,
    /// The osu! API v1 key. `None` means no network access is configured;
    /// build a [`KeylessCircleguard`] in that case instead of calling
    /// [`Circleguard::from_options`].
    pub api_key: Option<String>,
    /// How many Heavy (replay-fetching) calls may run per rate-limit window.
    pub burst: usize,
    /// The conventional [`Method::Similarity`] cheat threshold, carried here
    /// so a caller's own reporting can read it from one place rather than
    /// hardcoding [`SIM_LIMIT`].
    pub sim_limit: f64,
    /// The conventional [`Method::Correlation`] cheat threshold, same
    /// rationale as `sim_limit`.
    pub corr_limit: f64,
}

impl Default for CircleguardOptions {
    fn default() -> Self {
        CircleguardOptions {
            cache_path: std::path::PathBuf::from("cache.db"),
            should_cache: true,
            api_key: None,
            burst: 10,
            sim_limit: SIM_LIMIT,
            corr_limit: CORR_LIMIT,
        }
    }
}

/// `(replay1, replay2)` in the order they were played, earliest first.
///
/// Errors if either replay has no `timestamp` — timestamp-less replays
/// (e.g. one built from a bare `.osr` with no associated score row) can't
/// be ordered at all.
pub fn order(replay1: &Replay, replay2: &Replay) -> Result<(Replay, Replay), OrderError> {
    let (t1, t2) = match (replay1.timestamp, replay2.timestamp) {
        (Some(t1), Some(t2)) => (t1, t2),
        _ => return Err(OrderError::MissingTimestamp),
    };
    if t2 < t1 {
        Ok((replay2.clone(), replay1.clone()))
    } else {
        Ok((replay1.clone(), replay2.clone()))
    }
}

/// [`order`]'s error: both replays must carry a timestamp to be ordered.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OrderError {
    /// At least one of the two replays had no `timestamp`.
    #[error("both replays must provide a timestamp to be ordered")]
    MissingTimestamp,
}

/// Every pair of replays that should be run through [`Circleguard::similarity`]
/// to cover all cases of replay stealing within `replays` (and, if given,
/// between `replays` and `replays2`).
///
/// With no `replays2`, this is every distinct unordered pair within
/// `replays` (`C(n, 2)` pairs — equivalent to `itertools.combinations`).
/// With `replays2`, it's the full cross product: every replay in `replays`
/// paired with every replay in `replays2`, but not against other replays
/// in the same list.
pub fn replay_pairs<'a>(replays: &'a [Replay], replays2: Option<&'a [Replay]>) -> Vec<(&'a Replay, &'a Replay)> {
    match replays2 {
        None | Some(&[]) => {
            let mut pairs = Vec::new();
            for i in 0..replays.len() {
                for j in (i + 1)..replays.len() {
                    pairs.push((&replays[i], &replays[j]));
                }
            }
            pairs
        }
        Some(other) => {
            let mut pairs = Vec::with_capacity(replays.len() * other.len());
            for a in replays {
                for b in other {
                    pairs.push((a, b));
                }
            }
            pairs
        }
    }
}

/// Loads a replay not already loaded, then hands back its (now-loaded)
/// [`crate::replay::Replay`]. Panics only if `load` itself claimed success
/// without actually populating `replay`, which would be this module's own
/// bug rather than a caller error.
async fn load_and_borrow<'a>(
    loader: Option<&Loader>,
    cache: bool,
    replay: &'a mut ReplayLoadable,
) -> LoadableResult<&'a crate::replay::Replay> {
    replay.load(loader, cache).await?;
    Ok(replay
        .replay()
        .expect("Loadable::load returned Ok but left no replay data"))
}

/// The full façade: backed by a real osu! API key and an on-disk cache, so
/// every [`crate::loadable::Loadable`]/[`ReplayContainer`] variant can be
/// loaded.
pub struct Circleguard {
    loader: Loader,
}

impl Circleguard {
    /// Builds a façade around a real API key, opening (or creating) a
    /// cache database at `cache_path`. `burst` bounds how many Heavy
    /// (replay-fetching) calls may run per rate-limit window.
    pub fn new(
        api_key: impl Into<String>,
        cache_path: impl AsRef<Path>,
        should_cache: bool,
        burst: usize,
    ) -> LoadableResult<Circleguard> {
        let cache = Cache::open(cache_path, should_cache)?;
        let api: Box<dyn ApiClient> = Box::new(OsuApiV1::new(api_key.into()).map_err(LoaderError::from)?);
        Ok(Circleguard {
            loader: Loader::new(api, cache, burst),
        })
    }

    /// Builds a façade from a [`CircleguardOptions`] value. Errors with
    /// [`LoadableError::Loader(LoaderError::Keyless)`] if `options.api_key`
    /// is `None` — build a [`KeylessCircleguard`] instead for that case.
    pub fn from_options(options: CircleguardOptions) -> LoadableResult<Circleguard> {
        let api_key = options.api_key.ok_or(LoaderError::Keyless)?;
        Circleguard::new(api_key, options.cache_path, options.should_cache, options.burst)
    }

    /// Builds a façade around an already-constructed [`Loader`], for
    /// callers that built their own [`ApiClient`]/[`Cache`] pairing (e.g.
    /// tests, or an alternate `ApiClient` implementation).
    pub fn from_loader(loader: Loader) -> Circleguard {
        Circleguard { loader }
    }

    /// Loads a single [`Loadable`] (a pass-through to
    /// [`Loadable::load`]).
    pub async fn load<L: Loadable>(&self, loadable: &mut L, cache: bool) -> LoadableResult<()> {
        loadable.load(Some(&self.loader), cache).await
    }

    /// Resolves which replays a [`ReplayContainer`] represents, without
    /// loading their data (a pass-through to
    /// [`ReplayContainer::load_info`]).
    pub async fn load_info<C: ReplayContainer>(&self, container: &mut C) -> LoadableResult<()> {
        container.load_info(&self.loader).await
    }

    /// Compares two replays, loading either side that isn't loaded yet.
    pub async fn similarity(
        &self,
        r1: &mut ReplayLoadable,
        r2: &mut ReplayLoadable,
        method: Method,
        num_chunks: usize,
        mods_unknown: ModsUnknown,
    ) -> LoadableResult<SimilarityResult> {
        let replay1 = load_and_borrow(Some(&self.loader), false, r1).await?;
        let replay2 = load_and_borrow(Some(&self.loader), false, r2).await?;
        Ok(similarity::similarity(replay1, replay2, method, num_chunks, mods_unknown))
    }

    /// Compares two replays using [`DEFAULT_NUM_CHUNKS`] and
    /// [`ModsUnknown::Best`].
    pub async fn similarity_default(
        &self,
        r1: &mut ReplayLoadable,
        r2: &mut ReplayLoadable,
        method: Method,
    ) -> LoadableResult<f64> {
        let result = self
            .similarity(r1, r2, method, DEFAULT_NUM_CHUNKS, ModsUnknown::Best)
            .await?;
        Ok(result.value())
    }

    /// The unstable rate of a replay's aim.
    pub async fn ur(&self, r: &mut ReplayLoadable, beatmap: &Beatmap, adjusted: bool) -> LoadableResult<f64> {
        let replay = load_and_borrow(Some(&self.loader), false, r).await?;
        Ok(stats::ur(replay, beatmap, adjusted))
    }

    /// Every unusually sharp cursor turn in a replay.
    pub async fn snaps(
        &self,
        r: &mut ReplayLoadable,
        max_angle: f64,
        min_distance: f64,
        beatmap: Option<&Beatmap>,
    ) -> LoadableResult<Vec<Snap>> {
        let replay = load_and_borrow(Some(&self.loader), false, r).await?;
        Ok(snap::snaps(replay, max_angle, min_distance, beatmap))
    }

    /// [`Circleguard::snaps`] with [`DEFAULT_MAX_ANGLE`]/[`DEFAULT_MIN_DISTANCE`].
    pub async fn snaps_default(
        &self,
        r: &mut ReplayLoadable,
        beatmap: Option<&Beatmap>,
    ) -> LoadableResult<Vec<Snap>> {
        self.snaps(r, DEFAULT_MAX_ANGLE, DEFAULT_MIN_DISTANCE, beatmap).await
    }

    /// A replay's average frametime, ms.
    pub async fn frametime(&self, r: &mut ReplayLoadable) -> LoadableResult<f64> {
        let replay = load_and_borrow(Some(&self.loader), false, r).await?;
        Ok(stats::frametime(replay))
    }

    /// A replay's per-frame frametimes, ms.
    pub async fn frametimes(&self, r: &mut ReplayLoadable) -> LoadableResult<Vec<i64>> {
        let replay = load_and_borrow(Some(&self.loader), false, r).await?;
        Ok(stats::frametimes(replay))
    }

    /// Every hitobject a replay actually made contact with.
    pub async fn hits(&self, r: &mut ReplayLoadable, beatmap: &Beatmap) -> LoadableResult<Vec<Hit>> {
        let replay = load_and_borrow(Some(&self.loader), false, r).await?;
        Ok(crate::judgment::hits(replay, beatmap))
    }

    /// Per-hitobject hit/miss classification for a replay.
    pub async fn judgments(&self, r: &mut ReplayLoadable, beatmap: &Beatmap) -> LoadableResult<Vec<Judgment>> {
        let replay = load_and_borrow(Some(&self.loader), false, r).await?;
        Ok(crate::judgment::judgments(replay, beatmap))
    }
}

/// The restricted façade: backed only by a local cache (no API key), so
/// only loadables that don't require network access
/// ([`crate::loadable::ReplayPath`], [`crate::loadable::ReplayString`],
/// [`crate::loadable::CachedReplay`], [`crate::loadable::ReplayDir`],
/// [`crate::loadable::ReplayCache`]) can actually finish loading.
/// Attempting to load anything else surfaces
/// [`crate::loader::LoaderError::Keyless`], the same error a full
/// [`Circleguard`] would raise for a Heavy call with no API key
/// configured.
pub struct KeylessCircleguard {
    inner: Circleguard,
}

impl KeylessCircleguard {
    /// Builds a keyless façade from a [`CircleguardOptions`] value, ignoring
    /// `api_key` and `burst` (a keyless façade never performs a Heavy call).
    pub fn from_options(options: CircleguardOptions) -> LoadableResult<KeylessCircleguard> {
        let cache = Cache::open(options.cache_path, options.should_cache)?;
        Ok(KeylessCircleguard {
            inner: Circleguard {
                loader: Loader::keyless(cache),
            },
        })
    }

    /// Builds a keyless façade around a cache database at `cache_path`.
    pub fn new(cache_path: impl AsRef<Path>) -> LoadableResult<KeylessCircleguard> {
        let cache = Cache::open(cache_path, false)?;
        Ok(KeylessCircleguard {
            inner: Circleguard {
                loader: Loader::keyless(cache),
            },
        })
    }

    /// Builds a keyless façade around an in-memory cache, for callers that
    /// have no persistent cache to open (and don't need one, since a
    /// keyless façade never fetches anything cacheable from the API).
    pub fn in_memory() -> LoadableResult<KeylessCircleguard> {
        let cache = Cache::open_in_memory(false)?;
        Ok(KeylessCircleguard {
            inner: Circleguard {
                loader: Loader::keyless(cache),
            },
        })
    }

    /// See [`Circleguard::load`].
    pub async fn load<L: Loadable>(&self, loadable: &mut L, cache: bool) -> LoadableResult<()> {
        self.inner.load(loadable, cache).await
    }

    /// See [`Circleguard::load_info`].
    pub async fn load_info<C: ReplayContainer>(&self, container: &mut C) -> LoadableResult<()> {
        self.inner.load_info(container).await
    }

    /// See [`Circleguard::similarity`].
    pub async fn similarity(
        &self,
        r1: &mut ReplayLoadable,
        r2: &mut ReplayLoadable,
        method: Method,
        num_chunks: usize,
        mods_unknown: ModsUnknown,
    ) -> LoadableResult<SimilarityResult> {
        self.inner.similarity(r1, r2, method, num_chunks, mods_unknown).await
    }

    /// See [`Circleguard::ur`].
    pub async fn ur(&self, r: &mut ReplayLoadable, beatmap: &Beatmap, adjusted: bool) -> LoadableResult<f64> {
        self.inner.ur(r, beatmap, adjusted).await
    }

    /// See [`Circleguard::snaps`].
    pub async fn snaps(
        &self,
        r: &mut ReplayLoadable,
        max_angle: f64,
        min_distance: f64,
        beatmap: Option<&Beatmap>,
    ) -> LoadableResult<Vec<Snap>> {
        self.inner.snaps(r, max_angle, min_distance, beatmap).await
    }

    /// See [`Circleguard::frametime`].
    pub async fn frametime(&self, r: &mut ReplayLoadable) -> LoadableResult<f64> {
        self.inner.frametime(r).await
    }

    /// See [`Circleguard::frametimes`].
    pub async fn frametimes(&self, r: &mut ReplayLoadable) -> LoadableResult<Vec<i64>> {
        self.inner.frametimes(r).await
    }

    /// See [`Circleguard::hits`].
    pub async fn hits(&self, r: &mut ReplayLoadable, beatmap: &Beatmap) -> LoadableResult<Vec<Hit>> {
        self.inner.hits(r, beatmap).await
    }

    /// See [`Circleguard::judgments`].
    pub async fn judgments(&self, r: &mut ReplayLoadable, beatmap: &Beatmap) -> LoadableResult<Vec<Judgment>> {
        self.inner.judgments(r, beatmap).await
    }
}
