//! The two-phase (`Unloaded -> InfoLoaded -> Loaded`) loadable graph
//! (spec.md §4.7): containers that resolve which replays they represent
//! (`Map`, `User`, `MapUser`, `ReplayDir`, `ReplayCache`) and the replay
//! leaves themselves (`ReplayMap`, `ReplayPath`, `ReplayString`,
//! `ReplayID`, `CachedReplay`).
//!
//! `load`/`load_info` return a boxed future rather than being `async fn`s
//! in a trait, for the same object-safety reason as [`crate::api::ApiClient`].
//! Replay containers skip straight from `Unloaded` to `Loaded` internally
//! (there's no user-visible "partially info-loaded container" state), but
//! the two phases are still distinct operations callers can invoke
//! separately via [`ReplayContainer::load_info`] and [`Loadable::load`].

use std::fs;
use std::path::PathBuf;

use futures::future::BoxFuture;
use rand::seq::SliceRandom;

use crate::api::ApiError;
use crate::cache::{Cache, CacheError};
use crate::game_version::GameVersion;
use crate::loader::{Loader, LoaderError, ReplayEvents, ReplayInfo};
use crate::mods::Mods;
use crate::replay::{parse_osr, Replay, ReplayError};
use crate::span::Span;
use crate::weight::RatelimitWeight;

/// Errors surfaced while info-loading or loading a [`Loadable`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadableError {
    /// The loader (API/cache layer) failed.
    #[error("loader error: {0}")]
    Loader(#[from] LoaderError),
    /// A replay's bytes failed to parse.
    #[error("replay codec error: {0}")]
    Replay(#[from] ReplayError),
    /// The cache failed (used directly by `ReplayCache`/`CachedReplay`).
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    /// This loadable needs API access (a [`Loader`]) but none was given.
    #[error("{0} cannot be loaded without api access")]
    NoLoader(&'static str),
    /// Reading a local file failed.
    #[error("io error reading {path}: {source}")]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

/// Result type defaulting to [`LoadableError`].
pub type LoadableResult<T> = std::result::Result<T, LoadableError>;

/// Builds a [`Replay`] from metadata plus an optional frame stream.
/// `None` means "no data available" (a loaded-but-dataless replay, per
/// spec.md §3/§7), distinct from `Some(events)` whose frames are then
/// time-normalized as usual.
#[allow(clippy::too_many_arguments)]
fn build_replay(
    timestamp: Option<u64>,
    beatmap_id: Option<u32>,
    user_id: Option<u32>,
    username: Option<String>,
    mods: Option<Mods>,
    replay_id: Option<u64>,
    weight: RatelimitWeight,
    game_version: GameVersion,
    events: Option<ReplayEvents>,
) -> LoadableResult<Replay> {
    match events {
        None => Ok(Replay {
            timestamp,
            beatmap_id,
            user_id,
            username,
            mods,
            replay_id,
            weight,
            game_version,
            t: Vec::new(),
            xy: Vec::new(),
            k: Vec::new(),
        }),
        Some(events) => Ok(Replay::from_frames(
            timestamp,
            beatmap_id,
            user_id,
            username,
            mods,
            replay_id,
            weight,
            game_version,
            events.frames,
        )?),
    }
}

/// Something that can be loaded from some external source — the osu! API,
/// a local file, an already-downloaded byte string, or a cache row.
pub trait Loadable {
    /// Loads whatever data this loadable needs. Idempotent: a no-op if
    /// already loaded. `cache` is the cascaded caching preference from a
    /// parent container (or the façade); a loadable with its own explicit
    /// preference ignores this argument.
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>>;

    /// Whether [`Loadable::load`] has completed successfully.
    fn is_loaded(&self) -> bool;
}

/// A [`Loadable`] that holds zero or more [`Replay`]-shaped leaves,
/// resolved lazily in an info-load pass.
pub trait ReplayContainer: Loadable {
    /// Resolves which replays this container represents, without loading
    /// their data. Idempotent.
    fn load_info<'a>(&'a mut self, loader: &'a Loader) -> BoxFuture<'a, LoadableResult<()>>;

    /// The replays this container represents. Incomplete (likely empty)
    /// until [`ReplayContainer::load_info`] has run.
    fn all_replays(&self) -> &[ReplayLoadable];

    /// Mutable access to the same replays, for [`ReplayContainer::load`]'s
    /// default implementation to drive their individual loads.
    fn all_replays_mut(&mut self) -> &mut [ReplayLoadable];

    /// This container's own cache preference, cascaded to children that
    /// don't have one of their own.
    fn cache_preference(&self) -> Option<bool>;
}

/// `load_info` then `load` on every child, shared by every
/// [`ReplayContainer`] implementor (spec.md §9: "keep the retry loop/
/// cascade logic in one place").
async fn load_container<C: ReplayContainer>(
    container: &mut C,
    loader: Option<&Loader>,
    cache: bool,
) -> LoadableResult<()> {
    let cascade_cache = container.cache_preference().unwrap_or(cache);
    let loader = loader.ok_or(LoadableError::NoLoader("this container"))?;
    container.load_info(loader).await?;
    for replay in container.all_replays_mut() {
        replay.load(Some(loader), cascade_cache).await?;
    }
    Ok(())
}

/// A single-number [`Span`] selecting just the first row, used when a
/// loadable needs exactly one score and has no span of its own.
fn first_row_span() -> Span {
    Span::new([1]).expect("1 is within the valid span range")
}

// ---------------------------------------------------------------------
// Replay leaves
// ---------------------------------------------------------------------

/// A union of every leaf [`Loadable`] that represents a single replay,
/// used as the element type of a [`ReplayContainer`]'s replay list.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayLoadable {
    /// See [`ReplayMap`].
    Map(ReplayMap),
    /// See [`ReplayPath`].
    Path(ReplayPath),
    /// See [`ReplayString`].
    String(ReplayString),
    /// See [`ReplayID`].
    Id(ReplayID),
    /// See [`CachedReplay`].
    Cached(CachedReplay),
}

impl ReplayLoadable {
    /// The loaded [`Replay`], if this leaf has finished loading.
    pub fn replay(&self) -> Option<&Replay> {
        match self {
            ReplayLoadable::Map(r) => r.replay.as_ref(),
            ReplayLoadable::Path(r) => r.replay.as_ref(),
            ReplayLoadable::String(r) => r.replay.as_ref(),
            ReplayLoadable::Id(r) => r.replay.as_ref(),
            ReplayLoadable::Cached(r) => r.replay.as_ref(),
        }
    }
}

impl Loadable for ReplayLoadable {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        match self {
            ReplayLoadable::Map(r) => r.load(loader, cache),
            ReplayLoadable::Path(r) => r.load(loader, cache),
            ReplayLoadable::String(r) => r.load(loader, cache),
            ReplayLoadable::Id(r) => r.load(loader, cache),
            ReplayLoadable::Cached(r) => r.load(loader, cache),
        }
    }

    fn is_loaded(&self) -> bool {
        self.replay().is_some()
    }
}

/// A replay that was submitted to the online servers, identified by a
/// map/user pair rather than a replay id.
///
/// Equality (when unloaded, or when either side lacks data): by
/// `(beatmap_id, user_id, mods)`. When both sides are loaded with data:
/// by the normalized frame arrays.
#[derive(Debug, Clone)]
pub struct ReplayMap {
    /// The map this replay was played on.
    pub beatmap_id: u32,
    /// The player who played it.
    pub user_id: u32,
    /// If set, only the score with this exact mod combination is loaded;
    /// otherwise the user's highest-scoring play on the map.
    pub mods: Option<Mods>,
    /// This replay's own caching preference, if set.
    pub cache: Option<bool>,
    /// A pre-fetched info row, bypassing the `replay_info` lookup on load
    /// (how [`Map`]/[`User`]/[`MapUser`] construct their children).
    pub info: Option<ReplayInfo>,
    /// Populated once loaded.
    pub replay: Option<Replay>,
}

impl ReplayMap {
    /// Builds an unloaded replay map reference.
    pub fn new(beatmap_id: u32, user_id: u32, mods: Option<Mods>, cache: Option<bool>) -> ReplayMap {
        ReplayMap {
            beatmap_id,
            user_id,
            mods,
            cache,
            info: None,
            replay: None,
        }
    }

    fn from_info(info: ReplayInfo, cache: Option<bool>) -> ReplayMap {
        ReplayMap {
            beatmap_id: info.beatmap_id,
            user_id: info.user_id,
            mods: Some(info.mods),
            cache,
            info: Some(info),
            replay: None,
        }
    }
}

impl Loadable for ReplayMap {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.replay.is_some() {
                return Ok(());
            }
            let cache_flag = self.cache.unwrap_or(cache);
            let loader = loader.ok_or(LoadableError::NoLoader("ReplayMap"))?;

            let info = match self.info.clone() {
                Some(info) => info,
                None => {
                    let span = first_row_span();
                    let mut infos = loader
                        .replay_info(self.beatmap_id, Some(self.user_id), self.mods, &span)
                        .await?;
                    infos
                        .pop()
                        .ok_or_else(|| LoadableError::from(LoaderError::from(ApiError::NoInfoAvailable)))?
                }
            };

            let events = loader.replay_data(&info, cache_flag).await?;
            let replay = build_replay(
                Some(info.timestamp as u64),
                Some(info.beatmap_id),
                Some(info.user_id),
                info.username.clone(),
                Some(info.mods),
                info.replay_id,
                RatelimitWeight::Heavy,
                GameVersion::Unknown,
                events,
            )?;
            self.info = Some(info);
            self.replay = Some(replay);
            Ok(())
        })
    }

    fn is_loaded(&self) -> bool {
        self.replay.is_some()
    }
}

impl PartialEq for ReplayMap {
    fn eq(&self, other: &Self) -> bool {
        match (&self.replay, &other.replay) {
            (Some(a), Some(b)) if a.has_data() && b.has_data() => a.t == b.t && a.xy == b.xy && a.k == b.k,
            _ => self.beatmap_id == other.beatmap_id && self.user_id == other.user_id && self.mods == other.mods,
        }
    }
}

/// A replay saved locally in an `.osr` file.
///
/// Equality: by path when either side has no data, by the normalized
/// frame arrays when both do.
#[derive(Debug, Clone)]
pub struct ReplayPath {
    /// The file's path.
    pub path: PathBuf,
    /// This replay's own caching preference. Currently unused: `.osr`-
    /// sourced replays aren't written back to the cache.
    pub cache: Option<bool>,
    /// Populated once loaded.
    pub replay: Option<Replay>,
}

impl ReplayPath {
    /// Builds an unloaded reference to a local `.osr` file.
    pub fn new(path: impl Into<PathBuf>, cache: Option<bool>) -> ReplayPath {
        ReplayPath {
            path: path.into(),
            cache,
            replay: None,
        }
    }
}

impl Loadable for ReplayPath {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, _cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.replay.is_some() {
                return Ok(());
            }
            let bytes = fs::read(&self.path).map_err(|source| LoadableError::Io {
                path: self.path.clone(),
                source,
            })?;
            self.replay = Some(load_from_osr_bytes(&bytes, loader)?);
            Ok(())
        })
    }

    fn is_loaded(&self) -> bool {
        self.replay.is_some()
    }
}

impl PartialEq for ReplayPath {
    fn eq(&self, other: &Self) -> bool {
        match (&self.replay, &other.replay) {
            (Some(a), Some(b)) if a.has_data() && b.has_data() => a.t == b.t && a.xy == b.xy && a.k == b.k,
            _ => self.path == other.path,
        }
    }
}

/// A replay saved in the `.osr` format, already read into memory as bytes
/// rather than sitting in a file.
///
/// Equality: by the raw bytes.
#[derive(Debug, Clone)]
pub struct ReplayString {
    /// The `.osr` file's raw bytes.
    pub data: Vec<u8>,
    /// This replay's own caching preference. Currently unused, matching
    /// [`ReplayPath`].
    pub cache: Option<bool>,
    /// Populated once loaded.
    pub replay: Option<Replay>,
}

impl ReplayString {
    /// Builds an unloaded reference to in-memory `.osr` bytes.
    pub fn new(data: Vec<u8>, cache: Option<bool>) -> ReplayString {
        ReplayString {
            data,
            cache,
            replay: None,
        }
    }
}

impl Loadable for ReplayString {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, _cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.replay.is_some() {
                return Ok(());
            }
            self.replay = Some(load_from_osr_bytes(&self.data, loader)?);
            Ok(())
        })
    }

    fn is_loaded(&self) -> bool {
        self.replay.is_some()
    }
}

impl PartialEq for ReplayString {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

/// Parses an `.osr` byte string into a loaded [`Replay`]. `loader`, when
/// given, resolves `beatmap_id`/`user_id` via the beatmap-hash/username
/// the header carries; without one they're left unknown, matching the
/// "keyless" façade's behavior (spec.md §6's environment note).
fn load_from_osr_bytes(bytes: &[u8], loader: Option<&Loader>) -> LoadableResult<Replay> {
    let raw = parse_osr(bytes)?;
    let beatmap_id = loader.and_then(|l| l.beatmap_id(&raw.beatmap_hash));
    let user_id = loader.and_then(|l| l.user_id(&raw.username));
    let mut replay = Replay::from_raw(raw, RatelimitWeight::Light)?;
    replay.beatmap_id = beatmap_id;
    replay.user_id = user_id.or(replay.user_id);
    Ok(replay)
}

/// A replay identified only by its unique online id. Post-load, only
/// `replay_data` (via the analysis functions) is meaningfully available —
/// the API offers no info lookup keyed on a bare replay id.
///
/// Equality: by `replay_id`.
#[derive(Debug, Clone)]
pub struct ReplayID {
    /// The replay's unique online id.
    pub replay_id: u64,
    /// This replay's own caching preference.
    pub cache: Option<bool>,
    /// Populated once loaded.
    pub replay: Option<Replay>,
}

impl ReplayID {
    /// Builds an unloaded reference to a replay by its online id.
    pub fn new(replay_id: u64, cache: Option<bool>) -> ReplayID {
        ReplayID {
            replay_id,
            cache,
            replay: None,
        }
    }
}

impl Loadable for ReplayID {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.replay.is_some() {
                return Ok(());
            }
            let cache_flag = self.cache.unwrap_or(cache);
            let loader = loader.ok_or(LoadableError::NoLoader("ReplayID"))?;
            let events = loader.replay_data_by_id(self.replay_id, cache_flag).await?;
            let replay = build_replay(
                None,
                None,
                None,
                None,
                None,
                Some(self.replay_id),
                RatelimitWeight::Heavy,
                GameVersion::Unknown,
                Some(events),
            )?;
            self.replay = Some(replay);
            Ok(())
        })
    }

    fn is_loaded(&self) -> bool {
        self.replay.is_some()
    }
}

impl PartialEq for ReplayID {
    fn eq(&self, other: &Self) -> bool {
        self.replay_id == other.replay_id
    }
}

/// A replay constructed directly from a [`crate::cache::Cache`] row,
/// produced by [`ReplayCache::load_info`] and not meant to be built by
/// hand.
///
/// Equality: by `replay_id`.
#[derive(Debug, Clone)]
pub struct CachedReplay {
    /// The player who set this score.
    pub user_id: u32,
    /// The map this score was set on.
    pub beatmap_id: u32,
    /// The mods this score was set with.
    pub mods: Mods,
    /// The still lossily-compressed action data read from the cache.
    pub compressed_data: Vec<u8>,
    /// This replay's unique id.
    pub replay_id: u64,
    /// Populated once loaded.
    pub replay: Option<Replay>,
}

impl Loadable for CachedReplay {
    fn load<'a>(&'a mut self, _loader: Option<&'a Loader>, _cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.replay.is_some() {
                return Ok(());
            }
            let text = crate::replay::lzma_decompress(&self.compressed_data)?;
            let text = String::from_utf8(text).map_err(ReplayError::from)?;
            let (frames, rng_seed) = crate::replay::parse_frames(&text)?;
            let replay = build_replay(
                None,
                Some(self.beatmap_id),
                Some(self.user_id),
                None,
                Some(self.mods),
                Some(self.replay_id),
                RatelimitWeight::None,
                GameVersion::Unknown,
                Some(ReplayEvents { frames, rng_seed }),
            )?;
            self.replay = Some(replay);
            Ok(())
        })
    }

    fn is_loaded(&self) -> bool {
        self.replay.is_some()
    }
}

impl PartialEq for CachedReplay {
    fn eq(&self, other: &Self) -> bool {
        self.replay_id == other.replay_id
    }
}

// ---------------------------------------------------------------------
// Replay containers
// ---------------------------------------------------------------------

/// A map's top plays (the website leaderboard), restricted to the rows
/// selected by `span` (and, if set, `mods`).
///
/// Equality: by `(beatmap_id, mods, span)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    /// The map whose leaderboard this represents.
    pub beatmap_id: u32,
    /// Which leaderboard rows to keep.
    pub span: Span,
    /// If set, only this exact mod combination's row(s).
    pub mods: Option<Mods>,
    cache: Option<bool>,
    info_loaded: bool,
    replays: Vec<ReplayLoadable>,
}

impl Map {
    /// Builds an un-info-loaded map leaderboard reference.
    pub fn new(beatmap_id: u32, span: Span, mods: Option<Mods>, cache: Option<bool>) -> Map {
        Map {
            beatmap_id,
            span,
            mods,
            cache,
            info_loaded: false,
            replays: Vec::new(),
        }
    }
}

impl Loadable for Map {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(load_container(self, loader, cache))
    }

    fn is_loaded(&self) -> bool {
        self.info_loaded && self.replays.iter().all(|r| r.is_loaded())
    }
}

impl ReplayContainer for Map {
    fn load_info<'a>(&'a mut self, loader: &'a Loader) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.info_loaded {
                return Ok(());
            }
            let infos = loader
                .replay_info(self.beatmap_id, None, self.mods, &self.span)
                .await?;
            self.replays = infos
                .into_iter()
                .map(|info| ReplayLoadable::Map(ReplayMap::from_info(info, self.cache)))
                .collect();
            self.info_loaded = true;
            Ok(())
        })
    }

    fn all_replays(&self) -> &[ReplayLoadable] {
        &self.replays
    }

    fn all_replays_mut(&mut self) -> &mut [ReplayLoadable] {
        &mut self.replays
    }

    fn cache_preference(&self) -> Option<bool> {
        self.cache
    }
}

/// A user's top plays (pp-wise), restricted to the rows selected by
/// `span` (and, if set, `mods`), optionally filtered to plays with a
/// downloadable replay.
///
/// Equality: by `(user_id, mods, span)`.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user whose top plays this represents.
    pub user_id: u32,
    /// Which rows of the top-plays list to keep.
    pub span: Span,
    /// If set, only rows with this exact mod combination.
    pub mods: Option<Mods>,
    /// Whether to drop rows with no downloadable replay.
    pub available_only: bool,
    cache: Option<bool>,
    info_loaded: bool,
    replays: Vec<ReplayLoadable>,
}

impl User {
    /// Builds an un-info-loaded user top-plays reference.
    pub fn new(
        user_id: u32,
        span: Span,
        mods: Option<Mods>,
        cache: Option<bool>,
        available_only: bool,
    ) -> User {
        User {
            user_id,
            span,
            mods,
            available_only,
            cache,
            info_loaded: false,
            replays: Vec::new(),
        }
    }
}

impl Loadable for User {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(load_container(self, loader, cache))
    }

    fn is_loaded(&self) -> bool {
        self.info_loaded && self.replays.iter().all(|r| r.is_loaded())
    }
}

impl ReplayContainer for User {
    fn load_info<'a>(&'a mut self, loader: &'a Loader) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.info_loaded {
                return Ok(());
            }
            // the username isn't always present on a `get_user_best` row; stamp
            // it on explicitly, the way upstream's `User.load_info` does.
            let username = loader.username(self.user_id).await.ok();
            let limit = self.span.iter().copied().max().unwrap_or(1).max(1);
            let mut infos = loader.user_best(self.user_id, limit).await?;
            if let Some(mods) = self.mods {
                infos.retain(|info| info.mods == mods);
            }
            let infos: Vec<ReplayInfo> = infos
                .into_iter()
                .enumerate()
                .filter(|(i, _)| self.span.contains(*i as u32 + 1))
                .filter(|(_, info)| !self.available_only || info.replay_available)
                .map(|(_, mut info)| {
                    if info.username.is_none() {
                        info.username = username.clone();
                    }
                    info
                })
                .collect();
            self.replays = infos
                .into_iter()
                .map(|info| ReplayLoadable::Map(ReplayMap::from_info(info, self.cache)))
                .collect();
            self.info_loaded = true;
            Ok(())
        })
    }

    fn all_replays(&self) -> &[ReplayLoadable] {
        &self.replays
    }

    fn all_replays_mut(&mut self) -> &mut [ReplayLoadable] {
        &mut self.replays
    }

    fn cache_preference(&self) -> Option<bool> {
        self.cache
    }
}

/// All of one user's scores on a map (not just their best), restricted to
/// `span`, optionally filtered to plays with a downloadable replay.
///
/// Equality: by `(beatmap_id, user_id, span)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapUser {
    /// The map these scores were set on.
    pub beatmap_id: u32,
    /// The user whose scores on the map this represents.
    pub user_id: u32,
    /// Which of the user's scores on the map to keep.
    pub span: Span,
    /// Whether to drop rows with no downloadable replay.
    pub available_only: bool,
    cache: Option<bool>,
    info_loaded: bool,
    replays: Vec<ReplayLoadable>,
}

impl MapUser {
    /// Builds an un-info-loaded map/user reference, defaulting `span` to
    /// [`crate::loader::MAX_MAP_SPAN`] ("1-100") like upstream.
    pub fn new(beatmap_id: u32, user_id: u32, span: Option<Span>, cache: Option<bool>, available_only: bool) -> MapUser {
        MapUser {
            beatmap_id,
            user_id,
            span: span.unwrap_or_else(|| {
                crate::loader::MAX_MAP_SPAN
                    .parse()
                    .expect("MAX_MAP_SPAN is a valid span literal")
            }),
            available_only,
            cache,
            info_loaded: false,
            replays: Vec::new(),
        }
    }
}

impl Loadable for MapUser {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(load_container(self, loader, cache))
    }

    fn is_loaded(&self) -> bool {
        self.info_loaded && self.replays.iter().all(|r| r.is_loaded())
    }
}

impl ReplayContainer for MapUser {
    fn load_info<'a>(&'a mut self, loader: &'a Loader) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.info_loaded {
                return Ok(());
            }
            let infos = loader
                .replay_info(self.beatmap_id, Some(self.user_id), None, &self.span)
                .await?;
            self.replays = infos
                .into_iter()
                .filter(|info| !self.available_only || info.replay_available)
                .map(|info| ReplayLoadable::Map(ReplayMap::from_info(info, self.cache)))
                .collect();
            self.info_loaded = true;
            Ok(())
        })
    }

    fn all_replays(&self) -> &[ReplayLoadable] {
        &self.replays
    }

    fn all_replays_mut(&mut self) -> &mut [ReplayLoadable] {
        &mut self.replays
    }

    fn cache_preference(&self) -> Option<bool> {
        self.cache
    }
}

/// A folder of `.osr` files, scanned non-recursively.
///
/// Equality: by directory path.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayDir {
    /// The folder to scan.
    pub dir_path: PathBuf,
    cache: Option<bool>,
    info_loaded: bool,
    replays: Vec<ReplayLoadable>,
}

impl ReplayDir {
    /// Builds an un-info-loaded directory reference. Fails fast if
    /// `dir_path` isn't a directory.
    pub fn new(dir_path: impl Into<PathBuf>, cache: Option<bool>) -> LoadableResult<ReplayDir> {
        let dir_path = dir_path.into();
        if !dir_path.is_dir() {
            return Err(LoadableError::Io {
                path: dir_path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        Ok(ReplayDir {
            dir_path,
            cache,
            info_loaded: false,
            replays: Vec::new(),
        })
    }
}

impl Loadable for ReplayDir {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(load_container(self, loader, cache))
    }

    fn is_loaded(&self) -> bool {
        self.info_loaded && self.replays.iter().all(|r| r.is_loaded())
    }
}

impl ReplayContainer for ReplayDir {
    fn load_info<'a>(&'a mut self, _loader: &'a Loader) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.info_loaded {
                return Ok(());
            }
            let entries = fs::read_dir(&self.dir_path).map_err(|source| LoadableError::Io {
                path: self.dir_path.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| LoadableError::Io {
                    path: self.dir_path.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("osr") {
                    self.replays
                        .push(ReplayLoadable::Path(ReplayPath::new(path, self.cache)));
                }
            }
            self.info_loaded = true;
            Ok(())
        })
    }

    fn all_replays(&self) -> &[ReplayLoadable] {
        &self.replays
    }

    fn all_replays_mut(&mut self) -> &mut [ReplayLoadable] {
        &mut self.replays
    }

    fn cache_preference(&self) -> Option<bool> {
        self.cache
    }
}

/// Replays sampled from a [`Cache`] database: `num_maps` distinct maps
/// chosen uniformly at random, then up to `num_maps * num_replays` rows
/// drawn from those maps.
///
/// Never caches further (replays loaded from a cache are already there).
///
/// Equality: by the backing database's path.
pub struct ReplayCache {
    /// The backing cache database's path (for equality; the open
    /// connection itself lives in `db`).
    pub path: PathBuf,
    /// How many distinct maps to sample from.
    pub num_maps: usize,
    /// How many replays to sample per map (the effective overall limit is
    /// `num_maps * num_replays`).
    pub num_replays: usize,
    db: Cache,
    info_loaded: bool,
    replays: Vec<ReplayLoadable>,
}

impl ReplayCache {
    /// Opens `path` as a cache database to sample from.
    pub fn open(path: impl Into<PathBuf>, num_maps: usize, num_replays: usize) -> LoadableResult<ReplayCache> {
        let path = path.into();
        let db = Cache::open(&path, false)?;
        Ok(ReplayCache {
            path,
            num_maps,
            num_replays,
            db,
            info_loaded: false,
            replays: Vec::new(),
        })
    }
}

impl std::fmt::Debug for ReplayCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayCache")
            .field("path", &self.path)
            .field("num_maps", &self.num_maps)
            .field("num_replays", &self.num_replays)
            .finish()
    }
}

impl PartialEq for ReplayCache {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Loadable for ReplayCache {
    fn load<'a>(&'a mut self, loader: Option<&'a Loader>, cache: bool) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(load_container(self, loader, cache))
    }

    fn is_loaded(&self) -> bool {
        self.info_loaded && self.replays.iter().all(|r| r.is_loaded())
    }
}

impl ReplayContainer for ReplayCache {
    fn load_info<'a>(&'a mut self, _loader: &'a Loader) -> BoxFuture<'a, LoadableResult<()>> {
        Box::pin(async move {
            if self.info_loaded {
                return Ok(());
            }
            let map_ids = self.db.distinct_beatmap_ids()?;
            let mut rng = rand::thread_rng();
            let chosen: Vec<u32> = map_ids
                .choose_multiple(&mut rng, self.num_maps.min(map_ids.len()))
                .copied()
                .collect();
            let limit = self.num_maps * self.num_replays;
            let rows = self.db.rows_for_beatmaps(&chosen, limit)?;
            self.replays = rows
                .into_iter()
                .map(|row| {
                    ReplayLoadable::Cached(CachedReplay {
                        user_id: row.user_id,
                        beatmap_id: row.beatmap_id,
                        mods: row.mods,
                        compressed_data: row.replay_data,
                        replay_id: row.replay_id,
                        replay: None,
                    })
                })
                .collect();
            self.info_loaded = true;
            Ok(())
        })
    }

    fn all_replays(&self) -> &[ReplayLoadable] {
        &self.replays
    }

    fn all_replays_mut(&mut self) -> &mut [ReplayLoadable] {
        &mut self.replays
    }

    fn cache_preference(&self) -> Option<bool> {
        Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_map_equality_falls_back_to_identity_when_unloaded() {
        let a = ReplayMap::new(1, 2, Some(Mods::HD), None);
        let b = ReplayMap::new(1, 2, Some(Mods::HD), None);
        let c = ReplayMap::new(1, 3, Some(Mods::HD), None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn replay_path_equality_falls_back_to_path_when_unloaded() {
        let a = ReplayPath::new("./1.osr", None);
        let b = ReplayPath::new("./1.osr", None);
        let c = ReplayPath::new("./2.osr", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn replay_string_equality_is_by_bytes() {
        let a = ReplayString::new(vec![1, 2, 3], None);
        let b = ReplayString::new(vec![1, 2, 3], None);
        let c = ReplayString::new(vec![4, 5, 6], None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn replay_id_equality_is_by_id() {
        let a = ReplayID::new(42, None);
        let b = ReplayID::new(42, None);
        let c = ReplayID::new(43, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn replay_dir_rejects_a_non_directory() {
        let result = ReplayDir::new("/does/not/exist/at/all", None);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn replay_path_without_a_loader_leaves_ids_unknown() {
        let dir = tempdir_with_minimal_osr();
        let mut replay_path = ReplayPath::new(dir.clone(), None);
        replay_path.load(None, false).await.unwrap();
        let replay = replay_path.replay.as_ref().unwrap();
        assert!(replay.beatmap_id.is_none());
        let _ = fs::remove_file(&dir);
    }

    fn tempdir_with_minimal_osr() -> PathBuf {
        fn write_uleb128_string(out: &mut Vec<u8>, s: &str) {
            if s.is_empty() {
                out.push(0x00);
                return;
            }
            out.push(0x0b);
            let mut len = s.len() as u64;
            loop {
                let mut byte = (len & 0b0111_1111) as u8;
                len >>= 7;
                if len != 0 {
                    byte |= 0b1000_0000;
                }
                out.push(byte);
                if len == 0 {
                    break;
                }
            }
            out.extend_from_slice(s.as_bytes());
        }

        let mut bytes = Vec::new();
        bytes.push(0u8);
        bytes.extend_from_slice(&20210101u32.to_le_bytes());
        write_uleb128_string(&mut bytes, "hash");
        write_uleb128_string(&mut bytes, "tybug");
        write_uleb128_string(&mut bytes, "replayhash");
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        write_uleb128_string(&mut bytes, "");
        bytes.extend_from_slice(&621_355_968_000_000_000u64.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());

        let path = std::env::temp_dir().join(format!("circleguard-test-{}.osr", std::process::id()));
        fs::write(&path, bytes).unwrap();
        path
    }
}
