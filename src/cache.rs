//! The persistent, lossily-compressed replay-data cache (spec.md §4.5, §6):
//! a single-file SQLite store keyed by replay id.
//!
//! Compression is intentionally lossy: cached cursor coordinates are
//! rounded to the nearest osu!pixel before being re-compressed, trading a
//! little precision (irrelevant to this crate's analyses, which already
//! clip/interpolate at whole-pixel granularity) for a much smaller on-disk
//! footprint than storing the original replay bytes untouched.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::mods::Mods;
use crate::replay::{lzma_compress, lzma_decompress, parse_frames, RawReplayFrame, ReplayError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS REPLAYS(
  MAP_ID INTEGER NOT NULL,
  USER_ID INTEGER NOT NULL,
  REPLAY_DATA BLOB NOT NULL,
  REPLAY_ID INTEGER NOT NULL PRIMARY KEY,
  MODS INTEGER NOT NULL);
CREATE INDEX IF NOT EXISTS lookup_index ON REPLAYS(MAP_ID, USER_ID, MODS);
";

/// Errors raised by cache I/O or by the lossy replay-data codec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The underlying SQLite store failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The cached (or about-to-be-cached) replay bytes didn't decode.
    #[error("replay codec error: {0}")]
    Replay(#[from] ReplayError),
    /// The decompressed action-data wasn't valid UTF-8.
    #[error("invalid utf8 in cached replay data: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type defaulting to [`CacheError`].
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A raw row read back out of the cache, still lossily-compressed.
#[derive(Debug, Clone)]
pub struct CachedRow {
    /// The score-setter's user id.
    pub user_id: u32,
    /// The map this score was set on.
    pub beatmap_id: u32,
    /// The mods this score was set with.
    pub mods: Mods,
    /// The lossily-compressed ("pure LZMA") replay data.
    pub replay_data: Vec<u8>,
    /// This replay's unique id.
    pub replay_id: u64,
}

/// A single-file SQLite-backed cache of replay data, keyed by replay id.
///
/// All mutations go through one mutex (spec.md §5); reads take the same
/// lock today since `rusqlite::Connection` isn't `Sync`, but don't hold it
/// across any I/O beyond the query itself.
pub struct Cache {
    conn: Mutex<Connection>,
    should_cache: bool,
}

impl Cache {
    /// Opens (creating if necessary) a cache file at `path`. `should_cache`
    /// mirrors the constructor option of spec.md §4.5: when false,
    /// [`Cache::put`] becomes a no-op, while [`Cache::check`] still serves
    /// whatever is already on disk.
    pub fn open(path: impl AsRef<Path>, should_cache: bool) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        let cache = Cache {
            conn: Mutex::new(conn),
            should_cache,
        };
        cache.create_if_missing()?;
        Ok(cache)
    }

    /// An in-memory cache, useful for tests and for a keyless/no-disk
    /// configuration that still wants `Cache`'s interface.
    pub fn open_in_memory(should_cache: bool) -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Cache {
            conn: Mutex::new(conn),
            should_cache,
        };
        cache.create_if_missing()?;
        Ok(cache)
    }

    /// Ensures the `REPLAYS` table and its `(MAP_ID, USER_ID, MODS)` lookup
    /// index exist.
    pub fn create_if_missing(&self) -> CacheResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Whether [`Cache::put`] persists anything (construction-time option).
    pub fn should_cache(&self) -> bool {
        self.should_cache
    }

    /// Looks up a replay by id, returning the cached (still lossily-
    /// compressed, "pure LZMA") bytes if present.
    pub fn check(&self, replay_id: u64) -> CacheResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT REPLAY_DATA FROM REPLAYS WHERE REPLAY_ID = ?1")?;
        let mut rows = stmt.query(params![replay_id as i64])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// All distinct beatmap ids with at least one cached replay, used by
    /// [`crate::loadable::ReplayCache`] to sample maps at random.
    pub fn distinct_beatmap_ids(&self) -> CacheResult<Vec<u32>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT MAP_ID FROM REPLAYS")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(|v| v as u32))
            .collect::<rusqlite::Result<Vec<u32>>>()?;
        Ok(ids)
    }

    /// Up to `limit` cached rows whose `MAP_ID` is one of `beatmap_ids`.
    pub fn rows_for_beatmaps(&self, beatmap_ids: &[u32], limit: usize) -> CacheResult<Vec<CachedRow>> {
        if beatmap_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = beatmap_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT USER_ID, MAP_ID, MODS, REPLAY_DATA, REPLAY_ID FROM REPLAYS \
             WHERE MAP_ID IN ({placeholders}) LIMIT ?"
        );
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let mut params: Vec<&dyn rusqlite::ToSql> = beatmap_ids
            .iter()
            .map(|id| id as &dyn rusqlite::ToSql)
            .collect();
        let limit = limit as i64;
        params.push(&limit);
        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok(CachedRow {
                    user_id: row.get::<_, i64>(0)? as u32,
                    beatmap_id: row.get::<_, i64>(1)? as u32,
                    mods: Mods::from_bits_truncate(row.get::<_, i64>(2)? as u32),
                    replay_data: row.get(3)?,
                    replay_id: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<CachedRow>>>()?;
        Ok(rows)
    }

    /// Stores (replacing on conflict) a replay's data, keyed by
    /// `replay_id`. `lzma_bytes` is the replay's original, full-precision
    /// pure-LZMA action-data stream (as decoded straight from an `.osr` or
    /// a `get_replay` response); it's lossily recompressed before being
    /// written. A no-op if this cache was constructed with
    /// `should_cache = false`.
    pub fn put(
        &self,
        replay_id: u64,
        beatmap_id: u32,
        user_id: u32,
        mods: Mods,
        lzma_bytes: &[u8],
    ) -> CacheResult<()> {
        if !self.should_cache {
            return Ok(());
        }
        let compressed = wtc_compress(lzma_bytes)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO REPLAYS (MAP_ID, USER_ID, REPLAY_DATA, REPLAY_ID, MODS)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(REPLAY_ID) DO UPDATE SET
               MAP_ID = excluded.MAP_ID,
               USER_ID = excluded.USER_ID,
               REPLAY_DATA = excluded.REPLAY_DATA,
               MODS = excluded.MODS",
            params![beatmap_id, user_id, compressed, replay_id as i64, mods.bits()],
        )?;
        Ok(())
    }
}

/// Re-compresses a pure-LZMA action-data stream after rounding every
/// cursor coordinate to the nearest osu!pixel, discarding the fractional
/// precision stable itself records (spec.md §4.5, §9's `wtc` module note).
fn wtc_compress(lzma_bytes: &[u8]) -> CacheResult<Vec<u8>> {
    let text = lzma_decompress(lzma_bytes)?;
    let text = String::from_utf8(text)?;
    let (frames, seed) = parse_frames(&text)?;

    let mut parts: Vec<String> = frames.iter().map(render_frame).collect();
    if let Some(seed) = seed {
        parts.push(format!("-12345|0|0|{seed}"));
    }
    let rounded_text = parts.join(",");
    Ok(lzma_compress(rounded_text.as_bytes())?)
}

fn render_frame(frame: &RawReplayFrame) -> String {
    format!(
        "{}|{}|{}|{}",
        frame.time_delta,
        frame.x.round(),
        frame.y.round(),
        frame.keys
    )
}
