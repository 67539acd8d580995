//! Replay time-series normalization.
//!
//! The actual `.osr` on-disk byte layout and the osu! beatmap parser are
//! external collaborators (see `spec.md` §1's Out-of-scope list): this
//! module's job starts once those have produced a [`RawReplay`] — a header
//! plus a flat sequence of [`RawReplayFrame`]s — and turns that into the
//! time-sorted `t`/`xy`/`k` arrays the analysis engines consume.
//!
//! The normalization rules (§4.9) reproduce osu!stable's odd but
//! load-bearing handling of negative-time frames: a replay that seeks into
//! the song on start produces one large positive delta followed by negative
//! deltas back to true zero, and stable's playback quietly interpolates
//! across any such negative section rather than rejecting it.

mod actions;
#[cfg(feature = "replay-data")]
mod lzma;
mod osr;

use crate::enums::Mode;
use crate::game_version::GameVersion;
use crate::keys::{Key, KEY_MASK};
use crate::math::Point;
use crate::mods::Mods;
use crate::weight::RatelimitWeight;

pub use self::actions::parse_frames;
#[cfg(feature = "replay-data")]
pub use self::lzma::{compress as lzma_compress, decompress as lzma_decompress};
#[cfg(feature = "replay-data")]
pub use self::osr::parse_osr;
pub use self::osr::RawReplay;

/// Result type for replay processing.
pub type ReplayResult<T, E = ReplayError> = std::result::Result<T, E>;

/// Errors that can occur while normalizing or decoding a replay.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplayError {
    /// The decompressed action-data frame `frame_str` could not be parsed.
    #[error("malformed replay frame: {0:?}")]
    InvalidFrame(String),

    /// A replay's data was the empty list rather than absent entirely. Per
    /// spec.md §4.9 step 1 this is distinct from "no data at all" and is
    /// treated as a misbehaved replay rather than silently accepted.
    #[error("replay data was present but empty")]
    EmptyData,

    #[error("error parsing int in replay frame: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("error parsing float in replay frame: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error decoding utf8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("unexpected mods bits: {0}")]
    UnexpectedMods(u32),

    #[error("invalid mode: {0}")]
    InvalidMode(u8),

    #[cfg(feature = "replay-data")]
    #[error("lzma error: {0}")]
    Lzma(#[from] lzma_rs::error::Error),
}

/// A single raw frame straight out of the decompressed action-data string,
/// before any normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReplayFrame {
    /// Milliseconds since the previous frame (may be negative, see module docs).
    pub time_delta: i32,
    /// Cursor x position, osu!pixels.
    pub x: f32,
    /// Cursor y position, osu!pixels.
    pub y: f32,
    /// Raw key bitmask held during this frame.
    pub keys: u32,
}

/// A fully loaded replay: metadata plus the normalized `t`/`xy`/`k` arrays.
///
/// Invariants (spec.md §3, §8): `t.len() == xy.len() == k.len()`; `t` is
/// non-decreasing; a source frame with `time_delta == 0` at position 0 is
/// discarded; negative-time sections are resolved per §4.9.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Replay {
    /// When the replay was played, if known.
    pub timestamp: Option<u64>,
    /// The beatmap this replay was played on, or `None` if unknown.
    pub beatmap_id: Option<u32>,
    /// The player who played this replay, or `None` if unknown.
    pub user_id: Option<u32>,
    /// The player's username.
    pub username: Option<String>,
    /// The mods this replay was played with, or `None` if unknown (e.g. a
    /// bare `ReplayID` before its info is resolved).
    pub mods: Option<Mods>,
    /// The replay's unique id, or `None` if unsubmitted.
    pub replay_id: Option<u64>,
    /// How expensive loading this replay was against the remote API.
    pub weight: RatelimitWeight,
    /// The osu! client build this replay was played on, if known.
    pub game_version: GameVersion,

    /// Frame timestamps, milliseconds, non-decreasing.
    pub t: Vec<i32>,
    /// Cursor positions, osu!pixels, parallel to `t`.
    pub xy: Vec<Point<f64>>,
    /// Held-key bitmasks, parallel to `t`.
    pub k: Vec<u32>,
}

impl Replay {
    /// Builds a [`Replay`] from a parsed `.osr` header and action-data
    /// frames, applying the negative-time normalization of spec.md §4.9.
    ///
    /// Returns a replay with empty arrays (`has_data()` false) if `raw` has
    /// no replay data, if the data is for a non-std gamemode (this crate's
    /// analysis core is std-only), or if the frame sequence is empty.
    pub fn from_raw(raw: RawReplay, weight: RatelimitWeight) -> ReplayResult<Replay> {
        let mut replay = Replay {
            timestamp: Some(raw.timestamp),
            beatmap_id: None,
            user_id: None,
            username: Some(raw.username),
            mods: Some(raw.mods),
            replay_id: if raw.replay_id == 0 {
                None
            } else {
                Some(raw.replay_id)
            },
            weight,
            game_version: GameVersion::Known {
                version: raw.game_version,
                concrete: true,
            },
            t: Vec::new(),
            xy: Vec::new(),
            k: Vec::new(),
        };

        let frames = match raw.replay_data {
            Some(frames) if raw.mode == Mode::Osu => frames,
            _ => return Ok(replay),
        };
        if frames.is_empty() {
            return Err(ReplayError::EmptyData);
        }

        let (t, xy, k) = normalize_frames(&frames);
        replay.t = t;
        replay.xy = xy;
        replay.k = k;
        Ok(replay)
    }

    /// Builds a [`Replay`] from already-known metadata and a frame stream
    /// that didn't come with an `.osr` header (e.g. the osu! API's
    /// `get_replay`/`get_replay_by_id`, which only ever return std-mode
    /// data since requests are scoped to `m=0`). Applies the same
    /// negative-time normalization as [`Replay::from_raw`].
    #[cfg(feature = "api")]
    #[allow(clippy::too_many_arguments)]
    pub fn from_frames(
        timestamp: Option<u64>,
        beatmap_id: Option<u32>,
        user_id: Option<u32>,
        username: Option<String>,
        mods: Option<Mods>,
        replay_id: Option<u64>,
        weight: RatelimitWeight,
        game_version: GameVersion,
        frames: Vec<RawReplayFrame>,
    ) -> ReplayResult<Replay> {
        let mut replay = Replay {
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
        };
        if frames.is_empty() {
            return Err(ReplayError::EmptyData);
        }
        let (t, xy, k) = normalize_frames(&frames);
        replay.t = t;
        replay.xy = xy;
        replay.k = k;
        Ok(replay)
    }

    /// Whether this replay has any cursor/key data at all.
    pub fn has_data(&self) -> bool {
        !self.t.is_empty()
    }

    /// The keydown bitmask for each frame: the bits newly pressed since the
    /// previous frame, masked to [`KEY_MASK`] so a keyboard press and its
    /// implied mouse-button press aren't double-counted.
    ///
    /// `keydowns[0]` is computed against an implicit `k[-1] = 0`.
    pub fn keydowns(&self) -> Vec<Key> {
        let mut out = Vec::with_capacity(self.k.len());
        let mut previous = 0u32;
        for &keys in &self.k {
            let masked = keys & KEY_MASK.bits();
            let down = masked & !previous;
            out.push(Key::from_bits_truncate(down));
            previous = masked;
        }
        out
    }
}

/// Applies spec.md §4.9 steps 2-5 to an already-std, non-empty frame
/// sequence, producing parallel `t`/`xy`/`k` arrays sorted stably by `t`.
fn normalize_frames(frames: &[RawReplayFrame]) -> (Vec<i32>, Vec<Point<f64>>, Vec<u32>) {
    // Step 2: discard a leading zero-delta frame.
    let frames = if frames[0].time_delta == 0 {
        &frames[1..]
    } else {
        frames
    };
    if frames.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }

    // Step 3: the first remaining frame only seeds running_t; its own
    // (x,y,k) is never emitted. highest_running_t starts at -infinity so
    // the second frame (the first one actually visited by the loop below)
    // can never read as "still in a negative section" against it.
    let mut running_t: i64 = frames[0].time_delta as i64;
    let mut highest_running_t: i64 = i64::MIN;
    let mut last_positive_frame: Option<RawReplayFrame> = None;
    let mut last_positive_cum_t: i64 = 0;
    let mut previous_frame = frames[0];

    // (t, x, y, k) tuples in emission order, sorted stably by t afterwards.
    let mut emitted: Vec<(i64, f64, f64, u32)> = Vec::with_capacity(frames.len());

    for &frame in &frames[1..] {
        let was_in_negative_section = running_t < highest_running_t;

        running_t += frame.time_delta as i64;
        highest_running_t = highest_running_t.max(running_t);

        if running_t < highest_running_t {
            // Step 4c: still (or newly) in a negative section.
            if !was_in_negative_section {
                last_positive_frame = Some(previous_frame);
                last_positive_cum_t = running_t - frame.time_delta as i64;
            }
            previous_frame = frame;
            continue;
        }

        if was_in_negative_section {
            // Step 4d: this frame exits the negative section. Emit a
            // synthetic interpolated frame at the last positive cumulative
            // time, then the current frame normally.
            let frame_start = running_t - frame.time_delta as i64;
            let denom = frame.time_delta as f64;
            let weight = if denom == 0.0 {
                0.0
            } else {
                (last_positive_cum_t - frame_start) as f64 / denom
            };
            let lerp = |a: f32, b: f32| a as f64 + (b as f64 - a as f64) * weight;
            let synthetic_keys = last_positive_frame
                .map(|f| f.keys)
                .unwrap_or(previous_frame.keys);
            emitted.push((
                last_positive_cum_t,
                lerp(previous_frame.x, frame.x),
                lerp(previous_frame.y, frame.y),
                synthetic_keys,
            ));
        }

        emitted.push((running_t, frame.x as f64, frame.y as f64, frame.keys));
        previous_frame = frame;
    }

    // Step 5: stable sort by t.
    emitted.sort_by_key(|&(t, ..)| t);

    let mut t = Vec::with_capacity(emitted.len());
    let mut xy = Vec::with_capacity(emitted.len());
    let mut k = Vec::with_capacity(emitted.len());
    for (frame_t, x, y, keys) in emitted {
        t.push(frame_t as i32);
        xy.push(Point::new(x, y));
        k.push(keys);
    }
    (t, xy, k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(time_delta: i32, x: f32, y: f32, keys: u32) -> RawReplayFrame {
        RawReplayFrame {
            time_delta,
            x,
            y,
            keys,
        }
    }

    #[test]
    fn drops_leading_zero_delta_frame() {
        let frames = vec![frame(0, 0.0, 0.0, 0), frame(16, 1.0, 1.0, 0)];
        let (t, _, _) = normalize_frames(&frames);
        assert_eq!(t, vec![16]);
    }

    #[test]
    fn simple_increasing_sequence_passes_through() {
        // the first remaining frame (after the step-2 drop check) only
        // seeds running_t; its own (x,y,k) is never emitted, so three
        // input frames of equal delta produce two output points.
        let frames = vec![
            frame(16, 0.0, 0.0, 0),
            frame(16, 1.0, 1.0, 1),
            frame(16, 2.0, 2.0, 1),
        ];
        let (t, xy, k) = normalize_frames(&frames);
        assert_eq!(t, vec![32, 48]);
        assert_eq!(k, vec![1, 1]);
        assert_eq!(xy[1], Point::new(2.0, 2.0));
    }

    #[test]
    fn no_negative_section_when_running_t_only_ever_rises_to_a_fresh_peak() {
        // the first frame's delta only seeds running_t (1000) and
        // highest_running_t starts at -infinity, so the second frame's
        // running_t (50) immediately becomes the new peak rather than
        // dipping below one — no negative section is ever entered, and no
        // synthetic frame is inserted.
        let frames = vec![
            frame(1000, 0.0, 0.0, 0),
            frame(-950, 10.0, 10.0, 1),
            frame(960, 20.0, 20.0, 1),
        ];
        let (t, xy, k) = normalize_frames(&frames);
        assert_eq!(t, vec![50, 1010]);
        assert_eq!(k, vec![1, 1]);
        assert_eq!(xy[0], Point::new(10.0, 10.0));
        assert_eq!(xy[1], Point::new(20.0, 20.0));
    }

    #[test]
    fn negative_section_interpolates_on_exit() {
        // frame0 only seeds running_t (1000); frame1 (delta 0) establishes
        // the peak at t=1000; frame2 walks running_t back down to 50,
        // entering a negative section; frame3 jumps past the old peak to
        // t=1010, exiting it. osu! inserts a synthetic frame at the peak
        // (t=1000) ahead of the exit frame.
        let frames = vec![
            frame(1000, 0.0, 0.0, 0), // seeds running_t, never emitted
            frame(0, 5.0, 5.0, 2),    // running_t = 1000 (the peak)
            frame(-950, 10.0, 10.0, 1), // running_t = 50, enters negative section
            frame(960, 20.0, 20.0, 4),  // running_t = 1010, exits negative section
        ];
        let (t, xy, k) = normalize_frames(&frames);
        assert_eq!(t, vec![1000, 1000, 1010]);
        assert_eq!(k, vec![2, 2, 4]);
        assert_eq!(xy[0], Point::new(5.0, 5.0));
        // the synthetic frame interpolates between the last negative-section
        // frame (10,10) and the exit frame (20,20), close to the exit frame
        // since the peak sits almost at the exit frame's own timestamp.
        assert!(xy[1].x > 19.0 && xy[1].x < 20.0);
        assert_eq!(xy[2], Point::new(20.0, 20.0));
    }

    #[test]
    fn keydowns_mask_out_implied_mouse_bits() {
        use crate::keys::Key;
        let replay = Replay {
            timestamp: None,
            beatmap_id: None,
            user_id: None,
            username: None,
            mods: None,
            replay_id: None,
            weight: RatelimitWeight::None,
            game_version: GameVersion::Unknown,
            t: vec![0, 16, 32],
            xy: vec![Point::new(0.0, 0.0); 3],
            k: vec![0, Key::K1.bits(), Key::K1.bits() | Key::K2.bits()],
        };
        let downs = replay.keydowns();
        assert_eq!(downs[0], Key::empty());
        assert_eq!(downs[1], Key::M1);
        assert_eq!(downs[2], Key::M2);
    }

    #[test]
    fn unloaded_replay_has_no_data() {
        let raw = RawReplay {
            mode: Mode::Osu,
            game_version: 20200101,
            beatmap_hash: String::new(),
            username: "tybug".to_string(),
            replay_hash: String::new(),
            count_300: 0,
            count_100: 0,
            count_50: 0,
            count_geki: 0,
            count_katu: 0,
            count_miss: 0,
            score: 0,
            max_combo: 0,
            perfect: false,
            mods: Mods::NONE,
            life_bar_graph: Vec::new(),
            timestamp: 0,
            replay_data: None,
            replay_id: 0,
            rng_seed: None,
        };
        let replay = Replay::from_raw(raw, RatelimitWeight::Heavy).unwrap();
        assert!(!replay.has_data());
    }

    use proptest::collection::vec;
    use proptest::prelude::*;
    use proptest::proptest;

    fn arb_frame() -> impl Strategy<Value = RawReplayFrame> {
        (-5000i32..=5000, any::<f32>(), any::<f32>(), 0u32..32).prop_map(
            |(time_delta, x, y, keys)| RawReplayFrame {
                time_delta,
                x,
                y,
                keys,
            },
        )
    }

    proptest! {
        #[test]
        fn normalized_arrays_stay_parallel_and_time_sorted(frames in vec(arb_frame(), 1..20)) {
            let (t, xy, k) = normalize_frames(&frames);
            prop_assert_eq!(t.len(), xy.len());
            prop_assert_eq!(t.len(), k.len());
            prop_assert!(t.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn keydowns_formula_matches_the_masked_delta(keys in vec(0u32..32, 0..20)) {
            let n = keys.len();
            let replay = Replay {
                timestamp: None,
                beatmap_id: None,
                user_id: None,
                username: None,
                mods: None,
                replay_id: None,
                weight: RatelimitWeight::None,
                game_version: GameVersion::Unknown,
                t: (0..n as i32).collect(),
                xy: vec![Point::new(0.0, 0.0); n],
                k: keys.clone(),
            };
            let downs = replay.keydowns();
            let mut previous = 0u32;
            for (i, &held) in keys.iter().enumerate() {
                let masked = held & KEY_MASK.bits();
                let expected = masked & !previous;
                prop_assert_eq!(downs[i].bits(), expected);
                previous = masked;
            }
        }
    }
}
