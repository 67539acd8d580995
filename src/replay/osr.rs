//! Reading of the `.osr` replay header: the metadata osu!stable writes ahead
//! of the compressed action-data blob.
//!
//! The byte layout (mode, version, ULEB128-prefixed strings, hit counts,
//! mods, life graph, timestamp, then the length-prefixed compressed action
//! data) is osu!'s own, not this crate's; it's read here exactly as
//! osu!stable writes it so that [`parse_osr`] can hand the rest of the crate
//! a [`RawReplay`] built from this crate's own [`Mode`]/[`Mods`] types
//! instead of raw integers.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::enums::Mode;
use crate::mods::Mods;

use super::{actions, ReplayError, ReplayResult};

#[cfg(feature = "replay-data")]
use super::lzma;

/// An unprocessed `.osr` replay: the header fields plus, if the replay
/// carries action data, the parsed (but not yet time-normalized) frames.
///
/// Feeding this into [`super::Replay::from_raw`] produces the normalized,
/// analysis-ready form.
#[derive(Debug, Clone)]
pub struct RawReplay {
    /// Gamemode the replay was recorded in.
    pub mode: Mode,
    /// osu! client build number the replay was recorded on.
    pub game_version: u32,
    /// MD5 hash of the beatmap played.
    pub beatmap_hash: String,
    /// The player's username.
    pub username: String,
    /// MD5 hash of this replay.
    pub replay_hash: String,
    /// Count of 300s (or equivalent in other modes).
    pub count_300: u16,
    /// Count of 100s (or equivalent in other modes).
    pub count_100: u16,
    /// Count of 50s (or equivalent in other modes).
    pub count_50: u16,
    /// Count of gekis (or equivalent in other modes).
    pub count_geki: u16,
    /// Count of katus (or equivalent in other modes).
    pub count_katu: u16,
    /// Count of misses.
    pub count_miss: u16,
    /// Total score.
    pub score: u32,
    /// Max combo reached.
    pub max_combo: u16,
    /// Whether the play was a full combo with no early slider releases.
    pub perfect: bool,
    /// The mods the replay was played with.
    pub mods: Mods,
    /// Timestamped life bar values, `(time, fraction)` with `fraction` in `0.0..=1.0`.
    pub life_bar_graph: Vec<(i32, f64)>,
    /// When the replay was played, Windows ticks converted to a unix timestamp.
    pub timestamp: u64,
    /// The parsed action-data frames, or `None` if this replay carries no
    /// data (e.g. an online-only score whose replay was never downloaded).
    pub replay_data: Option<Vec<super::RawReplayFrame>>,
    /// The replay's unique online id, or 0 if unsubmitted.
    pub replay_id: u64,
    /// The RNG seed trailer, if the action data carried one.
    pub rng_seed: Option<u32>,
}

fn read_uleb128<R: Read>(reader: &mut R) -> ReplayResult<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        result |= ((byte & 0b0111_1111) as u64) << shift;
        if byte & 0b1000_0000 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

fn read_uleb128_string<R: Read>(reader: &mut R) -> ReplayResult<String> {
    match reader.read_u8()? {
        0x00 => Ok(String::new()),
        0x0b => {
            let len = read_uleb128(reader)?;
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf)?;
            Ok(String::from_utf8(buf)?)
        }
        other => Err(ReplayError::InvalidFrame(format!(
            "invalid string status byte {other:#x}"
        ))),
    }
}

/// Windows `DateTime.Ticks` (100ns units since 0001-01-01) to unix seconds.
const TICKS_PER_SECOND: u64 = 10_000_000;
const TICKS_TO_UNIX_EPOCH: u64 = 621_355_968_000_000_000;

fn ticks_to_unix(ticks: u64) -> u64 {
    ticks
        .saturating_sub(TICKS_TO_UNIX_EPOCH)
        .checked_div(TICKS_PER_SECOND)
        .unwrap_or(0)
}

/// Parses a full `.osr` file's bytes into a [`RawReplay`].
///
/// Requires the `replay-data` feature, since the action data (when present)
/// is stored LZMA-compressed.
#[cfg(feature = "replay-data")]
pub fn parse_osr(bytes: &[u8]) -> ReplayResult<RawReplay> {
    let mut reader = std::io::Cursor::new(bytes);

    let mode = match reader.read_u8()? {
        0 => Mode::Osu,
        1 => Mode::Taiko,
        2 => Mode::Catch,
        3 => Mode::Mania,
        other => return Err(ReplayError::InvalidMode(other)),
    };
    let game_version = reader.read_u32::<LittleEndian>()?;
    let beatmap_hash = read_uleb128_string(&mut reader)?;
    let username = read_uleb128_string(&mut reader)?;
    let replay_hash = read_uleb128_string(&mut reader)?;
    let count_300 = reader.read_u16::<LittleEndian>()?;
    let count_100 = reader.read_u16::<LittleEndian>()?;
    let count_50 = reader.read_u16::<LittleEndian>()?;
    let count_geki = reader.read_u16::<LittleEndian>()?;
    let count_katu = reader.read_u16::<LittleEndian>()?;
    let count_miss = reader.read_u16::<LittleEndian>()?;
    let score = reader.read_u32::<LittleEndian>()?;
    let max_combo = reader.read_u16::<LittleEndian>()?;
    let perfect = reader.read_u8()? != 0;
    let mods_bits = reader.read_u32::<LittleEndian>()?;
    let mods = Mods::from_bits(mods_bits).ok_or(ReplayError::UnexpectedMods(mods_bits))?;

    let life_bar_graph = read_uleb128_string(&mut reader)?
        .split(',')
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split('|');
            let missing = || ReplayError::InvalidFrame(entry.to_owned());
            let time = parts.next().ok_or_else(missing)?.parse::<i32>()?;
            let life = parts.next().ok_or_else(missing)?.parse::<f64>()?;
            Ok((time, life))
        })
        .collect::<ReplayResult<Vec<_>>>()?;

    let ticks = reader.read_u64::<LittleEndian>()?;
    let timestamp = ticks_to_unix(ticks);

    let compressed_len = reader.read_u32::<LittleEndian>()?;
    let mut compressed = vec![0u8; compressed_len as usize];
    reader.read_exact(&mut compressed)?;

    let (replay_data, rng_seed) = if compressed.is_empty() {
        (None, None)
    } else {
        let text = lzma::decompress(&compressed)?;
        let text = String::from_utf8(text)?;
        let (frames, seed) = actions::parse_frames(&text)?;
        (Some(frames), seed)
    };

    let replay_id = match reader.read_u64::<LittleEndian>() {
        Ok(v) => v,
        Err(_) => 0,
    };

    Ok(RawReplay {
        mode,
        game_version,
        beatmap_hash,
        username,
        replay_hash,
        count_300,
        count_100,
        count_50,
        count_geki,
        count_katu,
        count_miss,
        score,
        max_combo,
        perfect,
        mods,
        life_bar_graph,
        timestamp,
        replay_data,
        replay_id,
        rng_seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn parses_minimal_header_with_no_replay_data() {
        let mut bytes = Vec::new();
        bytes.push(0u8); // mode = osu
        bytes.extend_from_slice(&20210101u32.to_le_bytes()); // version
        write_uleb128_string(&mut bytes, "beatmaphash");
        write_uleb128_string(&mut bytes, "tybug");
        write_uleb128_string(&mut bytes, "replayhash");
        bytes.extend_from_slice(&100u16.to_le_bytes()); // 300s
        bytes.extend_from_slice(&0u16.to_le_bytes()); // 100s
        bytes.extend_from_slice(&0u16.to_le_bytes()); // 50s
        bytes.extend_from_slice(&0u16.to_le_bytes()); // geki
        bytes.extend_from_slice(&0u16.to_le_bytes()); // katu
        bytes.extend_from_slice(&0u16.to_le_bytes()); // miss
        bytes.extend_from_slice(&1_000_000u32.to_le_bytes()); // score
        bytes.extend_from_slice(&500u16.to_le_bytes()); // max_combo
        bytes.push(1); // perfect
        bytes.extend_from_slice(&0u32.to_le_bytes()); // mods = NONE
        write_uleb128_string(&mut bytes, ""); // life graph
        bytes.extend_from_slice(&TICKS_TO_UNIX_EPOCH.to_le_bytes()); // timestamp
        bytes.extend_from_slice(&0u32.to_le_bytes()); // no compressed data
        bytes.extend_from_slice(&0u64.to_le_bytes()); // replay id

        let raw = parse_osr(&bytes).unwrap();
        assert_eq!(raw.mode, Mode::Osu);
        assert_eq!(raw.username, "tybug");
        assert_eq!(raw.count_300, 100);
        assert!(raw.perfect);
        assert_eq!(raw.mods, Mods::NONE);
        assert!(raw.replay_data.is_none());
        assert_eq!(raw.timestamp, 0);
    }
}
