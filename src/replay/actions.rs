//! Decoding of a replay's decompressed action-data string into frame events.
//!
//! The wire format is a comma-separated list of `time_delta|x|y|keys`
//! frames; the last frame may instead be the sentinel `-12345|0|0|seed`,
//! which carries the RNG seed used for the score rather than a real frame.

use super::{RawReplayFrame, ReplayError, ReplayResult};

/// The sentinel `time_delta` value marking the trailing RNG-seed frame.
const SEED_FRAME_TIME: i32 = -12345;

/// Parses already-decompressed action-data text into frames and an optional
/// RNG seed.
pub fn parse_frames(text: &str) -> ReplayResult<(Vec<RawReplayFrame>, Option<u32>)> {
    let mut frames = text
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|frame_str| {
            let mut parts = frame_str.split('|');
            let missing = || ReplayError::InvalidFrame(frame_str.to_owned());
            let time_delta = parts.next().ok_or_else(missing)?.parse::<i32>()?;
            let x = parts.next().ok_or_else(missing)?.parse::<f32>()?;
            let y = parts.next().ok_or_else(missing)?.parse::<f32>()?;
            let keys = parts.next().ok_or_else(missing)?.parse::<u32>()?;
            Ok(RawReplayFrame {
                time_delta,
                x,
                y,
                keys,
            })
        })
        .collect::<ReplayResult<Vec<_>>>()?;

    let has_seed = matches!(
        frames.last(),
        Some(RawReplayFrame {
            time_delta: SEED_FRAME_TIME,
            ..
        })
    );
    let rng_seed = if has_seed {
        let seed_frame = frames.pop().expect("has_seed checked");
        Some(seed_frame.keys)
    } else {
        None
    };

    Ok((frames, rng_seed))
}
