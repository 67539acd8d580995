//! Aim-correction ("snap") detection: consecutive cursor samples that turn
//! through an implausibly acute angle despite each leg being long enough to
//! rule out pixel-level jitter (spec.md §4.12).

use crate::beatmap::Beatmap;
use crate::judgment::{hit_radius, hitwindow_50};
use crate::math::{angle_at, Point};
use crate::mods::Mods;
use crate::replay::Replay;

/// The conventional default for `max_angle`, degrees.
pub const DEFAULT_MAX_ANGLE: f64 = 10.0;
/// The conventional default for `min_distance`, osu!pixels.
pub const DEFAULT_MIN_DISTANCE: f64 = 8.0;

/// A single detected snap: an unusually sharp turn in the cursor path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Snap {
    /// When the turn occurred (the middle sample's time), ms.
    pub time_ms: i32,
    /// The angle at the middle sample, in degrees.
    pub angle_deg: f64,
    /// The shorter of the two legs adjacent to the turn, osu!pixels.
    pub min_distance_px: f64,
}

/// Finds every interior cursor sample whose angle to its neighbors is
/// sharper than `max_angle` degrees while both adjacent legs are longer
/// than `min_distance` osu!pixels.
///
/// If `beatmap` is given, a candidate snap is kept only when its position
/// is within the hit radius of, and its time within the hitwindow of, the
/// temporally closest non-spinner hitobject — i.e. snaps are only reported
/// near an object a player would actually be aiming at.
pub fn snaps(
    replay: &Replay,
    max_angle: f64,
    min_distance: f64,
    beatmap: Option<&Beatmap>,
) -> Vec<Snap> {
    let (t, xy) = remove_duplicate_t(&replay.t, &replay.xy);
    if t.len() < 3 {
        return Vec::new();
    }

    let mods = replay.mods.unwrap_or(Mods::NONE);
    let easy = mods.contains(Mods::EZ);
    let hard_rock = mods.contains(Mods::HR);

    let mut out = Vec::new();
    for i in 1..t.len() - 1 {
        let (a, b, c) = (xy[i - 1], xy[i], xy[i + 1]);
        let beta = angle_at(a, b, c);
        if beta.is_nan() {
            continue;
        }
        let beta_deg = beta.to_degrees();
        let ab = a.distance(b);
        let bc = b.distance(c);
        let min_leg = ab.min(bc);

        if !(beta_deg < max_angle && min_leg > min_distance) {
            continue;
        }

        if let Some(bm) = beatmap {
            if !near_a_hitobject(bm, t[i], b, easy, hard_rock) {
                continue;
            }
        }

        out.push(Snap {
            time_ms: t[i],
            angle_deg: beta_deg,
            min_distance_px: min_leg,
        });
    }
    out
}

/// Keeps only the first frame for each distinct timestamp.
fn remove_duplicate_t(t: &[i32], xy: &[Point<f64>]) -> (Vec<i32>, Vec<Point<f64>>) {
    let mut out_t = Vec::with_capacity(t.len());
    let mut out_xy = Vec::with_capacity(xy.len());
    let mut last = None;
    for (&time, &pos) in t.iter().zip(xy.iter()) {
        if last == Some(time) {
            continue;
        }
        last = Some(time);
        out_t.push(time);
        out_xy.push(pos);
    }
    (out_t, out_xy)
}

fn near_a_hitobject(beatmap: &Beatmap, t: i32, xy: Point<f64>, easy: bool, hard_rock: bool) -> bool {
    let closest = beatmap
        .hit_objects
        .iter()
        .min_by_key(|ho| (ho.time() - t).abs());
    let ho = match closest {
        Some(ho) => ho,
        None => return false,
    };
    if ho.is_spinner() {
        return false;
    }

    let hw50 = hitwindow_50(beatmap.od(easy, hard_rock)) as i32;
    if t < ho.time() - hw50 || t > ho.time() + hw50 {
        return false;
    }

    let radius = hit_radius(beatmap.cs(easy, hard_rock));
    xy.distance(ho.xy()) <= radius
}
