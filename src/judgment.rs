//! Per-hitobject hit/miss classification: the notelock/hitwindow state
//! machine (spec.md §4.11).
//!
//! This reproduces osu!stable's notoriously finicky input-locking behavior,
//! in both its pre- and post- "sliderbug fix" forms (the 2019-02-07 patch
//! that changed when a slider releases notelock on the next object and gave
//! circles a trailing `+1`ms of life). The 2B (overlapping hitobjects) case
//! is a known-incorrect linear scan per spec.md §9 and is left as-is.

use crate::beatmap::Beatmap;
use crate::float::round_trip_f32;
use crate::game_version::GameVersion;
use crate::hitobject::Hitobject;
use crate::math::Point;
use crate::mods::Mods;
use crate::replay::Replay;

/// The osu!stable client version the slider-notelock/circle-tail fix
/// shipped in, if the build is on the stable release branch.
pub const VERSION_SLIDERBUG_FIXED_STABLE: u32 = 20190207;
/// The equivalent version on the cutting-edge (`cuttingedge`) release
/// branch, used only when a [`GameVersion`] is estimated against that
/// branch; per spec.md §9 an ambiguous estimate resolves to the stable
/// branch's threshold instead.
pub const VERSION_SLIDERBUG_FIXED_CUTTING_EDGE: u32 = 20190111;

/// The interval, in ms, before a hitobject's hit window during which a
/// press is still close enough to be absorbed by notelock ("the miss
/// window") rather than belonging to an earlier or later object.
pub const HITWINDOW_MISS: i32 = 400;

/// The 50-hitwindow, in ms, after float32-rounding `od` the way stable
/// stores difficulty stats.
pub fn hitwindow_50(od: f64) -> f64 {
    let od = round_trip_f32(od);
    (150.0 + 50.0 * (5.0 - od) / 5.0).floor()
}

/// The 100-hitwindow, in ms.
pub fn hitwindow_100(od: f64) -> f64 {
    let od = round_trip_f32(od);
    (280.0 - 16.0 * od) / 2.0
}

/// The 300-hitwindow, in ms.
pub fn hitwindow_300(od: f64) -> f64 {
    let od = round_trip_f32(od);
    (160.0 - 12.0 * od) / 2.0
}

/// The click-acceptance radius, in osu!pixels, after CS scaling and the
/// float32 round-trips stable performs when computing it.
///
/// The final `1.00041` multiplier is a fitted constant with no cited
/// derivation upstream (spec.md §9); kept verbatim for parity.
pub fn hit_radius(cs: f64) -> f64 {
    let cs = round_trip_f32(cs);
    let base = (64.0 * (1.0 - 0.7 * (cs - 5.0) / 5.0) / 2.0) as f32;
    (base * 1.00041_f32) as f64
}

/// Whether `version` is on or after the sliderbug fix, resolving an
/// unknown/unavailable version to "assume fixed" per spec.md §4.11.
///
/// A concrete version (the replay's actual build) is compared against the
/// cutting-edge threshold, since that's the branch the build number was
/// taken from; an estimated version is compared against the stable
/// threshold, since an estimate can't distinguish which branch it came from
/// and stable is the conservative (later) choice.
pub fn is_post_sliderbug_fix(version: GameVersion) -> bool {
    match version.version() {
        None => true,
        Some(v) if version.is_concrete() => v >= VERSION_SLIDERBUG_FIXED_CUTTING_EDGE,
        Some(v) => v >= VERSION_SLIDERBUG_FIXED_STABLE,
    }
}

/// How a [`Hit`] was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HitType {
    /// Within the 300 hitwindow (always the classification for a
    /// sliderhead, regardless of timing).
    Hit300,
    /// Within the 100 hitwindow.
    Hit100,
    /// Within the 50 hitwindow.
    Hit50,
}

/// A successful click against a hitobject.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// The hitobject this click resolved.
    pub hitobject: Hitobject,
    /// When the click occurred, ms.
    pub t: i32,
    /// Where the cursor was at the time of the click.
    pub xy: Point<f64>,
    /// The hitwindow this click landed in.
    pub hit_type: HitType,
}

impl Hit {
    /// `t - hitobject.time()`: negative means the click was early.
    pub fn error(&self) -> i32 {
        self.t - self.hitobject.time()
    }
}

/// The outcome of resolving a single hitobject: either a [`Hit`] or a
/// [`Judgment::Miss`] carrying the hitobject that went unresolved.
///
/// Spinners never appear here (spec.md §4.11: they're excluded from the
/// distance check and from the closing miss sweep), so
/// `judgments(...).len() == hitobjects.len() - spinners.len()`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Judgment {
    /// A resolved click.
    Hit(Hit),
    /// A hitobject that never resolved to a click.
    Miss(Hitobject),
}

impl Judgment {
    /// The hitobject this judgment is about.
    pub fn hitobject(&self) -> Hitobject {
        match *self {
            Judgment::Hit(hit) => hit.hitobject,
            Judgment::Miss(ho) => ho,
        }
    }
}

/// Runs the notelock/hitwindow state machine over `replay` against
/// `beatmap`'s hitobjects and returns one [`Judgment`] per non-spinner
/// hitobject.
pub fn judgments(replay: &Replay, beatmap: &Beatmap) -> Vec<Judgment> {
    let mods = replay.mods.unwrap_or(Mods::NONE);
    let easy = mods.contains(Mods::EZ);
    let hard_rock = mods.contains(Mods::HR);

    let od = beatmap.od(easy, hard_rock);
    let cs = beatmap.cs(easy, hard_rock);
    let hw50 = hitwindow_50(od) as i32;
    let hw300 = hitwindow_300(od) as i32;
    let hw100 = hitwindow_100(od) as i32;
    let radius = hit_radius(cs);
    let post_fix = is_post_sliderbug_fix(replay.game_version);

    let keydowns: Vec<(i32, Point<f64>)> = replay
        .keydowns()
        .iter()
        .zip(replay.t.iter())
        .zip(replay.xy.iter())
        .filter(|((kd, _), _)| !kd.is_empty())
        .map(|((_, &t), &xy)| (t, xy))
        .collect();

    let hitobjects = &beatmap.hit_objects;
    let mut hit = vec![false; hitobjects.len()];
    let mut out = Vec::new();

    let mut hitobj_i = 0usize;
    let mut keydown_i = 0usize;

    while hitobj_i < hitobjects.len() && keydown_i < keydowns.len() {
        let ho = hitobjects[hitobj_i];
        let (t_k, xy_k) = keydowns[keydown_i];

        let obj_end = match ho {
            Hitobject::Circle { t, .. } => t + hw50,
            Hitobject::Slider { end_time, .. } | Hitobject::Spinner { end_time, .. } => end_time,
        };
        let notelock_end = if post_fix {
            if matches!(ho, Hitobject::Circle { .. }) {
                obj_end + 1
            } else {
                obj_end
            }
        } else if matches!(ho, Hitobject::Circle { .. }) {
            ho.time() + hw50
        } else {
            (ho.time() + hw50).min(obj_end)
        };

        // Rule 1: this press is too early to matter to any object we still
        // care about.
        if t_k < ho.time() - HITWINDOW_MISS {
            keydown_i += 1;
            continue;
        }

        // Rule 2: inside the miss window, ahead of the 50-hitwindow.
        if t_k <= ho.time() - hw50 {
            if !ho.is_spinner() && xy_k.distance(ho.xy()) <= radius {
                advance_keydown_past_notelock(
                    &mut keydown_i,
                    &keydowns,
                    ho,
                    notelock_end,
                    post_fix,
                );
                hitobj_i += 1;
            } else {
                keydown_i += 1;
            }
            continue;
        }

        // Rule 3: notelock on this object has expired; it's unresolved.
        if t_k >= notelock_end {
            hitobj_i += 1;
            continue;
        }

        // Rule 4: inside the live hitwindow.
        if t_k < ho.time() + hw50 && !ho.is_spinner() && xy_k.distance(ho.xy()) <= radius {
            let hit_type = if ho.is_slider() {
                HitType::Hit300
            } else {
                let err = (t_k - ho.time()).abs();
                if err < hw300 {
                    HitType::Hit300
                } else if err < hw100 {
                    HitType::Hit100
                } else {
                    HitType::Hit50
                }
            };
            out.push(Judgment::Hit(Hit {
                hitobject: ho,
                t: t_k,
                xy: xy_k,
                hit_type,
            }));
            hit[hitobj_i] = true;
            advance_keydown_past_notelock(&mut keydown_i, &keydowns, ho, notelock_end, post_fix);
            hitobj_i += 1;
        } else {
            keydown_i += 1;
        }
    }

    for (i, &was_hit) in hit.iter().enumerate() {
        if !was_hit && !hitobjects[i].is_spinner() {
            out.push(Judgment::Miss(hitobjects[i]));
        }
    }
    out
}

/// Step 5 of spec.md §4.11: once a hitobject is resolved, a post-fix slider
/// releases notelock immediately, so fast-forward past every keydown still
/// inside its (already-closed) notelock window rather than consuming just
/// one. Circles (and anything pre-fix) only ever consume the one press that
/// resolved them.
fn advance_keydown_past_notelock(
    keydown_i: &mut usize,
    keydowns: &[(i32, Point<f64>)],
    ho: Hitobject,
    notelock_end: i32,
    post_fix: bool,
) {
    if post_fix && ho.is_slider() {
        while *keydown_i < keydowns.len() && keydowns[*keydown_i].0 < notelock_end {
            *keydown_i += 1;
        }
    } else {
        *keydown_i += 1;
    }
}

/// The [`Hit`]s among `judgments(replay, beatmap)`, in order.
pub fn hits(replay: &Replay, beatmap: &Beatmap) -> Vec<Hit> {
    judgments(replay, beatmap)
        .into_iter()
        .filter_map(|j| match j {
            Judgment::Hit(hit) => Some(hit),
            Judgment::Miss(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Mode;
    use crate::game_version::GameVersion;
    use crate::weight::RatelimitWeight;

    fn beatmap_of(hit_objects: Vec<Hitobject>) -> Beatmap {
        Beatmap {
            cs: 4.0,
            ar: 9.0,
            od: 8.0,
            hp: 5.0,
            hit_objects,
        }
    }

    fn replay_of(t: Vec<i32>, xy: Vec<Point<f64>>, k: Vec<u32>) -> Replay {
        Replay {
            timestamp: None,
            beatmap_id: None,
            user_id: None,
            username: None,
            mods: Some(Mods::NONE),
            replay_id: None,
            weight: RatelimitWeight::None,
            game_version: GameVersion::Known {
                version: 20220101,
                concrete: true,
            },
            t,
            xy,
            k,
        }
    }

    #[test]
    fn perfect_click_is_hit300() {
        let bm = beatmap_of(vec![Hitobject::Circle {
            t: 1000,
            xy: Point::new(256.0, 192.0),
            radius: 30.0,
        }]);
        let replay = replay_of(
            vec![984, 1000, 1016],
            vec![
                Point::new(256.0, 192.0),
                Point::new(256.0, 192.0),
                Point::new(256.0, 192.0),
            ],
            vec![0, 4, 4],
        );
        let js = judgments(&replay, &bm);
        assert_eq!(js.len(), 1);
        match js[0] {
            Judgment::Hit(hit) => assert_eq!(hit.hit_type, HitType::Hit300),
            _ => panic!("expected a hit"),
        }
    }

    #[test]
    fn never_clicked_circle_is_a_miss() {
        let bm = beatmap_of(vec![Hitobject::Circle {
            t: 1000,
            xy: Point::new(256.0, 192.0),
            radius: 30.0,
        }]);
        let replay = replay_of(vec![0], vec![Point::new(0.0, 0.0)], vec![0]);
        let js = judgments(&replay, &bm);
        assert_eq!(js.len(), 1);
        assert!(matches!(js[0], Judgment::Miss(_)));
    }

    #[test]
    fn spinners_never_produce_a_judgment() {
        let bm = beatmap_of(vec![Hitobject::Spinner {
            t: 1000,
            xy: Point::new(256.0, 192.0),
            end_time: 2000,
        }]);
        let replay = replay_of(vec![0], vec![Point::new(0.0, 0.0)], vec![0]);
        assert!(judgments(&replay, &bm).is_empty());
    }

    #[test]
    fn total_judgments_excludes_spinners() {
        let bm = beatmap_of(vec![
            Hitobject::Circle {
                t: 1000,
                xy: Point::new(100.0, 100.0),
                radius: 30.0,
            },
            Hitobject::Spinner {
                t: 2000,
                xy: Point::new(256.0, 192.0),
                end_time: 3000,
            },
            Hitobject::Circle {
                t: 4000,
                xy: Point::new(200.0, 200.0),
                radius: 30.0,
            },
        ]);
        let replay = replay_of(vec![0], vec![Point::new(0.0, 0.0)], vec![0]);
        assert_eq!(judgments(&replay, &bm).len(), 2);
    }

    #[test]
    fn sliderbug_fix_gives_circles_a_one_ms_tail() {
        let fixed = GameVersion::Known {
            version: VERSION_SLIDERBUG_FIXED_STABLE,
            concrete: false,
        };
        let unfixed = GameVersion::Known {
            version: VERSION_SLIDERBUG_FIXED_STABLE - 1,
            concrete: false,
        };
        assert!(is_post_sliderbug_fix(fixed));
        assert!(!is_post_sliderbug_fix(unfixed));
    }

    #[test]
    fn unavailable_version_assumes_fixed() {
        assert!(is_post_sliderbug_fix(GameVersion::Unknown));
    }

    #[test]
    fn concrete_version_uses_the_cutting_edge_threshold() {
        let fixed = GameVersion::Known {
            version: VERSION_SLIDERBUG_FIXED_CUTTING_EDGE,
            concrete: true,
        };
        let unfixed = GameVersion::Known {
            version: VERSION_SLIDERBUG_FIXED_CUTTING_EDGE - 1,
            concrete: true,
        };
        assert!(is_post_sliderbug_fix(fixed));
        assert!(!is_post_sliderbug_fix(unfixed));
    }

    #[test]
    fn concrete_version_between_cutting_edge_and_stable_is_post_fix() {
        let version = GameVersion::Known {
            version: VERSION_SLIDERBUG_FIXED_CUTTING_EDGE + 1,
            concrete: true,
        };
        assert!(is_post_sliderbug_fix(version));
    }

    #[test]
    fn hit_error_sign_is_negative_when_early() {
        let ho = Hitobject::Circle {
            t: 1000,
            xy: Point::new(0.0, 0.0),
            radius: 30.0,
        };
        let hit = Hit {
            hitobject: ho,
            t: 990,
            xy: Point::new(0.0, 0.0),
            hit_type: HitType::Hit300,
        };
        assert_eq!(hit.error(), -10);
    }

    #[test]
    fn hits_on_std_mode_only() {
        // sanity: Mode::Osu is the only mode this engine is ever fed, per
        // the replay normalization boundary upstream.
        assert!(Mode::Osu.is_std());
    }
}
