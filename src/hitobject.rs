//! The narrow hitobject view the judgment and snap-detection engines need:
//! just enough geometry and timing to classify a click, never the full
//! `.osu` beatmap geometry (parsing `.osu` files is out of scope — see
//! `crate::beatmap`).

use crate::math::Point;

/// A single hittable object, already resolved to the coordinates and
/// timings the judgment engine needs (no slider-path or timing-point
/// lookups are performed here; a beatmap loader upstream of this crate is
/// expected to have resolved them).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Hitobject {
    /// A circle: a single point in time and space.
    Circle {
        /// Hit time, in ms.
        t: i32,
        /// Center position.
        xy: Point<f64>,
        /// Hit radius in osu!pixels, after CS scaling.
        radius: f64,
    },
    /// A slider: a sliderhead (judged like a circle) that additionally
    /// occupies time until `end_time`.
    Slider {
        /// Sliderhead time, in ms.
        t: i32,
        /// Sliderhead position.
        xy: Point<f64>,
        /// Hit radius in osu!pixels, after CS scaling.
        radius: f64,
        /// The time, in ms, the slider's body is resolved (last tick/repeat).
        end_time: i32,
    },
    /// A spinner: never judged as a Hit/Miss by position, only occupies a
    /// time interval for notelock purposes.
    Spinner {
        /// Start time, in ms.
        t: i32,
        /// Nominal position (spinners are centered on the playfield; kept
        /// for API uniformity, unused by the judgment engine's distance
        /// check since spinners are excluded from it).
        xy: Point<f64>,
        /// The time, in ms, the spinner ends.
        end_time: i32,
    },
}

impl Hitobject {
    /// The time this hitobject's head is first interactable, in ms.
    pub fn time(&self) -> i32 {
        match *self {
            Hitobject::Circle { t, .. } => t,
            Hitobject::Slider { t, .. } => t,
            Hitobject::Spinner { t, .. } => t,
        }
    }

    /// The object's nominal position (meaningless for spinners).
    pub fn xy(&self) -> Point<f64> {
        match *self {
            Hitobject::Circle { xy, .. } => xy,
            Hitobject::Slider { xy, .. } => xy,
            Hitobject::Spinner { xy, .. } => xy,
        }
    }

    /// The hit radius in osu!pixels (meaningless for spinners).
    pub fn radius(&self) -> f64 {
        match *self {
            Hitobject::Circle { radius, .. } => radius,
            Hitobject::Slider { radius, .. } => radius,
            Hitobject::Spinner { .. } => 0.0,
        }
    }

    /// The time, in ms, at which the object's body is fully resolved
    /// (equal to `time()` for circles).
    pub fn end_time(&self) -> i32 {
        match *self {
            Hitobject::Circle { t, .. } => t,
            Hitobject::Slider { end_time, .. } => end_time,
            Hitobject::Spinner { end_time, .. } => end_time,
        }
    }

    /// Whether this is a spinner (excluded from click-distance checks and
    /// from UR/miss accounting).
    pub fn is_spinner(&self) -> bool {
        matches!(self, Hitobject::Spinner { .. })
    }

    /// Whether this is a slider (its head is always judged Hit300).
    pub fn is_slider(&self) -> bool {
        matches!(self, Hitobject::Slider { .. })
    }
}
