//! Unstable rate, frametime, and the `cv`/`ucv` clock-rate statistic
//! conversion (spec.md §4.13, §4.14).

use crate::beatmap::Beatmap;
use crate::judgment::hits;
use crate::mods::Mods;
use crate::replay::Replay;

/// The conventional timewarp threshold: a legitimate median frametime sits
/// around 16.67ms (60fps-equivalent polling); anything reliably below this
/// is a sign of client-side time manipulation.
pub const FRAMETIME_LIMIT: f64 = 12.0;

/// Which direction [`convert_statistic`] rescales towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatTarget {
    /// Convert to the clock-rate-**c**orrected value, comparable across
    /// different DT/HT mod choices.
    Cv,
    /// Convert to the **u**ncorrected value, as actually measured against
    /// the replay's own (possibly sped-up or slowed-down) clock.
    Ucv,
}

/// The wall-clock rate `mods` plays the map at, relative to nomod.
fn clock_rate(mods: Mods) -> f64 {
    if mods.contains(Mods::DT) {
        1.5
    } else if mods.contains(Mods::HT) {
        0.75
    } else {
        1.0
    }
}

/// Rescales `stat` (e.g. a [`ur`] result) between its clock-rate-corrected
/// and uncorrected forms, per `mods`' DT/HT clock rate.
pub fn convert_statistic(stat: f64, mods: Mods, to: StatTarget) -> f64 {
    let rate = clock_rate(mods);
    match to {
        StatTarget::Cv => stat / rate,
        StatTarget::Ucv => stat * rate,
    }
}

/// Unstable rate: ten times the standard deviation of this replay's hit
/// errors against `beatmap`. When `adjusted`, outliers (per
/// [`filter_outliers`]) are dropped from the error distribution first.
pub fn ur(replay: &Replay, beatmap: &Beatmap, adjusted: bool) -> f64 {
    let errors: Vec<f64> = hits(replay, beatmap)
        .iter()
        .map(|hit| hit.error() as f64)
        .collect();
    let errors = if adjusted {
        filter_outliers(&errors)
    } else {
        errors
    };
    std_dev(&errors) * 10.0
}

/// Drops values outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`.
pub fn filter_outliers(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    let iqr = q3 - q1;
    let lo = q1 - 1.5 * iqr;
    let hi = q3 + 1.5 * iqr;
    values.iter().copied().filter(|&v| v >= lo && v <= hi).collect()
}

/// Linear-interpolated percentile (`numpy`'s default method) of an
/// already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p * (n as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// The frame-to-frame time deltas of a loaded replay, ms. One shorter than
/// `replay.t`.
pub fn frametimes(replay: &Replay) -> Vec<i64> {
    replay.t.windows(2).map(|w| (w[1] - w[0]) as i64).collect()
}

/// The median of [`frametimes`]; reliably below [`FRAMETIME_LIMIT`]
/// indicates timewarp.
pub fn frametime(replay: &Replay) -> f64 {
    median(&frametimes(replay))
}

fn median(values: &[i64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    }
}
