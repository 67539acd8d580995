#![allow(dead_code)]

pub const FLOAT_ERROR_32: f32 = 0.001;
pub const FLOAT_ERROR_64: f64 = 0.001;

pub fn compare_eq_f32(a: f32, b: f32) -> bool {
    (a - b).abs() < FLOAT_ERROR_32
}

pub fn compare_eq_f64(a: f64, b: f64) -> bool {
    (a - b).abs() < FLOAT_ERROR_64
}

/// Rounds a value through an `f32` and back, matching the precision loss
/// stable's client incurs by storing difficulty stats as single-precision
/// floats before the calculation is ever performed.
pub fn round_trip_f32(x: f64) -> f64 {
    x as f32 as f64
}
