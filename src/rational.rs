//! Timebase arithmetic.
//!
//! Every timestamp that crosses the session carries an implicit unit: the
//! encoder counts in `1/fps` ticks, while the muxer may pick a finer stream
//! timebase when the header is written (MP4 commonly uses `1/12800`).
//! [`Rational`] and [`rescale`] convert between the two without depending on
//! any backend type.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// A rational number used as a timebase or a frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// Numerator.
    pub num: i32,
    /// Denominator. A zero denominator marks an unset value.
    pub den: i32,
}

impl Rational {
    /// Create a new rational number.
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// The timebase of a constant frame rate stream: `1/fps`.
    pub const fn per_frame(fps: u32) -> Self {
        Self::new(1, fps as i32)
    }

    /// Swap numerator and denominator.
    pub const fn inverse(self) -> Self {
        Self::new(self.den, self.num)
    }

    /// Returns `true` when both terms are non-zero.
    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// Value as a floating point number, `0.0` when the denominator is zero.
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Convert `value` from timebase `from` to timebase `to`.
///
/// Computes `value * from / to` in 128-bit precision and rounds half away
/// from zero, which matches FFmpeg's `av_rescale_q`. Invalid timebases return
/// the value unchanged.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    if !from.is_valid() || !to.is_valid() {
        return value;
    }

    let mut numerator = value as i128 * from.num as i128 * to.den as i128;
    let mut denominator = from.den as i128 * to.num as i128;
    if denominator < 0 {
        denominator = -denominator;
        numerator = -numerator;
    }

    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };

    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Rescale an optional timestamp, leaving absent values absent.
pub fn rescale_opt(value: Option<i64>, from: Rational, to: Rational) -> Option<i64> {
    value.map(|value| rescale(value, from, to))
}
