//! Internal utility functions.
//!
//! Timestamp rendering for packet logs, in the same shape FFmpeg's
//! `av_ts2str` / `av_ts2timestr` produce.

use crate::rational::Rational;

/// Marker printed for an absent timestamp.
pub(crate) const NO_TIMESTAMP: &str = "NOPTS";

/// Render a raw timestamp.
pub(crate) fn format_timestamp(timestamp: Option<i64>) -> String {
    match timestamp {
        Some(value) => value.to_string(),
        None => NO_TIMESTAMP.to_string(),
    }
}

/// Render a timestamp as seconds in `time_base`, with at most six
/// significant digits.
pub(crate) fn format_timestamp_time(timestamp: Option<i64>, time_base: Rational) -> String {
    let Some(value) = timestamp else {
        return NO_TIMESTAMP.to_string();
    };

    let seconds = value as f64 * time_base.as_f64();
    if seconds == 0.0 {
        return "0".to_string();
    }

    let magnitude = seconds.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).clamp(0, 17) as usize;
    let rendered = format!("{seconds:.decimals$}");
    if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_timestamps_render_as_nopts() {
        assert_eq!(format_timestamp(None), "NOPTS");
        assert_eq!(format_timestamp_time(None, Rational::new(1, 25)), "NOPTS");
    }

    #[test]
    fn timestamps_render_as_seconds() {
        assert_eq!(format_timestamp(Some(512)), "512");
        assert_eq!(format_timestamp_time(Some(512), Rational::new(1, 12800)), "0.04");
        assert_eq!(format_timestamp_time(Some(25), Rational::new(1, 25)), "1");
        assert_eq!(format_timestamp_time(Some(0), Rational::new(1, 25)), "0");
        assert_eq!(format_timestamp_time(Some(1), Rational::new(1, 3)), "0.333333");
    }
}
