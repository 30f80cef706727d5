//! Verbosity of FFmpeg's own console logger.
//!
//! FFmpeg prints through `av_log`, independently of the [`log`] facade used by
//! this crate. Container dumps ([`SessionOptions::dump_format`](crate::SessionOptions::dump_format))
//! and encoder diagnostics go there, so they are only visible at
//! [`FfmpegLogLevel::Info`] or more verbose.
//!
//! ```no_run
//! use yuvenc::FfmpegLogLevel;
//!
//! let level: FfmpegLogLevel = "error".parse().unwrap();
//! yuvenc::set_ffmpeg_log_level(level);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::util::log::Level;

use crate::error::EncodeError;

/// FFmpeg log verbosity, quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FfmpegLogLevel {
    /// Nothing at all.
    Quiet,
    /// Unrecoverable conditions right before an abort.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings; FFmpeg's default.
    Warning,
    /// Informational output, including format dumps.
    Info,
    /// Verbose informational output.
    Verbose,
    /// Debugging output.
    Debug,
    /// Everything.
    Trace,
}

const NAMES: [(FfmpegLogLevel, &str); 9] = [
    (FfmpegLogLevel::Quiet, "quiet"),
    (FfmpegLogLevel::Panic, "panic"),
    (FfmpegLogLevel::Fatal, "fatal"),
    (FfmpegLogLevel::Error, "error"),
    (FfmpegLogLevel::Warning, "warning"),
    (FfmpegLogLevel::Info, "info"),
    (FfmpegLogLevel::Verbose, "verbose"),
    (FfmpegLogLevel::Debug, "debug"),
    (FfmpegLogLevel::Trace, "trace"),
];

impl FfmpegLogLevel {
    /// Lower-case name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(level, _)| *level == self)
            .map_or("warning", |(_, name)| *name)
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = EncodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        let wanted = if wanted == "warn" { "warning".to_string() } else { wanted };
        NAMES
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(level, _)| *level)
            .ok_or_else(|| {
                EncodeError::Configuration(format!(
                    "unknown FFmpeg log level '{value}', expected one of: {}",
                    NAMES.map(|(_, name)| name).join(", ")
                ))
            })
    }
}

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl From<Level> for FfmpegLogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

/// Set FFmpeg's console verbosity. Does not affect the `log` facade.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.into());
}

/// Current FFmpeg console verbosity, or `None` if FFmpeg reports a value
/// between the named levels.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("ERROR".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Error);
        assert_eq!(" warn ".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Warning);
        assert_eq!("quiet".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Quiet);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let error = "loud".parse::<FfmpegLogLevel>().unwrap_err();
        assert!(error.to_string().contains("loud"));
    }

    #[test]
    fn display_matches_parse() {
        for (level, _) in NAMES {
            assert_eq!(level.to_string().parse::<FfmpegLogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn levels_order_from_quiet_to_trace() {
        assert!(FfmpegLogLevel::Quiet < FfmpegLogLevel::Error);
        assert!(FfmpegLogLevel::Info < FfmpegLogLevel::Trace);
    }
}
