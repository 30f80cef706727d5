//! Session configuration.
//!
//! [`SessionOptions`] carries every tunable the negotiator consults. The
//! defaults are 400 kb/s, a key frame at least every 12 frames, MP4 when the
//! destination name says nothing, and the per-codec tuning below.
//!
//! | codec | options |
//! |-------|---------|
//! | `mpeg2video` | `bf=2` (up to two B-frames) |
//! | `mpeg1video` | `mbd=2` (rate-distortion macroblock decision) |
//! | `h264` | `preset=slow`, `tune=zerolatency` |
//! | `hevc` | `preset=ultrafast`, `tune=zero-latency` |
//!
//! # Example
//!
//! ```
//! use yuvenc::{CodecId, SessionOptions};
//!
//! let options = SessionOptions::default()
//!     .bit_rate(2_000_000)
//!     .gop_size(25)
//!     .tune(CodecId::H264, "preset", "veryfast");
//!
//! assert_eq!(options.bit_rate, 2_000_000);
//! assert_eq!(
//!     options.tuning.options_for(&CodecId::H264).get("preset").map(String::as_str),
//!     Some("veryfast"),
//! );
//! ```

use std::collections::BTreeMap;

use crate::backend::CodecId;

/// Default target bit rate in bits per second.
pub const DEFAULT_BIT_RATE: usize = 400_000;
/// Default maximum distance between key frames.
pub const DEFAULT_GOP_SIZE: u32 = 12;
/// Container used when the destination name does not identify one.
pub const DEFAULT_FALLBACK_CONTAINER: &str = "mp4";
/// Default alignment of the reusable frame's buffers.
pub const DEFAULT_FRAME_ALIGNMENT: u32 = 32;

/// Codec-specific encoder options, keyed by codec family.
///
/// Entries are plain `{key: value}` strings handed to the encoder when it is
/// opened; the table itself has no behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningTable {
    entries: BTreeMap<CodecId, BTreeMap<String, String>>,
}

impl Default for TuningTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.set(CodecId::MPEG2VIDEO, "bf", "2");
        table.set(CodecId::MPEG1VIDEO, "mbd", "2");
        table.set(CodecId::H264, "preset", "slow");
        table.set(CodecId::H264, "tune", "zerolatency");
        table.set(CodecId::HEVC, "preset", "ultrafast");
        table.set(CodecId::HEVC, "tune", "zero-latency");
        table
    }
}

impl TuningTable {
    /// A table without any entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Set one option for a codec family, replacing a previous value.
    pub fn set(&mut self, codec: CodecId, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(codec)
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Drop every option of a codec family.
    pub fn clear(&mut self, codec: &CodecId) {
        self.entries.remove(codec);
    }

    /// Options for `codec`; empty when the family has no entry.
    pub fn options_for(&self, codec: &CodecId) -> BTreeMap<String, String> {
        self.entries.get(codec).cloned().unwrap_or_default()
    }

    /// Codec families with at least one option.
    pub fn codecs(&self) -> impl Iterator<Item = &CodecId> {
        self.entries.keys()
    }
}

/// Options for [`EncodingSession::open_with`](crate::EncodingSession::open_with).
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Target bit rate in bits per second (default: 400 000).
    pub bit_rate: usize,
    /// Maximum distance between key frames (default: 12).
    pub gop_size: u32,
    /// Container used when the destination name is not conclusive
    /// (default: `"mp4"`).
    pub fallback_container: String,
    /// Force a container by short name instead of deducing it.
    pub container: Option<String>,
    /// Use this codec instead of the container's preferred one.
    pub codec: Option<CodecId>,
    /// Codec-specific tuning.
    pub tuning: TuningTable,
    /// Buffer alignment of the reusable frame in bytes (default: 32).
    pub frame_alignment: u32,
    /// Print the negotiated layout through the backend after opening.
    pub dump_format: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            bit_rate: DEFAULT_BIT_RATE,
            gop_size: DEFAULT_GOP_SIZE,
            fallback_container: DEFAULT_FALLBACK_CONTAINER.to_string(),
            container: None,
            codec: None,
            tuning: TuningTable::default(),
            frame_alignment: DEFAULT_FRAME_ALIGNMENT,
            dump_format: false,
        }
    }
}

impl SessionOptions {
    /// Set the target bit rate.
    #[must_use]
    pub fn bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Set the maximum key frame distance.
    #[must_use]
    pub fn gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    /// Set the container used when the destination name is not conclusive.
    #[must_use]
    pub fn fallback_container(mut self, name: impl Into<String>) -> Self {
        self.fallback_container = name.into();
        self
    }

    /// Force the output container.
    #[must_use]
    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.container = Some(name.into());
        self
    }

    /// Override the container's preferred codec.
    #[must_use]
    pub fn codec(mut self, codec: CodecId) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Add or replace one tuning option.
    #[must_use]
    pub fn tune(mut self, codec: CodecId, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tuning.set(codec, key, value);
        self
    }

    /// Replace the whole tuning table.
    #[must_use]
    pub fn tuning(mut self, tuning: TuningTable) -> Self {
        self.tuning = tuning;
        self
    }

    /// Set the frame buffer alignment.
    #[must_use]
    pub fn frame_alignment(mut self, align: u32) -> Self {
        self.frame_alignment = align;
        self
    }

    /// Dump the negotiated layout after opening.
    #[must_use]
    pub fn dump_format(mut self, dump: bool) -> Self {
        self.dump_format = dump;
        self
    }
}
