//! # yuvenc
//!
//! Feed raw YUV 4:2:0 frames, get an encoded video file.
//!
//! `yuvenc` wraps an FFmpeg encode-and-mux pipeline behind one owned value,
//! [`EncodingSession`]. The destination file name picks the container, the
//! container picks the codec, and every submitted frame gets the next
//! presentation timestamp at a constant frame rate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use yuvenc::{EncodingSession, TestPattern};
//!
//! let pattern = TestPattern::new(352, 288);
//! let mut session = EncodingSession::open("out.mp4", 352, 288, 25)?;
//! for index in 0..25 {
//!     session.submit_frame(&pattern.frame(index).buffer())?;
//! }
//! session.close()?;
//! # Ok::<(), yuvenc::EncodeError>(())
//! ```
//!
//! ## Tuning
//!
//! ```no_run
//! use yuvenc::{CodecId, EncodingSession, FfmpegBackend, SessionOptions};
//!
//! let options = SessionOptions::default()
//!     .bit_rate(1_500_000)
//!     .container("matroska")
//!     .tune(CodecId::H264, "preset", "fast");
//! let session = EncodingSession::open_with(
//!     FfmpegBackend::new()?,
//!     "out.bin",
//!     1280,
//!     720,
//!     30,
//!     &options,
//! )?;
//! # Ok::<(), yuvenc::EncodeError>(())
//! ```
//!
//! ## Backends
//!
//! The session talks to FFmpeg through the [`Backend`] trait family, so it
//! can be driven by any implementation of those traits. [`FfmpegBackend`] is
//! the only one shipped.
//!
//! ## Requirements
//!
//! FFmpeg development libraries (libavcodec, libavformat, libavutil,
//! libswscale) must be installed on the system.

pub mod backend;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod ffmpeg_backend;
pub mod pattern;
pub mod planes;
pub mod probe;
pub mod rational;
pub mod session;
mod utilities;

pub use backend::{
    Backend, CodecId, ContainerFormat, EncodedPacket, Encoder, EncoderParameters, Muxer,
    PixelFormat, PlanarFrame, Received, rescale_packet_times,
};
pub use config::{
    DEFAULT_BIT_RATE, DEFAULT_FALLBACK_CONTAINER, DEFAULT_FRAME_ALIGNMENT, DEFAULT_GOP_SIZE,
    SessionOptions, TuningTable,
};
pub use error::{BackendError, BackendErrorKind, BackendResult, EncodeError};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use ffmpeg_backend::{FfmpegBackend, FfmpegEncoder, FfmpegMuxer};
pub use pattern::{PatternFrame, TestPattern};
pub use planes::{FrameBuffer, Plane, U_PLANE, V_PLANE, Y_PLANE};
pub use probe::{DecodedFrame, ProbeReport};
pub use rational::{Rational, rescale, rescale_opt};
pub use session::{EncodingSession, SessionSummary};
