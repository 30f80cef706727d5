//! The encoding backend capability set.
//!
//! [`EncodingSession`](crate::EncodingSession) never touches a multimedia
//! library directly. It drives a [`Backend`] and the handle types the backend
//! hands out:
//!
//! | Handle | Capabilities |
//! |--------|--------------|
//! | [`Muxer`] | container description, stream timebase, header, interleaved packet write, trailer, sink close |
//! | [`Encoder`] | send frame, send end-of-stream, receive packet |
//! | [`PlanarFrame`] | make writable, plane access, stride, presentation timestamp |
//! | [`EncodedPacket`] | timestamps, stream index, timebase rescale |
//!
//! Each handle releases its backend resources when dropped. The session
//! decides the order in which that happens.
//!
//! [`FfmpegBackend`](crate::FfmpegBackend) is the adapter over FFmpeg; tests
//! plug in scripted backends through the same traits.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

use crate::error::BackendResult;
use crate::rational::{Rational, rescale_opt};

/// Codec identity, named by FFmpeg's canonical codec name
/// (`"h264"`, `"hevc"`, `"mpeg2video"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodecId(Cow<'static, str>);

impl CodecId {
    /// MPEG-1 video.
    pub const MPEG1VIDEO: CodecId = CodecId(Cow::Borrowed("mpeg1video"));
    /// MPEG-2 video.
    pub const MPEG2VIDEO: CodecId = CodecId(Cow::Borrowed("mpeg2video"));
    /// MPEG-4 Part 2.
    pub const MPEG4: CodecId = CodecId(Cow::Borrowed("mpeg4"));
    /// H.264 / AVC.
    pub const H264: CodecId = CodecId(Cow::Borrowed("h264"));
    /// H.265 / HEVC.
    pub const HEVC: CodecId = CodecId(Cow::Borrowed("hevc"));
    /// VP8.
    pub const VP8: CodecId = CodecId(Cow::Borrowed("vp8"));
    /// VP9.
    pub const VP9: CodecId = CodecId(Cow::Borrowed("vp9"));
    /// AV1.
    pub const AV1: CodecId = CodecId(Cow::Borrowed("av1"));

    /// A codec by name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        CodecId(name.into())
    }

    /// The canonical codec name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for CodecId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Pixel layout of the reusable frame. Only planar 4:2:0 is negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit planar YUV 4:2:0.
    #[default]
    Yuv420p,
}

/// What the backend knows about the negotiated container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFormat {
    /// Short container name (`"mp4"`, `"matroska"`, ...).
    pub name: String,
    /// The container's preferred video codec, if it has one.
    pub video_codec: Option<CodecId>,
    /// Codec parameter sets must be carried out-of-band.
    pub global_header: bool,
    /// The container writes through a file handle the session must close.
    pub needs_file: bool,
}

/// Parameters the negotiator hands to [`Backend::open_encoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderParameters {
    /// Codec to open.
    pub codec: CodecId,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Encoder timebase, `1/fps`.
    pub time_base: Rational,
    /// Frame rate, `fps/1`.
    pub frame_rate: Rational,
    /// Target bit rate in bits per second.
    pub bit_rate: usize,
    /// Maximum distance between key frames.
    pub gop_size: u32,
    /// Pixel format of submitted frames.
    pub pixel_format: PixelFormat,
    /// Mark the encoder as emitting global headers.
    pub global_header: bool,
    /// Codec-specific tuning, passed to the encoder as named options.
    pub options: BTreeMap<String, String>,
}

/// Outcome of asking the encoder for output.
#[derive(Debug)]
pub enum Received<P> {
    /// A packet is ready.
    Packet(P),
    /// Nothing is ready until more input (or end-of-stream) arrives.
    NotReady,
    /// The encoder is fully flushed.
    EndOfStream,
}

/// A compressed unit produced by the encoder.
pub trait EncodedPacket {
    /// Presentation timestamp.
    fn pts(&self) -> Option<i64>;
    /// Decode timestamp.
    fn dts(&self) -> Option<i64>;
    /// Duration in the packet's current timebase.
    fn duration(&self) -> i64;
    /// Payload size in bytes.
    fn size(&self) -> usize;
    /// Whether the packet starts a key frame.
    fn is_key(&self) -> bool;
    /// Assign the packet to an output stream.
    fn set_stream(&mut self, index: usize);
    /// Convert pts, dts, and duration between timebases.
    fn rescale_ts(&mut self, from: Rational, to: Rational);
}

/// The single reusable raw frame owned by a session.
pub trait PlanarFrame {
    /// Ensure no one else references the frame's buffers, copying them if
    /// they are still shared with a previously emitted unit.
    fn make_writable(&mut self) -> BackendResult<()>;
    /// Row pitch of `plane` in bytes.
    fn stride(&self, plane: usize) -> usize;
    /// Mutable bytes of `plane`, `stride * rows` long.
    fn plane_mut(&mut self, plane: usize) -> &mut [u8];
    /// Stamp the presentation timestamp.
    fn set_pts(&mut self, pts: i64);
}

/// An opened video encoder.
pub trait Encoder {
    /// Frame type accepted by [`send_frame`](Encoder::send_frame).
    type Frame: PlanarFrame;
    /// Packet type produced by [`receive_packet`](Encoder::receive_packet).
    type Packet: EncodedPacket;

    /// Timebase of produced packets.
    fn time_base(&self) -> Rational;
    /// Submit a frame. [`BackendErrorKind::WouldBlock`](crate::BackendErrorKind::WouldBlock)
    /// means the encoder must be drained first.
    fn send_frame(&mut self, frame: &Self::Frame) -> BackendResult<()>;
    /// Signal end-of-stream.
    fn send_eof(&mut self) -> BackendResult<()>;
    /// Fetch the next ready output unit.
    fn receive_packet(&mut self) -> BackendResult<Received<Self::Packet>>;
}

/// An output container context together with its sink.
pub trait Muxer {
    /// Packet type accepted by [`write_packet`](Muxer::write_packet).
    type Packet: EncodedPacket;

    /// Describe the negotiated container.
    fn container(&self) -> ContainerFormat;
    /// Timebase of `stream`, as chosen by the muxer.
    fn stream_time_base(&self, stream: usize) -> Option<Rational>;
    /// Write the container header.
    fn write_header(&mut self) -> BackendResult<()>;
    /// Write one packet, interleaving as the container requires.
    fn write_packet(&mut self, packet: &mut Self::Packet) -> BackendResult<()>;
    /// Write trailer and index structures.
    fn write_trailer(&mut self) -> BackendResult<()>;
    /// Close the sink. Only called when the container owns a file handle.
    fn close_sink(&mut self) -> BackendResult<()>;
    /// Print the negotiated layout through the backend's own logger.
    fn dump(&self, _destination: &Path) {}
}

/// Factory for the handles of one encoding session.
pub trait Backend {
    /// Raw frame handle.
    type Frame: PlanarFrame;
    /// Encoded packet handle.
    type Packet: EncodedPacket;
    /// Encoder handle.
    type Encoder: Encoder<Frame = Self::Frame, Packet = Self::Packet>;
    /// Container handle.
    type Muxer: Muxer<Packet = Self::Packet>;

    /// Allocate an output context for `destination` and open its sink.
    ///
    /// With `container == None` the format is deduced from the destination
    /// name, failing with [`BackendErrorKind::UnknownFormat`](crate::BackendErrorKind::UnknownFormat)
    /// when that is impossible.
    fn open_output(
        &mut self,
        destination: &Path,
        container: Option<&str>,
    ) -> BackendResult<Self::Muxer>;

    /// Whether an encoder for `codec` is available.
    fn has_encoder(&self, codec: &CodecId) -> bool;

    /// Add a video stream for `codec` with the given initial timebase.
    /// Returns the stream index.
    fn add_stream(
        &mut self,
        muxer: &mut Self::Muxer,
        codec: &CodecId,
        time_base: Rational,
    ) -> BackendResult<usize>;

    /// Open an encoder and copy its parameters into `stream`.
    fn open_encoder(
        &mut self,
        muxer: &mut Self::Muxer,
        stream: usize,
        parameters: &EncoderParameters,
    ) -> BackendResult<Self::Encoder>;

    /// Allocate the reusable frame with buffers aligned to `align` bytes.
    fn alloc_frame(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
        align: u32,
    ) -> BackendResult<Self::Frame>;
}

/// Rescale the timestamps of a plain packet description. Helper for
/// [`EncodedPacket::rescale_ts`] implementations that store raw values.
pub fn rescale_packet_times(
    pts: &mut Option<i64>,
    dts: &mut Option<i64>,
    duration: &mut i64,
    from: Rational,
    to: Rational,
) {
    *pts = rescale_opt(*pts, from, to);
    *dts = rescale_opt(*dts, from, to);
    if *duration > 0 {
        *duration = crate::rational::rescale(*duration, from, to);
    }
}
