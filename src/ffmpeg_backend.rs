//! FFmpeg implementation of the encoding backend.
//!
//! [`FfmpegBackend`] maps every [`Backend`] capability onto `ffmpeg-next`:
//!
//! | Capability | FFmpeg |
//! |------------|--------|
//! | open output | `av_guess_format`, `avformat_alloc_output_context2`, `avio_open` |
//! | find encoder | `avcodec_find_encoder` |
//! | add stream | `avformat_new_stream` |
//! | open encoder | `avcodec_open2` + `avcodec_parameters_from_context` |
//! | allocate frame | `av_frame_get_buffer` |
//! | make writable | `av_frame_make_writable` |
//! | send / receive | `avcodec_send_frame`, `avcodec_receive_packet` |
//! | write | `av_interleaved_write_frame`, header, trailer |
//! | close sink | `avio_closep` |
//!
//! Handles free their FFmpeg objects on drop.

use std::ffi::CString;
use std::path::Path;
use std::ptr;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::encoder::video::Encoder as OpenedVideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::util::error::{EAGAIN, ENOMEM};
use ffmpeg_next::{Dictionary, Error as FfmpegError, Packet};

use crate::backend::{
    Backend, CodecId, ContainerFormat, EncodedPacket, Encoder, EncoderParameters, Muxer,
    PixelFormat, PlanarFrame, Received,
};
use crate::error::{BackendError, BackendErrorKind, BackendResult, EncodeError};
use crate::rational::Rational;

impl From<Rational> for ffmpeg_next::Rational {
    fn from(rational: Rational) -> Self {
        ffmpeg_next::Rational::new(rational.num, rational.den)
    }
}

impl From<ffmpeg_next::Rational> for Rational {
    fn from(rational: ffmpeg_next::Rational) -> Self {
        Rational::new(rational.numerator(), rational.denominator())
    }
}

impl From<PixelFormat> for Pixel {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Yuv420p => Pixel::YUV420P,
        }
    }
}

/// Classify an FFmpeg error.
fn backend_error(context: &str, error: FfmpegError) -> BackendError {
    let kind = match error {
        FfmpegError::Eof => BackendErrorKind::EndOfStream,
        FfmpegError::Other { errno } if errno == EAGAIN => BackendErrorKind::WouldBlock,
        FfmpegError::Other { errno } if errno == ENOMEM => BackendErrorKind::Allocation,
        _ => BackendErrorKind::Other,
    };
    BackendError::new(kind, format!("{context}: {error}"))
}

/// Map a codec name to FFmpeg's codec id through the codec descriptor table.
fn codec_to_id(codec: &CodecId) -> Option<Id> {
    let name = CString::new(codec.name()).ok()?;
    // SAFETY: `name` is a valid NUL-terminated string; descriptors are static.
    let descriptor = unsafe { ffmpeg_sys_next::avcodec_descriptor_get_by_name(name.as_ptr()) };
    if descriptor.is_null() {
        return None;
    }
    // SAFETY: checked non-null above.
    Some(Id::from(unsafe { (*descriptor).id }))
}

fn id_to_codec(id: Id) -> Option<CodecId> {
    if id == Id::None {
        None
    } else {
        Some(CodecId::new(id.name()))
    }
}

/// Whether FFmpeg can deduce a container from the destination name.
fn format_known(destination: &Path) -> bool {
    let Some(name) = destination.to_str().and_then(|s| CString::new(s).ok()) else {
        return false;
    };
    // SAFETY: `name` outlives the call; null short name and MIME type are allowed.
    let format =
        unsafe { ffmpeg_sys_next::av_guess_format(ptr::null(), name.as_ptr(), ptr::null()) };
    !format.is_null()
}

/// Encoding backend backed by the system FFmpeg libraries.
#[derive(Debug)]
pub struct FfmpegBackend {
    _initialized: (),
}

impl FfmpegBackend {
    /// Initialise FFmpeg.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Negotiation`] if the libraries fail to
    /// initialise.
    pub fn new() -> Result<Self, EncodeError> {
        ffmpeg_next::init().map_err(|e| EncodeError::Negotiation {
            stage: "initialising FFmpeg",
            reason: e.to_string(),
        })?;
        Ok(Self { _initialized: () })
    }
}

/// FFmpeg output context plus its sink.
pub struct FfmpegMuxer {
    output: Output,
}

/// Opened FFmpeg video encoder.
pub struct FfmpegEncoder {
    encoder: OpenedVideoEncoder,
    time_base: Rational,
}

impl Backend for FfmpegBackend {
    type Frame = VideoFrame;
    type Packet = Packet;
    type Encoder = FfmpegEncoder;
    type Muxer = FfmpegMuxer;

    fn open_output(
        &mut self,
        destination: &Path,
        container: Option<&str>,
    ) -> BackendResult<FfmpegMuxer> {
        let output = match container {
            Some(name) => ffmpeg_next::format::output_as(destination, name)
                .map_err(|e| backend_error(&format!("cannot open output as '{name}'"), e))?,
            None => {
                if !format_known(destination) {
                    return Err(BackendError::new(
                        BackendErrorKind::UnknownFormat,
                        format!("no container matches {}", destination.display()),
                    ));
                }
                ffmpeg_next::format::output(destination)
                    .map_err(|e| backend_error("cannot open output", e))?
            }
        };
        Ok(FfmpegMuxer { output })
    }

    fn has_encoder(&self, codec: &CodecId) -> bool {
        codec_to_id(codec)
            .and_then(ffmpeg_next::encoder::find)
            .is_some()
    }

    fn add_stream(
        &mut self,
        muxer: &mut FfmpegMuxer,
        codec: &CodecId,
        time_base: Rational,
    ) -> BackendResult<usize> {
        let encoder_codec = codec_to_id(codec)
            .and_then(ffmpeg_next::encoder::find)
            .ok_or_else(|| BackendError::other(format!("could not find encoder for '{codec}'")))?;

        let mut stream = muxer
            .output
            .add_stream(encoder_codec)
            .map_err(|e| backend_error("could not allocate stream", e))?;
        stream.set_time_base(time_base);
        Ok(stream.index())
    }

    fn open_encoder(
        &mut self,
        muxer: &mut FfmpegMuxer,
        stream: usize,
        parameters: &EncoderParameters,
    ) -> BackendResult<FfmpegEncoder> {
        let encoder_codec = codec_to_id(&parameters.codec)
            .and_then(ffmpeg_next::encoder::find)
            .ok_or_else(|| {
                BackendError::other(format!(
                    "could not find encoder for '{}'",
                    parameters.codec
                ))
            })?;

        let mut encoder = CodecContext::new_with_codec(encoder_codec)
            .encoder()
            .video()
            .map_err(|e| backend_error("could not alloc an encoding context", e))?;

        encoder.set_width(parameters.width);
        encoder.set_height(parameters.height);
        encoder.set_format(parameters.pixel_format.into());
        encoder.set_time_base(parameters.time_base);
        encoder.set_frame_rate(Some(parameters.frame_rate));
        encoder.set_bit_rate(parameters.bit_rate);
        encoder.set_gop(parameters.gop_size);

        if parameters.global_header {
            // SAFETY: the context is allocated and not yet opened.
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut options = Dictionary::new();
        for (key, value) in &parameters.options {
            options.set(key, value);
        }

        let encoder = encoder
            .open_as_with(encoder_codec, options)
            .map_err(|e| backend_error("could not open video codec", e))?;

        let mut output_stream = muxer
            .output
            .stream_mut(stream)
            .ok_or_else(|| BackendError::other(format!("stream {stream} does not exist")))?;
        output_stream.set_parameters(&encoder);

        Ok(FfmpegEncoder {
            encoder,
            time_base: parameters.time_base,
        })
    }

    fn alloc_frame(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
        align: u32,
    ) -> BackendResult<VideoFrame> {
        let mut frame = VideoFrame::empty();
        frame.set_format(format.into());
        frame.set_width(width);
        frame.set_height(height);

        // SAFETY: format and dimensions are set; the frame owns no buffers yet.
        let status =
            unsafe { ffmpeg_sys_next::av_frame_get_buffer(frame.as_mut_ptr(), align as i32) };
        if status < 0 {
            return Err(BackendError::allocation(format!(
                "could not allocate frame data: {}",
                FfmpegError::from(status)
            )));
        }
        Ok(frame)
    }
}

impl Muxer for FfmpegMuxer {
    type Packet = Packet;

    fn container(&self) -> ContainerFormat {
        let format = self.output.format();
        let flags = format.flags();
        // SAFETY: the output format descriptor is static for the context's lifetime.
        let video_codec = Id::from(unsafe { (*format.as_ptr()).video_codec });

        ContainerFormat {
            name: format.name().to_string(),
            video_codec: id_to_codec(video_codec),
            global_header: flags.contains(FormatFlags::GLOBAL_HEADER),
            needs_file: !flags.contains(FormatFlags::NO_FILE),
        }
    }

    fn stream_time_base(&self, stream: usize) -> Option<Rational> {
        self.output
            .stream(stream)
            .map(|stream| stream.time_base().into())
    }

    fn write_header(&mut self) -> BackendResult<()> {
        self.output
            .write_header()
            .map_err(|e| backend_error("error occurred when opening output file", e))
    }

    fn write_packet(&mut self, packet: &mut Packet) -> BackendResult<()> {
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| backend_error("could not write packet", e))
    }

    fn write_trailer(&mut self) -> BackendResult<()> {
        self.output
            .write_trailer()
            .map_err(|e| backend_error("could not write trailer", e))
    }

    fn close_sink(&mut self) -> BackendResult<()> {
        // SAFETY: `pb` was opened by `avio_open`; `avio_closep` nulls it, so
        // the context destructor will not close it again.
        let status = unsafe { ffmpeg_sys_next::avio_closep(&mut (*self.output.as_mut_ptr()).pb) };
        if status < 0 {
            return Err(backend_error("could not close output", FfmpegError::from(status)));
        }
        Ok(())
    }

    fn dump(&self, destination: &Path) {
        ffmpeg_next::format::context::output::dump(&self.output, 0, destination.to_str());
    }
}

impl Encoder for FfmpegEncoder {
    type Frame = VideoFrame;
    type Packet = Packet;

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_frame(&mut self, frame: &VideoFrame) -> BackendResult<()> {
        self.encoder
            .send_frame(frame)
            .map_err(|e| backend_error("error sending a frame for encoding", e))
    }

    fn send_eof(&mut self) -> BackendResult<()> {
        self.encoder
            .send_eof()
            .map_err(|e| backend_error("error flushing the encoder", e))
    }

    fn receive_packet(&mut self) -> BackendResult<Received<Packet>> {
        let mut packet = Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Received::Packet(packet)),
            Err(FfmpegError::Other { errno }) if errno == EAGAIN => Ok(Received::NotReady),
            Err(FfmpegError::Eof) => Ok(Received::EndOfStream),
            Err(e) => Err(backend_error("error encoding video frame", e)),
        }
    }
}

impl EncodedPacket for Packet {
    fn pts(&self) -> Option<i64> {
        Packet::pts(self)
    }

    fn dts(&self) -> Option<i64> {
        Packet::dts(self)
    }

    fn duration(&self) -> i64 {
        Packet::duration(self)
    }

    fn size(&self) -> usize {
        Packet::size(self)
    }

    fn is_key(&self) -> bool {
        Packet::is_key(self)
    }

    fn set_stream(&mut self, index: usize) {
        Packet::set_stream(self, index);
    }

    fn rescale_ts(&mut self, from: Rational, to: Rational) {
        Packet::rescale_ts(self, from, to);
    }
}

impl PlanarFrame for VideoFrame {
    fn make_writable(&mut self) -> BackendResult<()> {
        // SAFETY: the frame was allocated by `alloc_frame`.
        let status = unsafe { ffmpeg_sys_next::av_frame_make_writable(self.as_mut_ptr()) };
        if status < 0 {
            return Err(backend_error(
                "error while making frame writable",
                FfmpegError::from(status),
            ));
        }
        Ok(())
    }

    fn stride(&self, plane: usize) -> usize {
        VideoFrame::stride(self, plane)
    }

    fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        VideoFrame::data_mut(self, plane)
    }

    fn set_pts(&mut self, pts: i64) {
        ffmpeg_next::Frame::set_pts(self, Some(pts));
    }
}
