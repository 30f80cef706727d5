//! Inspection of encoded files.
//!
//! [`probe`] reads the container without decoding and summarises the first
//! video stream. [`decode_frames`] decodes that stream back into packed
//! YUV 4:2:0 planes, which is what the end-to-end tests and the CLI's
//! `probe --snapshot` use to check what a session wrote.
//!
//! # Example
//!
//! ```no_run
//! let report = yuvenc::probe::probe("out.mp4")?;
//! println!("{} / {}: {} packets", report.format, report.codec, report.packets);
//!
//! let frames = yuvenc::probe::decode_frames("out.mp4")?;
//! frames[0].save_luma("first.png")?;
//! # Ok::<(), yuvenc::EncodeError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Error as FfmpegError, Packet};
use image::GrayImage;

use crate::error::EncodeError;
use crate::rational::Rational;

/// Summary of the first video stream of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Container short name as reported by the demuxer (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format: String,
    /// Codec name of the video stream.
    pub codec: String,
    /// Coded width.
    pub width: u32,
    /// Coded height.
    pub height: u32,
    /// Average frame rate, `0/1` when unknown.
    pub frame_rate: Rational,
    /// Timebase of the video stream.
    pub time_base: Rational,
    /// Number of video packets.
    pub packets: u64,
    /// Number of video packets flagged as key frames.
    pub keyframes: u64,
    /// Container duration, or the packet span when the container has none.
    pub duration: Duration,
}

/// One decoded picture with tightly packed planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Presentation timestamp in the stream timebase.
    pub pts: Option<i64>,
    /// Whether the decoder reported a key frame.
    pub key: bool,
    /// Luma, `width * height` bytes.
    pub y: Vec<u8>,
    /// Blue-difference chroma, `width/2 * height/2` bytes.
    pub u: Vec<u8>,
    /// Red-difference chroma, `width/2 * height/2` bytes.
    pub v: Vec<u8>,
}

impl DecodedFrame {
    /// The luma plane as a grayscale image.
    pub fn luma_image(&self) -> Result<GrayImage, EncodeError> {
        GrayImage::from_raw(self.width, self.height, self.y.clone()).ok_or_else(|| {
            EncodeError::InvalidFrame(format!(
                "luma plane of {} bytes does not fit {}x{}",
                self.y.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Save the luma plane as an image; the format follows the extension.
    pub fn save_luma<P: AsRef<Path>>(&self, path: P) -> Result<(), EncodeError> {
        self.luma_image()?.save(path)?;
        Ok(())
    }
}

fn probe_error(path: &Path, reason: impl ToString) -> EncodeError {
    EncodeError::Probe {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn open_input(path: &Path) -> Result<(Input, usize), EncodeError> {
    ffmpeg_next::init().map_err(|e| probe_error(path, format!("FFmpeg initialisation failed: {e}")))?;
    let input = ffmpeg_next::format::input(&path).map_err(|e| probe_error(path, e))?;
    let index = input
        .streams()
        .best(Type::Video)
        .map(|stream| stream.index())
        .ok_or_else(|| probe_error(path, "no video stream"))?;
    Ok((input, index))
}

/// Summarise the first video stream of `path` without decoding it.
///
/// # Errors
///
/// [`EncodeError::Probe`] if the file cannot be opened, has no video stream,
/// or a packet cannot be read.
pub fn probe<P: AsRef<Path>>(path: P) -> Result<ProbeReport, EncodeError> {
    let path = path.as_ref();
    let (mut input, index) = open_input(path)?;

    let format = input.format().name().to_string();
    let (codec, width, height, frame_rate, time_base) = {
        let stream = input
            .stream(index)
            .ok_or_else(|| probe_error(path, "video stream disappeared"))?;
        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|e| probe_error(path, format!("cannot read codec parameters: {e}")))?;
        (
            stream.parameters().id().name().to_string(),
            decoder.width(),
            decoder.height(),
            Rational::from(stream.avg_frame_rate()),
            Rational::from(stream.time_base()),
        )
    };

    let mut packets = 0u64;
    let mut keyframes = 0u64;
    let mut end = 0i64;
    let mut packet = Packet::empty();
    loop {
        match packet.read(&mut input) {
            Ok(()) => {
                if packet.stream() != index {
                    continue;
                }
                packets += 1;
                if packet.is_key() {
                    keyframes += 1;
                }
                if let Some(pts) = packet.pts() {
                    end = end.max(pts + packet.duration().max(0));
                }
            }
            Err(FfmpegError::Eof) => break,
            Err(e) => return Err(probe_error(path, e)),
        }
    }

    let container_micros = input.duration();
    let duration = if container_micros > 0 {
        Duration::from_micros(container_micros as u64)
    } else if time_base.is_valid() {
        Duration::from_secs_f64((end as f64 * time_base.as_f64()).max(0.0))
    } else {
        Duration::ZERO
    };

    log::debug!(
        "Probed {}: {format}/{codec} {width}x{height}, {packets} packets, {keyframes} key",
        path.display()
    );

    Ok(ProbeReport {
        format,
        codec,
        width,
        height,
        frame_rate,
        time_base,
        packets,
        keyframes,
        duration,
    })
}

/// Decode every picture of the first video stream of `path`, in output
/// order, converted to packed YUV 4:2:0.
///
/// # Errors
///
/// [`EncodeError::Probe`] if the file cannot be opened or decoding fails.
pub fn decode_frames<P: AsRef<Path>>(path: P) -> Result<Vec<DecodedFrame>, EncodeError> {
    let path = path.as_ref();
    let (mut input, index) = open_input(path)?;

    let parameters = input
        .stream(index)
        .ok_or_else(|| probe_error(path, "video stream disappeared"))?
        .parameters();
    let mut decoder = CodecContext::from_parameters(parameters)
        .and_then(|context| context.decoder().video())
        .map_err(|e| probe_error(path, format!("cannot create decoder: {e}")))?;

    let mut sink = FrameSink::new(path.to_path_buf(), &decoder)?;

    let mut packet = Packet::empty();
    loop {
        match packet.read(&mut input) {
            Ok(()) => {
                if packet.stream() != index {
                    continue;
                }
                decoder
                    .send_packet(&packet)
                    .map_err(|e| probe_error(path, format!("decoding failed: {e}")))?;
                sink.receive_all(&mut decoder)?;
            }
            Err(FfmpegError::Eof) => break,
            Err(e) => return Err(probe_error(path, e)),
        }
    }

    decoder
        .send_eof()
        .map_err(|e| probe_error(path, format!("flushing decoder failed: {e}")))?;
    sink.receive_all(&mut decoder)?;

    Ok(sink.frames)
}

/// Collects decoder output, converting to YUV420P when needed.
struct FrameSink {
    path: PathBuf,
    scaler: Option<ScalingContext>,
    decoded: VideoFrame,
    converted: VideoFrame,
    frames: Vec<DecodedFrame>,
}

impl FrameSink {
    fn new(
        path: PathBuf,
        decoder: &ffmpeg_next::decoder::Video,
    ) -> Result<Self, EncodeError> {
        let scaler = if decoder.format() == Pixel::YUV420P {
            None
        } else {
            Some(
                ScalingContext::get(
                    decoder.format(),
                    decoder.width(),
                    decoder.height(),
                    Pixel::YUV420P,
                    decoder.width(),
                    decoder.height(),
                    ScalingFlags::BILINEAR,
                )
                .map_err(|e| probe_error(&path, format!("cannot create scaler: {e}")))?,
            )
        };

        Ok(Self {
            path,
            scaler,
            decoded: VideoFrame::empty(),
            converted: VideoFrame::empty(),
            frames: Vec::new(),
        })
    }

    fn receive_all(&mut self, decoder: &mut ffmpeg_next::decoder::Video) -> Result<(), EncodeError> {
        while decoder.receive_frame(&mut self.decoded).is_ok() {
            let picture = match self.scaler.as_mut() {
                Some(scaler) => {
                    scaler
                        .run(&self.decoded, &mut self.converted)
                        .map_err(|e| probe_error(&self.path, format!("conversion failed: {e}")))?;
                    &self.converted
                }
                None => &self.decoded,
            };

            let width = picture.width();
            let height = picture.height();
            let (chroma_width, chroma_height) = (width as usize / 2, height as usize / 2);
            self.frames.push(DecodedFrame {
                width,
                height,
                pts: self.decoded.pts(),
                key: self.decoded.is_key(),
                y: pack_plane(picture, 0, width as usize, height as usize),
                u: pack_plane(picture, 1, chroma_width, chroma_height),
                v: pack_plane(picture, 2, chroma_width, chroma_height),
            });
        }
        Ok(())
    }
}

/// Strip row padding from one plane.
fn pack_plane(frame: &VideoFrame, plane: usize, row_bytes: usize, rows: usize) -> Vec<u8> {
    let stride = frame.stride(plane);
    let data = frame.data(plane);
    let mut packed = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        packed.extend_from_slice(&data[start..start + row_bytes]);
    }
    packed
}
