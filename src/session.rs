//! The raw-frame encoding session.
//!
//! [`EncodingSession`] turns a stream of planar YUV 4:2:0 images into an
//! encoded video file. Its lifecycle has three phases:
//!
//! 1. **Negotiation** ([`EncodingSession::open`]): pick the container from the
//!    destination name, pick its preferred codec, open the encoder, allocate
//!    one reusable frame, write the container header.
//! 2. **Submission** ([`EncodingSession::submit`]): copy one image into the
//!    reusable frame, stamp it with the next presentation timestamp, hand it
//!    to the encoder, and write every packet the encoder has ready.
//! 3. **Teardown** ([`EncodingSession::close`], or drop): flush the encoder,
//!    write the trailer, release everything in reverse acquisition order.
//!
//! # Example
//!
//! ```no_run
//! use yuvenc::{EncodeError, EncodingSession};
//!
//! let mut session = EncodingSession::open("out.mp4", 352, 288, 25)?;
//!
//! let y = vec![0u8; session.y_stride() * session.height() as usize];
//! let u = vec![128u8; session.u_stride() * session.height() as usize / 2];
//! let v = vec![128u8; session.v_stride() * session.height() as usize / 2];
//!
//! for _ in 0..25 {
//!     session.submit(&y, &u, &v)?;
//! }
//! let summary = session.close()?;
//! println!("{} packets written", summary.packets_written);
//! # Ok::<(), EncodeError>(())
//! ```

use std::path::{Path, PathBuf};

use crate::backend::{
    Backend, CodecId, ContainerFormat, EncodedPacket, Encoder, EncoderParameters, Muxer, PixelFormat,
    PlanarFrame, Received,
};
use crate::config::SessionOptions;
use crate::error::{BackendErrorKind, EncodeError};
use crate::ffmpeg_backend::FfmpegBackend;
use crate::planes::{
    FrameBuffer, Plane, PlaneGeometry, U_PLANE, V_PLANE, Y_PLANE, copy_plane, validate_plane,
};
use crate::rational::Rational;
use crate::utilities::{format_timestamp, format_timestamp_time};

/// Counters reported when a session is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSummary {
    /// Frames accepted by the encoder.
    pub frames_submitted: u64,
    /// Packets written to the destination, flush included.
    pub packets_written: u64,
}

/// Backend state owned by an open session.
///
/// Field order is drop order: encoder, then frame, then the container
/// context.
struct Handles<B: Backend> {
    encoder: B::Encoder,
    frame: B::Frame,
    muxer: B::Muxer,
    container: ContainerFormat,
    codec: CodecId,
    stream: usize,
    strides: [usize; 3],
}

/// A writer that encodes raw YUV 4:2:0 frames into a video file.
///
/// The session exclusively owns every backend handle it acquires. It is not
/// meant to be shared: submit frames from one thread at a time.
///
/// Dropping a session closes it. Call [`close`](EncodingSession::close) to
/// observe teardown errors and the final counters.
pub struct EncodingSession<B: Backend = FfmpegBackend> {
    backend: B,
    destination: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    next_pts: i64,
    packets_written: u64,
    unusable: bool,
    handles: Option<Handles<B>>,
}

impl EncodingSession<FfmpegBackend> {
    /// Open a session writing to `destination` through FFmpeg with default
    /// [`SessionOptions`].
    ///
    /// The container is deduced from the file name, falling back to MP4.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::Configuration`] for zero or odd dimensions, or a zero
    ///   frame rate.
    /// - [`EncodeError::UnsupportedCodec`] if no encoder exists for the
    ///   container's codec.
    /// - [`EncodeError::Negotiation`] / [`EncodeError::Resource`] if FFmpeg
    ///   fails during setup.
    pub fn open<P: AsRef<Path>>(
        destination: P,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, EncodeError> {
        let backend = FfmpegBackend::new()?;
        Self::open_with(backend, destination, width, height, fps, &SessionOptions::default())
    }
}

impl<B: Backend> EncodingSession<B> {
    /// Open a session on an arbitrary backend.
    ///
    /// On failure every handle acquired so far is released, in reverse
    /// order, before the error is returned.
    ///
    /// # Errors
    ///
    /// See [`EncodingSession::open`].
    pub fn open_with<P: AsRef<Path>>(
        mut backend: B,
        destination: P,
        width: u32,
        height: u32,
        fps: u32,
        options: &SessionOptions,
    ) -> Result<Self, EncodeError> {
        let destination = destination.as_ref().to_path_buf();
        validate_geometry(width, height, fps, options)?;

        let handles = negotiate(&mut backend, &destination, width, height, fps, options)?;

        log::info!(
            "Opened {:?} ({} / {}, {}x{} @ {} fps, strides {:?})",
            destination,
            handles.container.name,
            handles.codec,
            width,
            height,
            fps,
            handles.strides,
        );

        Ok(Self {
            backend,
            destination,
            width,
            height,
            fps,
            next_pts: 0,
            packets_written: 0,
            unusable: false,
            handles: Some(handles),
        })
    }

    /// Negotiated frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Negotiated frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frames per second.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Encoder timebase, `1/fps`.
    pub fn time_base(&self) -> Rational {
        Rational::per_frame(self.fps)
    }

    /// Destination the session writes to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The container negotiated for the destination, `None` once closed.
    pub fn container(&self) -> Option<&ContainerFormat> {
        self.handles.as_ref().map(|handles| &handles.container)
    }

    /// The codec the encoder was opened with, `None` once closed.
    pub fn codec(&self) -> Option<&CodecId> {
        self.handles.as_ref().map(|handles| &handles.codec)
    }

    /// Row pitch of the Y plane. Buffers passed to
    /// [`submit`](EncodingSession::submit) are laid out with this stride.
    pub fn y_stride(&self) -> usize {
        self.stride(Y_PLANE)
    }

    /// Row pitch of the U plane.
    pub fn u_stride(&self) -> usize {
        self.stride(U_PLANE)
    }

    /// Row pitch of the V plane.
    pub fn v_stride(&self) -> usize {
        self.stride(V_PLANE)
    }

    fn stride(&self, plane: usize) -> usize {
        self.handles
            .as_ref()
            .map_or(0, |handles| handles.strides[plane])
    }

    /// Presentation timestamp the next accepted frame will carry.
    pub fn next_pts(&self) -> i64 {
        self.next_pts
    }

    /// Frames accepted by the encoder so far.
    pub fn frames_submitted(&self) -> u64 {
        self.next_pts as u64
    }

    /// Packets written to the destination so far.
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// `false` once the session is closed or a write to the destination
    /// has failed.
    pub fn is_open(&self) -> bool {
        self.handles.is_some() && !self.unusable
    }

    /// Access the backend, e.g. to inspect an instrumented test backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Encode one image whose planes use the session's strides
    /// ([`y_stride`](EncodingSession::y_stride) and friends).
    ///
    /// Packets the encoder has ready are written before this returns; the
    /// encoder may also hold the frame back until later frames or the flush
    /// at close.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::InvalidFrame`] if a plane is too short.
    /// - [`EncodeError::EncoderBusy`] if the encoder refused the frame. Its
    ///   pending output has been written by the time this returns, so the
    ///   same frame can be submitted again; it is not counted.
    /// - [`EncodeError::Write`] if the destination rejected a packet. The
    ///   session is unusable afterwards.
    /// - [`EncodeError::Closed`] after close.
    pub fn submit(&mut self, y: &[u8], u: &[u8], v: &[u8]) -> Result<(), EncodeError> {
        let frame = FrameBuffer::new(
            Plane::new(y, self.y_stride()),
            Plane::new(u, self.u_stride()),
            Plane::new(v, self.v_stride()),
        );
        self.submit_frame(&frame)
    }

    /// Encode one image with caller-chosen strides, e.g. tightly packed
    /// planes built with [`FrameBuffer::packed`].
    ///
    /// # Errors
    ///
    /// See [`submit`](EncodingSession::submit).
    pub fn submit_frame(&mut self, image: &FrameBuffer<'_>) -> Result<(), EncodeError> {
        if self.unusable {
            return Err(EncodeError::Write {
                path: self.destination.clone(),
                reason: "session is unusable after an earlier write failure".to_string(),
            });
        }
        let handles = self.handles.as_mut().ok_or(EncodeError::Closed)?;

        let geometry = PlaneGeometry::new(self.width, self.height);
        for (plane, source) in image.planes().iter().enumerate() {
            let (row_bytes, rows) = geometry.extent(plane);
            validate_plane(plane, source, row_bytes, rows)?;
        }

        handles
            .frame
            .make_writable()
            .map_err(|e| EncodeError::Resource(format!("cannot make frame writable: {e}")))?;

        for (plane, source) in image.planes().iter().enumerate() {
            let (row_bytes, rows) = geometry.extent(plane);
            let stride = handles.frame.stride(plane);
            copy_plane(handles.frame.plane_mut(plane), stride, source, row_bytes, rows)?;
        }

        let pts = self.next_pts;
        handles.frame.set_pts(pts);
        log::debug!("Sending frame {pts} to {:?}", self.destination);

        let sent = match handles.encoder.send_frame(&handles.frame) {
            Ok(()) => {
                self.next_pts += 1;
                Ok(())
            }
            Err(e) => match e.into_encoding() {
                busy @ EncodeError::EncoderBusy(_) => {
                    log::debug!("Encoder refused frame {pts}, draining before retry");
                    Err(busy)
                }
                other => return Err(other),
            },
        };

        let written = drain(handles, &self.destination, &mut self.packets_written);
        if matches!(written, Err(EncodeError::Write { .. })) {
            self.unusable = true;
        }
        written.and(sent)
    }

    /// Flush the encoder, finalize the container, and release the backend.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while flushing, writing the trailer, or
    /// closing the sink. Resources are released regardless.
    pub fn close(mut self) -> Result<SessionSummary, EncodeError> {
        self.finish()?;
        Ok(self.summary())
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames_submitted: self.frames_submitted(),
            packets_written: self.packets_written,
        }
    }

    /// Tear down once. Later calls find no handles and do nothing.
    fn finish(&mut self) -> Result<(), EncodeError> {
        let Some(mut handles) = self.handles.take() else {
            return Ok(());
        };

        let finalized = if self.unusable {
            log::warn!(
                "Skipping flush and trailer for {:?}: destination is unusable",
                self.destination
            );
            Ok(())
        } else {
            match flush(&mut handles, &self.destination, &mut self.packets_written) {
                Err(e @ EncodeError::Write { .. }) => {
                    self.unusable = true;
                    log::warn!(
                        "Skipping trailer for {:?}: destination is unusable",
                        self.destination
                    );
                    Err(e)
                }
                flushed => {
                    let trailer = handles.muxer.write_trailer().map_err(|e| EncodeError::Write {
                        path: self.destination.clone(),
                        reason: format!("cannot write trailer: {e}"),
                    });
                    flushed.and(trailer)
                }
            }
        };

        let Handles {
            encoder,
            frame,
            mut muxer,
            container,
            ..
        } = handles;
        drop(encoder);
        drop(frame);

        let closed = if container.needs_file {
            muxer.close_sink().map_err(|e| EncodeError::Write {
                path: self.destination.clone(),
                reason: format!("cannot close output: {e}"),
            })
        } else {
            Ok(())
        };
        drop(muxer);

        log::info!(
            "Closed {:?}: {} frames, {} packets",
            self.destination,
            self.frames_submitted(),
            self.packets_written
        );

        finalized.and(closed)
    }
}

impl<B: Backend> Drop for EncodingSession<B> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("Failed to close {:?}: {e}", self.destination);
        }
    }
}

fn validate_geometry(
    width: u32,
    height: u32,
    fps: u32,
    options: &SessionOptions,
) -> Result<(), EncodeError> {
    if width == 0 || height == 0 {
        return Err(EncodeError::Configuration(format!(
            "dimensions must be positive, got {width}x{height}"
        )));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(EncodeError::Configuration(format!(
            "4:2:0 chroma subsampling needs even dimensions, got {width}x{height}"
        )));
    }
    if width > i32::MAX as u32 || height > i32::MAX as u32 {
        return Err(EncodeError::Configuration(format!(
            "dimensions {width}x{height} are out of range"
        )));
    }
    if fps == 0 || fps > i32::MAX as u32 {
        return Err(EncodeError::Configuration(format!(
            "frame rate must be positive, got {fps}"
        )));
    }
    if options.frame_alignment == 0 || !options.frame_alignment.is_power_of_two() {
        return Err(EncodeError::Configuration(format!(
            "frame alignment must be a power of two, got {}",
            options.frame_alignment
        )));
    }
    Ok(())
}

/// Build every backend handle of a session. Locals are declared in
/// acquisition order so an early return drops them in reverse.
fn negotiate<B: Backend>(
    backend: &mut B,
    destination: &Path,
    width: u32,
    height: u32,
    fps: u32,
    options: &SessionOptions,
) -> Result<Handles<B>, EncodeError> {
    let mut muxer = match options.container.as_deref() {
        Some(name) => backend.open_output(destination, Some(name)),
        None => match backend.open_output(destination, None) {
            Err(e) if e.kind == BackendErrorKind::UnknownFormat => {
                log::warn!(
                    "Could not deduce output format from {:?} ({e}); using {}",
                    destination,
                    options.fallback_container
                );
                backend.open_output(destination, Some(&options.fallback_container))
            }
            other => other,
        },
    }
    .map_err(|e| e.into_negotiation("allocating the output context"))?;

    let container = muxer.container();
    let codec = options
        .codec
        .clone()
        .or_else(|| container.video_codec.clone())
        .ok_or_else(|| EncodeError::UnsupportedCodec {
            codec: "none".to_string(),
            container: container.name.clone(),
        })?;
    if !backend.has_encoder(&codec) {
        return Err(EncodeError::UnsupportedCodec {
            codec: codec.to_string(),
            container: container.name.clone(),
        });
    }

    let time_base = Rational::per_frame(fps);
    let stream = backend
        .add_stream(&mut muxer, &codec, time_base)
        .map_err(|e| e.into_negotiation("allocating the video stream"))?;

    let parameters = EncoderParameters {
        options: options.tuning.options_for(&codec),
        codec: codec.clone(),
        width,
        height,
        time_base,
        frame_rate: time_base.inverse(),
        bit_rate: options.bit_rate,
        gop_size: options.gop_size,
        pixel_format: PixelFormat::Yuv420p,
        global_header: container.global_header,
    };
    log::debug!("Encoder parameters: {parameters:?}");

    let encoder = backend
        .open_encoder(&mut muxer, stream, &parameters)
        .map_err(|e| e.into_negotiation("opening the video codec"))?;

    let frame = backend
        .alloc_frame(
            PixelFormat::Yuv420p,
            width,
            height,
            options.frame_alignment,
        )
        .map_err(|e| EncodeError::Resource(format!("cannot allocate video frame: {}", e.message)))?;
    let strides = [frame.stride(Y_PLANE), frame.stride(U_PLANE), frame.stride(V_PLANE)];

    if options.dump_format {
        muxer.dump(destination);
    }

    muxer
        .write_header()
        .map_err(|e| e.into_negotiation("writing the container header"))?;

    Ok(Handles {
        encoder,
        frame,
        muxer,
        container,
        codec,
        stream,
        strides,
    })
}

/// Write every packet the encoder has ready. Stops at "not ready" or
/// "end of stream".
fn drain<B: Backend>(
    handles: &mut Handles<B>,
    destination: &Path,
    packets_written: &mut u64,
) -> Result<(), EncodeError> {
    loop {
        match handles.encoder.receive_packet().map_err(|e| e.into_encoding())? {
            Received::Packet(mut packet) => {
                write_packet(handles, &mut packet, destination)?;
                *packets_written += 1;
            }
            Received::NotReady | Received::EndOfStream => return Ok(()),
        }
    }
}

/// Signal end-of-stream and write everything still buffered.
fn flush<B: Backend>(
    handles: &mut Handles<B>,
    destination: &Path,
    packets_written: &mut u64,
) -> Result<(), EncodeError> {
    handles
        .encoder
        .send_eof()
        .map_err(|e| e.into_encoding())?;

    loop {
        match handles.encoder.receive_packet().map_err(|e| e.into_encoding())? {
            Received::Packet(mut packet) => {
                write_packet(handles, &mut packet, destination)?;
                *packets_written += 1;
            }
            Received::EndOfStream => return Ok(()),
            Received::NotReady => {
                log::warn!("Encoder reported no output pending after end-of-stream");
                return Ok(());
            }
        }
    }
}

fn write_packet<B: Backend>(
    handles: &mut Handles<B>,
    packet: &mut B::Packet,
    destination: &Path,
) -> Result<(), EncodeError> {
    let encoder_time_base = handles.encoder.time_base();
    let stream_time_base = handles
        .muxer
        .stream_time_base(handles.stream)
        .unwrap_or(encoder_time_base);

    packet.rescale_ts(encoder_time_base, stream_time_base);
    packet.set_stream(handles.stream);

    if log::log_enabled!(log::Level::Trace) {
        log::trace!(
            "pts:{} pts_time:{} dts:{} dts_time:{} duration:{} duration_time:{} size:{} key:{} stream_index:{}",
            format_timestamp(packet.pts()),
            format_timestamp_time(packet.pts(), stream_time_base),
            format_timestamp(packet.dts()),
            format_timestamp_time(packet.dts(), stream_time_base),
            packet.duration(),
            format_timestamp_time(Some(packet.duration()), stream_time_base),
            packet.size(),
            packet.is_key(),
            handles.stream,
        );
    }

    handles
        .muxer
        .write_packet(packet)
        .map_err(|e| EncodeError::Write {
            path: destination.to_path_buf(),
            reason: e.message,
        })
}
