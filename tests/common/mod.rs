//! Scripted backend shared by the session integration tests.
//!
//! [`MockBackend`] records every call in a [`Ledger`] and counts live
//! handles, so tests can assert call order, release order, and that nothing
//! leaks. The encoder buffers a configurable number of frames, frames can be
//! allocated with padded strides, and any step can be made to fail.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use yuvenc::{
    Backend, BackendError, BackendErrorKind, BackendResult, CodecId, ContainerFormat,
    EncodedPacket, Encoder, EncoderParameters, Muxer, PixelFormat, PlanarFrame, Rational,
    Received, rescale_packet_times,
};

/// Byte the mock frame's buffers start with, so untouched padding is visible.
pub const SENTINEL: u8 = 0xEE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    OpenOutput { container: Option<String> },
    AddStream { codec: String },
    OpenEncoder { codec: String },
    AllocFrame,
    Dump,
    WriteHeader,
    MakeWritable { copied: bool },
    SendFrame { pts: i64 },
    SendEof,
    WritePacket { pts: Option<i64>, stream: usize },
    WriteTrailer,
    CloseSink,
    DropEncoder,
    DropFrame,
    DropMuxer,
}

/// A frame as the encoder saw it, planes stripped of padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPicture {
    pub pts: i64,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    pub events: Vec<Event>,
    pub live_muxers: i32,
    pub live_encoders: i32,
    pub live_frames: i32,
    /// Encoder inputs, captured when the encoder emits them.
    pub pictures: Vec<EncodedPicture>,
    /// Raw buffers of the frame at each send, padding included.
    pub raw_frames: Vec<[Vec<u8>; 3]>,
    pub produced: usize,
    pub parameters: Option<EncoderParameters>,
    /// Writes into frame buffers the encoder still referenced.
    pub shared_writes: usize,
}

impl Ledger {
    pub fn live_handles(&self) -> i32 {
        self.live_muxers + self.live_encoders + self.live_frames
    }

    pub fn count(&self, wanted: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| wanted(event)).count()
    }

    pub fn position(&self, wanted: &Event) -> Option<usize> {
        self.events.iter().position(|event| event == wanted)
    }

    pub fn written(&self) -> Vec<(Option<i64>, usize)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::WritePacket { pts, stream } => Some((*pts, *stream)),
                _ => None,
            })
            .collect()
    }

    /// Release events in the order they happened.
    pub fn releases(&self) -> Vec<Event> {
        self.events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    Event::DropEncoder | Event::DropFrame | Event::DropMuxer | Event::CloseSink
                )
            })
            .cloned()
            .collect()
    }
}

pub type SharedLedger = Rc<RefCell<Ledger>>;

/// Which calls fail.
#[derive(Debug, Clone, Default)]
pub struct Failures {
    pub open_output: bool,
    pub add_stream: bool,
    pub open_encoder: bool,
    pub alloc_frame: bool,
    pub write_header: bool,
    pub make_writable: bool,
    /// Zero-based indices of `send_frame` calls answered with "would block".
    pub busy_sends: Vec<usize>,
    /// Zero-based index of the first failing packet write.
    pub write_packet_at: Option<usize>,
    pub write_trailer: bool,
    pub send_eof: bool,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub container: ContainerFormat,
    /// Whether a container can be deduced from the destination name.
    pub known_format: bool,
    pub encoders: Vec<CodecId>,
    /// Frames the encoder holds before emitting the first packet.
    pub delay: usize,
    /// Extra bytes added to every row before alignment.
    pub row_padding: usize,
    pub stream_time_base: Rational,
    /// The encoder keeps referencing frame buffers until it emits them.
    pub share_frames: bool,
    pub failures: Failures,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            container: ContainerFormat {
                name: "mp4".to_string(),
                video_codec: Some(CodecId::H264),
                global_header: true,
                needs_file: true,
            },
            known_format: true,
            encoders: vec![CodecId::H264, CodecId::MPEG4, CodecId::MPEG2VIDEO],
            delay: 0,
            row_padding: 0,
            stream_time_base: Rational::new(1, 12800),
            share_frames: false,
            failures: Failures::default(),
        }
    }
}

pub struct MockBackend {
    config: MockConfig,
    ledger: SharedLedger,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> (Self, SharedLedger) {
        let ledger = SharedLedger::default();
        (
            Self {
                config,
                ledger: ledger.clone(),
            },
            ledger,
        )
    }
}

fn record(ledger: &SharedLedger, event: Event) {
    ledger.borrow_mut().events.push(event);
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

#[derive(Debug)]
pub struct MockPacket {
    pts: Option<i64>,
    dts: Option<i64>,
    duration: i64,
    size: usize,
    key: bool,
    stream: usize,
}

impl EncodedPacket for MockPacket {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn dts(&self) -> Option<i64> {
        self.dts
    }

    fn duration(&self) -> i64 {
        self.duration
    }

    fn size(&self) -> usize {
        self.size
    }

    fn is_key(&self) -> bool {
        self.key
    }

    fn set_stream(&mut self, index: usize) {
        self.stream = index;
    }

    fn rescale_ts(&mut self, from: Rational, to: Rational) {
        rescale_packet_times(&mut self.pts, &mut self.dts, &mut self.duration, from, to);
    }
}

type Planes = [Vec<u8>; 3];

pub struct MockFrame {
    ledger: SharedLedger,
    buffers: Rc<Planes>,
    strides: [usize; 3],
    pts: Option<i64>,
    fail_make_writable: bool,
}

impl PlanarFrame for MockFrame {
    fn make_writable(&mut self) -> BackendResult<()> {
        if self.fail_make_writable {
            return Err(BackendError::allocation("no memory for a private copy"));
        }
        let copied = Rc::strong_count(&self.buffers) > 1;
        if copied {
            self.buffers = Rc::new(self.buffers.as_ref().clone());
        }
        record(&self.ledger, Event::MakeWritable { copied });
        Ok(())
    }

    fn stride(&self, plane: usize) -> usize {
        self.strides[plane]
    }

    fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        if Rc::get_mut(&mut self.buffers).is_none() {
            self.ledger.borrow_mut().shared_writes += 1;
        }
        &mut Rc::make_mut(&mut self.buffers)[plane]
    }

    fn set_pts(&mut self, pts: i64) {
        self.pts = Some(pts);
    }
}

impl Drop for MockFrame {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.live_frames -= 1;
        ledger.events.push(Event::DropFrame);
    }
}

struct Pending {
    pts: i64,
    buffers: Rc<Planes>,
}

pub struct MockEncoder {
    ledger: SharedLedger,
    time_base: Rational,
    gop_size: u32,
    width: usize,
    height: usize,
    strides: [usize; 3],
    delay: usize,
    share_frames: bool,
    busy_sends: Vec<usize>,
    fail_eof: bool,
    sends: usize,
    pending: VecDeque<Pending>,
    ready: VecDeque<MockPacket>,
    eof: bool,
}

impl MockEncoder {
    fn pack(&self, buffers: &Planes) -> [Vec<u8>; 3] {
        let mut packed: [Vec<u8>; 3] = Default::default();
        for (plane, target) in packed.iter_mut().enumerate() {
            let (row_bytes, rows) = if plane == 0 {
                (self.width, self.height)
            } else {
                (self.width / 2, self.height / 2)
            };
            for row in 0..rows {
                let start = row * self.strides[plane];
                target.extend_from_slice(&buffers[plane][start..start + row_bytes]);
            }
        }
        packed
    }

    fn emit(&mut self, pending: Pending) {
        let [y, u, v] = self.pack(&pending.buffers);
        let mut ledger = self.ledger.borrow_mut();
        ledger.pictures.push(EncodedPicture {
            pts: pending.pts,
            y,
            u,
            v,
        });
        ledger.produced += 1;
        self.ready.push_back(MockPacket {
            pts: Some(pending.pts),
            dts: Some(pending.pts),
            duration: 1,
            size: self.width * self.height / 10 + 1,
            key: pending.pts % i64::from(self.gop_size.max(1)) == 0,
            stream: 0,
        });
    }
}

impl Encoder for MockEncoder {
    type Frame = MockFrame;
    type Packet = MockPacket;

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_frame(&mut self, frame: &MockFrame) -> BackendResult<()> {
        let call = self.sends;
        self.sends += 1;
        if self.busy_sends.contains(&call) {
            // A full encoder has output waiting; the oldest buffered picture
            // becomes receivable.
            if let Some(next) = self.pending.pop_front() {
                self.emit(next);
            }
            return Err(BackendError::would_block("output queue full"));
        }
        if self.eof {
            return Err(BackendError::other("frame sent after end of stream"));
        }

        let pts = frame
            .pts
            .ok_or_else(|| BackendError::other("frame without pts"))?;
        record(&self.ledger, Event::SendFrame { pts });
        self.strides = frame.strides;
        self.ledger
            .borrow_mut()
            .raw_frames
            .push(frame.buffers.as_ref().clone());

        let buffers = if self.share_frames {
            frame.buffers.clone()
        } else {
            Rc::new(frame.buffers.as_ref().clone())
        };
        self.pending.push_back(Pending { pts, buffers });

        while self.pending.len() > self.delay {
            if let Some(next) = self.pending.pop_front() {
                self.emit(next);
            }
        }
        Ok(())
    }

    fn send_eof(&mut self) -> BackendResult<()> {
        record(&self.ledger, Event::SendEof);
        if self.fail_eof {
            return Err(BackendError::other("encoder flush failed"));
        }
        self.eof = true;
        while let Some(next) = self.pending.pop_front() {
            self.emit(next);
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> BackendResult<Received<MockPacket>> {
        if let Some(packet) = self.ready.pop_front() {
            return Ok(Received::Packet(packet));
        }
        if self.eof {
            Ok(Received::EndOfStream)
        } else {
            Ok(Received::NotReady)
        }
    }
}

impl Drop for MockEncoder {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.live_encoders -= 1;
        ledger.events.push(Event::DropEncoder);
    }
}

pub struct MockMuxer {
    ledger: SharedLedger,
    container: ContainerFormat,
    stream_time_base: Rational,
    streams: usize,
    writes: usize,
    write_packet_at: Option<usize>,
    fail_header: bool,
    fail_trailer: bool,
}

impl Muxer for MockMuxer {
    type Packet = MockPacket;

    fn container(&self) -> ContainerFormat {
        self.container.clone()
    }

    fn stream_time_base(&self, stream: usize) -> Option<Rational> {
        (stream < self.streams).then_some(self.stream_time_base)
    }

    fn write_header(&mut self) -> BackendResult<()> {
        if self.fail_header {
            return Err(BackendError::other("header rejected"));
        }
        record(&self.ledger, Event::WriteHeader);
        Ok(())
    }

    fn write_packet(&mut self, packet: &mut MockPacket) -> BackendResult<()> {
        let index = self.writes;
        self.writes += 1;
        if self.write_packet_at.is_some_and(|failing| index >= failing) {
            return Err(BackendError::other("No space left on device"));
        }
        record(
            &self.ledger,
            Event::WritePacket {
                pts: packet.pts,
                stream: packet.stream,
            },
        );
        Ok(())
    }

    fn write_trailer(&mut self) -> BackendResult<()> {
        record(&self.ledger, Event::WriteTrailer);
        if self.fail_trailer {
            return Err(BackendError::other("trailer rejected"));
        }
        Ok(())
    }

    fn close_sink(&mut self) -> BackendResult<()> {
        record(&self.ledger, Event::CloseSink);
        Ok(())
    }

    fn dump(&self, _destination: &Path) {
        record(&self.ledger, Event::Dump);
    }
}

impl Drop for MockMuxer {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.live_muxers -= 1;
        ledger.events.push(Event::DropMuxer);
    }
}

impl Backend for MockBackend {
    type Frame = MockFrame;
    type Packet = MockPacket;
    type Encoder = MockEncoder;
    type Muxer = MockMuxer;

    fn open_output(
        &mut self,
        _destination: &Path,
        container: Option<&str>,
    ) -> BackendResult<MockMuxer> {
        record(
            &self.ledger,
            Event::OpenOutput {
                container: container.map(str::to_string),
            },
        );
        if self.config.failures.open_output {
            return Err(BackendError::other("Permission denied"));
        }
        if container.is_none() && !self.config.known_format {
            return Err(BackendError::new(
                BackendErrorKind::UnknownFormat,
                "unable to find a suitable output format",
            ));
        }

        let mut format = self.config.container.clone();
        if let Some(name) = container {
            format.name = name.to_string();
        }
        self.ledger.borrow_mut().live_muxers += 1;
        Ok(MockMuxer {
            ledger: self.ledger.clone(),
            container: format,
            stream_time_base: self.config.stream_time_base,
            streams: 0,
            writes: 0,
            write_packet_at: self.config.failures.write_packet_at,
            fail_header: self.config.failures.write_header,
            fail_trailer: self.config.failures.write_trailer,
        })
    }

    fn has_encoder(&self, codec: &CodecId) -> bool {
        self.config.encoders.contains(codec)
    }

    fn add_stream(
        &mut self,
        muxer: &mut MockMuxer,
        codec: &CodecId,
        _time_base: Rational,
    ) -> BackendResult<usize> {
        if self.config.failures.add_stream {
            return Err(BackendError::other("could not allocate stream"));
        }
        record(
            &self.ledger,
            Event::AddStream {
                codec: codec.to_string(),
            },
        );
        muxer.streams += 1;
        Ok(muxer.streams - 1)
    }

    fn open_encoder(
        &mut self,
        _muxer: &mut MockMuxer,
        _stream: usize,
        parameters: &EncoderParameters,
    ) -> BackendResult<MockEncoder> {
        if self.config.failures.open_encoder {
            return Err(BackendError::other("Invalid argument"));
        }
        record(
            &self.ledger,
            Event::OpenEncoder {
                codec: parameters.codec.to_string(),
            },
        );
        let mut ledger = self.ledger.borrow_mut();
        ledger.parameters = Some(parameters.clone());
        ledger.live_encoders += 1;

        Ok(MockEncoder {
            ledger: self.ledger.clone(),
            time_base: parameters.time_base,
            gop_size: parameters.gop_size,
            width: parameters.width as usize,
            height: parameters.height as usize,
            strides: [0; 3],
            delay: self.config.delay,
            share_frames: self.config.share_frames,
            busy_sends: self.config.failures.busy_sends.clone(),
            fail_eof: self.config.failures.send_eof,
            sends: 0,
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            eof: false,
        })
    }

    fn alloc_frame(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
        align: u32,
    ) -> BackendResult<MockFrame> {
        assert_eq!(format, PixelFormat::Yuv420p);
        if self.config.failures.alloc_frame {
            return Err(BackendError::allocation("Cannot allocate memory"));
        }
        record(&self.ledger, Event::AllocFrame);

        let (width, height, align) = (width as usize, height as usize, align as usize);
        let luma = round_up(width + self.config.row_padding, align);
        let chroma = round_up(width / 2 + self.config.row_padding, align);
        let strides = [luma, chroma, chroma];
        let buffers = [
            vec![SENTINEL; luma * height],
            vec![SENTINEL; chroma * (height / 2)],
            vec![SENTINEL; chroma * (height / 2)],
        ];

        self.ledger.borrow_mut().live_frames += 1;
        Ok(MockFrame {
            ledger: self.ledger.clone(),
            buffers: Rc::new(buffers),
            strides,
            pts: None,
            fail_make_writable: self.config.failures.make_writable,
        })
    }
}
