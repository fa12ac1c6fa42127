//! One-in one-out stages: parser, decoder, converter, encoder, and muxer.
//!
//! All of them share the same worker shape (pull, map, push, forward EOS);
//! the synthetic implementations rewrite formats and sequence buffers while
//! leaving the codec math to a real backend.

use crate::{h264, raw_nv12, raw_video};
use tracing::debug;
use vidgraph_core::{
    ConfigSchema, Encoding, FormatDescriptor, FrameBuffer, MemoryClass, PixelLayout, PortDecl,
    StageContext, StageDescriptor, StageError, StageImpl, StageKind,
};

/// Drive a single-input single-output stage: pull, map, push, then forward
/// end of stream.
fn run_map<F>(mut ctx: StageContext, mut map: F) -> Result<(), StageError>
where
    F: FnMut(FrameBuffer) -> FrameBuffer,
{
    loop {
        match ctx.pull(0)? {
            Some(buffer) => ctx.push(0, map(buffer))?,
            None => break,
        }
    }
    ctx.push_eos();
    Ok(())
}

// ---------------------------------------------------------------------------
// h264-parse
// ---------------------------------------------------------------------------

/// Normalizes an elementary stream so the decoder accepts it. One input
/// chunk is treated as one access unit.
struct H264Parse;

impl StageImpl for H264Parse {
    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), StageError> {
        run_map(ctx, |mut buffer| {
            buffer.format = FormatDescriptor::new(Encoding::H264);
            buffer
        })
    }
}

pub(crate) fn h264_parse() -> StageKind {
    let descriptor = StageDescriptor::new("h264-parse", "Normalizes an H.264 elementary stream")
        .with_input(PortDecl::sink("sink", h264()))
        .with_output(PortDecl::src("src", h264()));
    StageKind::new(descriptor, |_| Ok(Box::new(H264Parse)))
}

// ---------------------------------------------------------------------------
// video-decode
// ---------------------------------------------------------------------------

const DEFAULT_DECODE_WIDTH: i64 = 1280;
const DEFAULT_DECODE_HEIGHT: i64 = 720;
const DEFAULT_FRAMERATE: f64 = 30.0;

/// Decodes access units into raw frames. The synthetic decoder emits one
/// frame per access unit with a deterministic placeholder payload.
struct VideoDecode {
    width: u32,
    height: u32,
    framerate: f64,
}

impl StageImpl for VideoDecode {
    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), StageError> {
        let format = FormatDescriptor::new(Encoding::RawVideo)
            .with_layout(PixelLayout::Nv12)
            .with_size(self.width, self.height)
            .with_memory(MemoryClass::System);
        let mut frame_number = 0u64;
        let framerate = self.framerate;
        run_map(ctx, move |access_unit| {
            let pts_secs = frame_number as f64 / framerate;
            let frame = FrameBuffer::new(frame_number, pts_secs, format)
                .with_payload(synth_frame_payload(frame_number, &access_unit.payload));
            frame_number += 1;
            frame
        })
    }
}

/// Deterministic placeholder for decoded pixel data
fn synth_frame_payload(frame_number: u64, access_unit: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16);
    payload.extend_from_slice(&frame_number.to_le_bytes());
    payload.extend_from_slice(&(access_unit.len() as u64).to_le_bytes());
    payload
}

pub(crate) fn video_decode() -> StageKind {
    let descriptor = StageDescriptor::new("video-decode", "Decodes H.264 into raw frames")
        .with_config(
            ConfigSchema::new()
                .key("width")
                .key("height")
                .key("framerate")
                .key("disable-dpb"),
        )
        .with_input(PortDecl::sink("sink", h264()))
        .with_output(PortDecl::src("src", raw_nv12()));
    StageKind::new(descriptor, |config| {
        let width = config.int_value("width").unwrap_or(DEFAULT_DECODE_WIDTH);
        let height = config.int_value("height").unwrap_or(DEFAULT_DECODE_HEIGHT);
        if width <= 0 || height <= 0 {
            return Err(format!("invalid frame size: {width}x{height}"));
        }
        let framerate = config.float_value("framerate").unwrap_or(DEFAULT_FRAMERATE);
        if framerate <= 0.0 {
            return Err(format!("invalid framerate: {framerate}"));
        }
        Ok(Box::new(VideoDecode {
            width: width as u32,
            height: height as u32,
            framerate,
        }))
    })
}

// ---------------------------------------------------------------------------
// video-convert
// ---------------------------------------------------------------------------

/// Rescales raw frames to a target size (format rewrite only in the
/// synthetic implementation).
struct VideoConvert {
    size: Option<(u32, u32)>,
}

impl StageImpl for VideoConvert {
    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), StageError> {
        let size = self.size;
        run_map(ctx, move |mut buffer| {
            if let Some((width, height)) = size {
                buffer.format = buffer.format.with_size(width, height);
            }
            buffer
        })
    }
}

pub(crate) fn video_convert() -> StageKind {
    let descriptor = StageDescriptor::new("video-convert", "Rescales/reformats raw frames")
        .with_config(ConfigSchema::new().key("width").key("height"))
        .with_input(PortDecl::sink("sink", raw_video()))
        .with_output(PortDecl::src("src", raw_video()));
    StageKind::new(descriptor, |config| {
        let size = match (config.int_value("width"), config.int_value("height")) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w as u32, h as u32)),
            (None, None) => None,
            (w, h) => return Err(format!("invalid target size: {w:?}x{h:?}")),
        };
        Ok(Box::new(VideoConvert { size }))
    })
}

// ---------------------------------------------------------------------------
// h264-encode
// ---------------------------------------------------------------------------

const DEFAULT_BITRATE: i64 = 4_000_000;
const DEFAULT_IFRAME_INTERVAL: i64 = 30;

/// Re-encodes raw frames. Frame metadata does not survive encoding.
struct H264Encode {
    bitrate: u64,
}

impl StageImpl for H264Encode {
    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), StageError> {
        debug!(bitrate = self.bitrate, "Encoder configured");
        run_map(ctx, |mut buffer| {
            buffer.format = FormatDescriptor::new(Encoding::H264);
            buffer.meta = None;
            buffer
        })
    }
}

pub(crate) fn h264_encode() -> StageKind {
    let descriptor = StageDescriptor::new("h264-encode", "Encodes raw frames to H.264")
        .with_config(
            ConfigSchema::new()
                .key("bitrate")
                .key("iframe-interval")
                .key("insert-sps-pps"),
        )
        .with_input(PortDecl::sink("sink", raw_video()))
        .with_output(PortDecl::src("src", h264()));
    StageKind::new(descriptor, |config| {
        let bitrate = config.int_value("bitrate").unwrap_or(DEFAULT_BITRATE);
        if bitrate <= 0 {
            return Err(format!("invalid bitrate: {bitrate}"));
        }
        let iframe_interval = config
            .int_value("iframe-interval")
            .unwrap_or(DEFAULT_IFRAME_INTERVAL);
        if iframe_interval <= 0 {
            return Err(format!("invalid iframe-interval: {iframe_interval}"));
        }
        Ok(Box::new(H264Encode {
            bitrate: bitrate as u64,
        }))
    })
}

// ---------------------------------------------------------------------------
// stream-mux
// ---------------------------------------------------------------------------

/// Wraps the encoded stream back into a container
struct StreamMux;

impl StageImpl for StreamMux {
    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), StageError> {
        run_map(ctx, |mut buffer| {
            buffer.format = FormatDescriptor::new(Encoding::Container);
            buffer
        })
    }
}

pub(crate) fn stream_mux() -> StageKind {
    let descriptor = StageDescriptor::new("stream-mux", "Muxes the encoded stream to a container")
        .with_input(PortDecl::sink("sink", h264()))
        .with_output(PortDecl::src("src", crate::container()));
    StageKind::new(descriptor, |_| Ok(Box::new(StreamMux)))
}
