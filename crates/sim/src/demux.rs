//! Stream demuxer: splits container input into elementary sub-streams.
//!
//! The kinds of embedded sub-streams are unknown until the demuxer starts
//! observing its input, so output ports are announced at runtime and linked
//! through the graph's pending-link rules. The synthetic implementation
//! takes the sub-stream layout from its `streams` configuration instead of
//! parsing a real container.

use crate::h264;
use tracing::debug;
use vidgraph_common::StreamKind;
use vidgraph_core::{
    ConfigSchema, Encoding, FormatDescriptor, FrameBuffer, PortDecl, StageContext, StageDescriptor,
    StageError, StageImpl, StageKind,
};

struct StreamDemux {
    kinds: Vec<StreamKind>,
}

impl StageImpl for StreamDemux {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        // Sub-stream types become known only once input is observed: wait
        // for the first chunk before announcing anything.
        let Some(first) = ctx.pull(0)? else {
            ctx.push_eos();
            return Ok(());
        };

        let mut video_port = None;
        for kind in &self.kinds {
            let format = match kind {
                StreamKind::Video => FormatDescriptor::new(Encoding::H264),
                StreamKind::Audio => FormatDescriptor::new(Encoding::Aac),
                StreamKind::Subtitle => continue,
            };
            let port = ctx.announce(*kind, format);
            if *kind == StreamKind::Video && video_port.is_none() {
                video_port = port;
            }
        }
        if video_port.is_none() {
            debug!(stage = %ctx.stage_name(), "No rule claimed the video sub-stream");
        }

        let mut sequence = 0u64;
        let mut current = Some(first);
        while let Some(chunk) = current {
            if let Some(port) = video_port {
                let out = FrameBuffer::new(
                    sequence,
                    chunk.pts_secs,
                    FormatDescriptor::new(Encoding::H264),
                )
                .with_payload(chunk.payload);
                ctx.push(port, out)?;
                sequence += 1;
            }
            current = ctx.pull(0)?;
        }
        ctx.push_eos();
        Ok(())
    }
}

/// Parse the `streams` configuration value ("video", "video,audio", ...)
fn parse_streams(value: &str) -> Result<Vec<StreamKind>, String> {
    let mut kinds = Vec::new();
    for part in value.split(',') {
        let kind: StreamKind = part.parse()?;
        if kind == StreamKind::Subtitle {
            return Err("subtitle sub-streams are not supported".to_string());
        }
        kinds.push(kind);
    }
    Ok(kinds)
}

pub(crate) fn stream_demux() -> StageKind {
    let descriptor = StageDescriptor::new(
        "stream-demux",
        "Splits a container into elementary sub-streams",
    )
    .with_config(ConfigSchema::new().key("streams"))
    .with_input(PortDecl::sink("sink", crate::container()))
    .with_output(PortDecl::dynamic_src("src_%u", h264()));
    StageKind::new(descriptor, |config| {
        let kinds = parse_streams(config.str_value("streams").unwrap_or("video"))?;
        Ok(Box::new(StreamDemux { kinds }))
    })
}
