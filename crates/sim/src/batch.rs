//! Frame batcher: assembles raw frames from its request-port inputs into
//! batches for inference. Batch metadata is born here, one frame record per
//! buffered frame.

use crate::{raw_nv12, raw_video};
use std::time::Duration;
use tracing::debug;
use vidgraph_common::{BatchMeta, FrameRecord};
use vidgraph_core::{
    ConfigSchema, Encoding, FormatDescriptor, FrameBuffer, MemoryClass, PixelLayout, PortDecl,
    PullEvent, StageContext, StageDescriptor, StageError, StageImpl, StageKind,
};

const DEFAULT_BATCH_SIZE: i64 = 1;
const DEFAULT_TIMEOUT_MS: i64 = 40;

struct StreamBatch {
    width: u32,
    height: u32,
    batch_size: usize,
    timeout: Duration,
}

impl StreamBatch {
    fn flush(
        &self,
        ctx: &mut StageContext,
        pending: &mut Vec<FrameBuffer>,
        batch_sequence: &mut u64,
    ) -> Result<(), StageError> {
        if pending.is_empty() {
            return Ok(());
        }
        let mut meta = BatchMeta::new();
        let mut payload = Vec::new();
        let pts_secs = pending[0].pts_secs;
        for frame in pending.drain(..) {
            meta.push(FrameRecord::new(frame.sequence, frame.pts_secs));
            payload.extend_from_slice(&frame.payload);
        }
        let format = FormatDescriptor::new(Encoding::RawVideo)
            .with_layout(PixelLayout::Nv12)
            .with_size(self.width, self.height)
            .with_memory(MemoryClass::System);
        let batch = FrameBuffer::new(*batch_sequence, pts_secs, format)
            .with_payload(payload)
            .with_meta(meta);
        *batch_sequence += 1;
        ctx.push(0, batch)
    }
}

impl StageImpl for StreamBatch {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        let mut pending = Vec::with_capacity(self.batch_size);
        let mut batch_sequence = 0u64;
        loop {
            match ctx.pull_any(Some(self.timeout))? {
                PullEvent::Buffer { buffer, .. } => {
                    pending.push(buffer);
                    if pending.len() >= self.batch_size {
                        self.flush(&mut ctx, &mut pending, &mut batch_sequence)?;
                    }
                }
                PullEvent::TimedOut => {
                    // Batched-push timeout: a partial batch goes out rather
                    // than stalling the pipeline.
                    if !pending.is_empty() {
                        debug!(
                            frames = pending.len(),
                            "Pushing partial batch after timeout"
                        );
                        self.flush(&mut ctx, &mut pending, &mut batch_sequence)?;
                    }
                }
                PullEvent::Exhausted => {
                    self.flush(&mut ctx, &mut pending, &mut batch_sequence)?;
                    break;
                }
            }
        }
        ctx.push_eos();
        Ok(())
    }
}

pub(crate) fn stream_batch() -> StageKind {
    let descriptor = StageDescriptor::new("stream-batch", "Batches frames for inference")
        .with_config(
            ConfigSchema::new()
                .required_key("width")
                .required_key("height")
                .key("batch-size")
                .key("timeout-ms"),
        )
        .with_input(PortDecl::request_sink("sink_%u", raw_video()))
        .with_output(PortDecl::src("src", raw_nv12()));
    StageKind::new(descriptor, |config| {
        let width = config.int_value("width").ok_or("'width' must be an integer")?;
        let height = config
            .int_value("height")
            .ok_or("'height' must be an integer")?;
        if width <= 0 || height <= 0 {
            return Err(format!("invalid batch frame size: {width}x{height}"));
        }
        let batch_size = config.int_value("batch-size").unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size <= 0 {
            return Err(format!("invalid batch-size: {batch_size}"));
        }
        let timeout_ms = config.int_value("timeout-ms").unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms <= 0 {
            return Err(format!("invalid timeout-ms: {timeout_ms}"));
        }
        Ok(Box::new(StreamBatch {
            width: width as u32,
            height: height as u32,
            batch_size: batch_size as usize,
            timeout: Duration::from_millis(timeout_ms as u64),
        }))
    })
}
