//! Buffers and the messages that travel stage-to-stage on the data path

use crate::caps::FormatDescriptor;
use vidgraph_common::BatchMeta;

/// A unit of media data flowing through the graph. The payload is opaque to
/// the orchestration layer; metadata, when present, describes the frames
/// the payload carries.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Monotonic per-producer sequence number
    pub sequence: u64,
    /// Presentation timestamp in seconds
    pub pts_secs: f64,
    /// Concrete format of this buffer
    pub format: FormatDescriptor,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
    /// Per-frame metadata attached upstream, if any
    pub meta: Option<BatchMeta>,
}

impl FrameBuffer {
    pub fn new(sequence: u64, pts_secs: f64, format: FormatDescriptor) -> Self {
        Self {
            sequence,
            pts_secs,
            format,
            payload: Vec::new(),
            meta: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_meta(mut self, meta: BatchMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Message on a link between two ports. End of stream is an expected state,
/// signaled explicitly rather than raised as a fault.
#[derive(Debug, Clone)]
pub enum DataMessage {
    Buffer(FrameBuffer),
    EndOfStream,
}
