//! Inspection hooks: non-mutating observers attached to a port, executed
//! synchronously on every buffer crossing it.

use crate::buffer::FrameBuffer;
use vidgraph_common::{BatchMeta, Frames};

/// Disposition returned by an inspection hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    /// Let the buffer continue downstream
    Forward,
    /// Discard this buffer; the stream continues
    Drop,
    /// Fail the pipeline
    Fail,
}

/// Read-only view of one buffer's metadata, valid only for the duration of
/// the hook invocation. Hooks must not retain references past their own
/// execution; the borrow makes that a compile-time property.
pub struct InspectionRecord<'a> {
    sequence: u64,
    pts_secs: f64,
    meta: Option<&'a BatchMeta>,
}

impl<'a> InspectionRecord<'a> {
    pub(crate) fn of(buffer: &'a FrameBuffer) -> Self {
        Self {
            sequence: buffer.sequence,
            pts_secs: buffer.pts_secs,
            meta: buffer.meta.as_ref(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pts_secs(&self) -> f64 {
        self.pts_secs
    }

    pub fn has_meta(&self) -> bool {
        self.meta.is_some()
    }

    /// Frame records carried by the buffer. Empty for buffers with no
    /// extractable metadata; that is not an error.
    pub fn frames(&self) -> Frames<'a> {
        match self.meta {
            Some(meta) => meta.frames(),
            None => Frames::empty(),
        }
    }

    pub fn object_count(&self) -> usize {
        self.meta.map_or(0, BatchMeta::object_count)
    }
}

/// Hook callback. Runs in the worker thread of the observed port, once per
/// buffer, in arrival order.
pub type HookFn = Box<dyn FnMut(&InspectionRecord<'_>) -> HookVerdict + Send>;

/// Hooks attached to one port endpoint, invoked in attachment order. The
/// first non-`Forward` verdict wins.
#[derive(Default)]
pub(crate) struct HookSet {
    hooks: Vec<HookFn>,
}

impl HookSet {
    pub(crate) fn push(&mut self, hook: HookFn) {
        self.hooks.push(hook);
    }

    pub(crate) fn inspect(&mut self, buffer: &FrameBuffer) -> HookVerdict {
        let record = InspectionRecord::of(buffer);
        for hook in &mut self.hooks {
            match hook(&record) {
                HookVerdict::Forward => {}
                verdict => return verdict,
            }
        }
        HookVerdict::Forward
    }
}
