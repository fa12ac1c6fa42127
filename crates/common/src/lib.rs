/// Common vocabulary types for the pipeline: stream kinds, detection
/// geometry, and the per-frame metadata records that travel with buffers.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stream type enumeration for sub-streams embedded in a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Subtitle => write!(f, "subtitle"),
        }
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "video" => Ok(StreamKind::Video),
            "audio" => Ok(StreamKind::Audio),
            "subtitle" => Ok(StreamKind::Subtitle),
            other => Err(format!("unknown stream kind: {other}")),
        }
    }
}

/// Axis-aligned bounding box in normalized [0, 1] coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection over union with another box
    #[inline]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection_width = (x2 - x1).max(0.0);
        let intersection_height = (y2 - y1).max(0.0);
        let intersection_area = intersection_width * intersection_height;

        let union_area = self.area() + other.area() - intersection_area;

        if union_area > 0.0 {
            intersection_area / union_area
        } else {
            0.0
        }
    }
}

/// A single detected (and possibly tracked) object within a frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Class identifier assigned by the detector
    pub class_id: u32,
    /// Persistent identity assigned by the tracker, if tracking ran
    pub track_id: Option<u64>,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
    /// Spatial bounds
    pub bbox: BoundingBox,
}

/// Per-frame metadata: frame identity plus the objects found in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Frame number within the stream (0-indexed)
    pub frame_number: u64,
    /// Presentation timestamp in seconds
    pub pts_secs: f64,
    /// Objects detected in this frame (may be empty)
    pub objects: Vec<ObjectRecord>,
}

impl FrameRecord {
    pub fn new(frame_number: u64, pts_secs: f64) -> Self {
        Self {
            frame_number,
            pts_secs,
            objects: Vec::new(),
        }
    }
}

/// Metadata attached to a batched buffer: one record per frame in the batch.
///
/// Traversal is a finite sequence with explicit exhaustion. `frames()` yields
/// borrowed records for observers; `into_frames()` consumes the batch and
/// cannot be restarted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchMeta {
    frames: Vec<FrameRecord>,
}

impl BatchMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<FrameRecord>) -> Self {
        Self { frames }
    }

    pub fn push(&mut self, frame: FrameRecord) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Borrowed traversal of the frame records
    pub fn frames(&self) -> Frames<'_> {
        Frames(self.frames.iter())
    }

    /// Consuming traversal; the sequence cannot be restarted afterwards
    pub fn into_frames(self) -> impl ExactSizeIterator<Item = FrameRecord> {
        self.frames.into_iter()
    }

    /// Total object count across all frames in the batch
    pub fn object_count(&self) -> usize {
        self.frames.iter().map(|f| f.objects.len()).sum()
    }
}

/// Borrowed iterator over the frame records of a batch
pub struct Frames<'a>(std::slice::Iter<'a, FrameRecord>);

impl Frames<'_> {
    /// An iterator over no frames, for buffers that carry no metadata
    pub fn empty() -> Frames<'static> {
        const NONE: &[FrameRecord] = &[];
        Frames(NONE.iter())
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a FrameRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for Frames<'_> {}
