//! Object tracker: associates detections across frames and assigns
//! persistent identities by greedy IoU matching against live tracks.

use crate::raw_video;
use std::path::Path;
use vidgraph_common::{BatchMeta, BoundingBox, FrameRecord, ObjectRecord};
use vidgraph_core::{
    ConfigSchema, PortDecl, StageContext, StageDescriptor, StageError, StageImpl, StageKind,
};

const DEFAULT_MAX_AGE: u32 = 30;
const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TrackSettings {
    pub(crate) max_age: u32,
    pub(crate) iou_threshold: f32,
}

/// Parse the keys this stage honors from a tracker config file. Both
/// `key=value` and `key: value` lines are accepted.
pub(crate) fn parse_tracker_config(contents: &str) -> TrackSettings {
    let mut settings = TrackSettings {
        max_age: DEFAULT_MAX_AGE,
        iou_threshold: DEFAULT_IOU_THRESHOLD,
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            continue;
        };
        match key.trim() {
            "max-age" | "maxShadowTrackingAge" => {
                if let Ok(v) = value.trim().parse::<u32>() {
                    settings.max_age = v;
                }
            }
            "iou-threshold" | "minMatchingScore4Overall" => {
                if let Ok(v) = value.trim().parse::<f32>() {
                    settings.iou_threshold = v;
                }
            }
            _ => {}
        }
    }
    settings
}

struct Track {
    id: u64,
    class_id: u32,
    bbox: BoundingBox,
    misses: u32,
}

/// Frame-by-frame identity assignment
pub(crate) struct Tracker {
    settings: TrackSettings,
    tracks: Vec<Track>,
    next_id: u64,
}

impl Tracker {
    pub(crate) fn new(settings: TrackSettings) -> Self {
        Self {
            settings,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    /// Assign identities to one frame's detections
    pub(crate) fn assign(&mut self, objects: Vec<ObjectRecord>) -> Vec<ObjectRecord> {
        let mut matched = vec![false; self.tracks.len()];
        let mut out = Vec::with_capacity(objects.len());

        for mut object in objects {
            let best = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, t)| !matched[*i] && t.class_id == object.class_id)
                .map(|(i, t)| (i, t.bbox.iou(&object.bbox)))
                .filter(|(_, iou)| *iou >= self.settings.iou_threshold)
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            match best {
                Some((index, _)) => {
                    matched[index] = true;
                    let track = &mut self.tracks[index];
                    track.bbox = object.bbox;
                    track.misses = 0;
                    object.track_id = Some(track.id);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        class_id: object.class_id,
                        bbox: object.bbox,
                        misses: 0,
                    });
                    matched.push(true);
                    object.track_id = Some(id);
                }
            }
            out.push(object);
        }

        // Age out tracks that went unmatched for too long
        let max_age = self.settings.max_age;
        for (index, track) in self.tracks.iter_mut().enumerate() {
            if !matched.get(index).copied().unwrap_or(true) {
                track.misses += 1;
            }
        }
        self.tracks.retain(|t| t.misses <= max_age);
        out
    }
}

struct ObjectTrack {
    tracker: Tracker,
}

impl StageImpl for ObjectTrack {
    fn run(mut self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        loop {
            match ctx.pull(0)? {
                Some(mut buffer) => {
                    let meta = buffer.meta.take().unwrap_or_default();
                    let mut tracked = BatchMeta::new();
                    for frame in meta.into_frames() {
                        let mut record = FrameRecord::new(frame.frame_number, frame.pts_secs);
                        record.objects = self.tracker.assign(frame.objects);
                        tracked.push(record);
                    }
                    ctx.push(0, buffer.with_meta(tracked))?;
                }
                None => break,
            }
        }
        ctx.push_eos();
        Ok(())
    }
}

pub(crate) fn object_track() -> StageKind {
    let descriptor = StageDescriptor::new("object-track", "Tracks objects across frames")
        .with_config(
            ConfigSchema::new()
                .required_key("config-file-path")
                .key("tracker-width")
                .key("tracker-height")
                .key("enable-batch-process"),
        )
        .with_input(PortDecl::sink("sink", raw_video()))
        .with_output(PortDecl::src("src", raw_video()));
    StageKind::new(descriptor, |config| {
        let path = config
            .str_value("config-file-path")
            .ok_or("'config-file-path' must be a string path")?;
        let contents = std::fs::read_to_string(Path::new(path))
            .map_err(|e| format!("cannot read tracker config {path}: {e}"))?;
        Ok(Box::new(ObjectTrack {
            tracker: Tracker::new(parse_tracker_config(&contents)),
        }))
    })
}
