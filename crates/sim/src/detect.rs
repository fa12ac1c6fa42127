//! Object detector: fills each frame record of a batch with per-object
//! class/confidence/bounds. The synthetic backend derives detections
//! deterministically from the frame number, so a given input always yields
//! the same objects.

use crate::raw_video;
use std::path::Path;
use tracing::debug;
use vidgraph_common::{BoundingBox, FrameRecord, ObjectRecord};
use vidgraph_core::{
    ConfigSchema, PortDecl, StageContext, StageDescriptor, StageError, StageImpl, StageKind,
};

const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_NUM_CLASSES: u32 = 80;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct InferSettings {
    pub(crate) threshold: f32,
    pub(crate) num_classes: u32,
}

/// Parse the keys this stage honors from an inference config file
/// (`key=value` lines; sections and comments are skipped).
pub(crate) fn parse_infer_config(contents: &str) -> InferSettings {
    let mut settings = InferSettings {
        threshold: DEFAULT_THRESHOLD,
        num_classes: DEFAULT_NUM_CLASSES,
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "pre-cluster-threshold" | "threshold" => {
                if let Ok(v) = value.trim().parse::<f32>() {
                    settings.threshold = v;
                }
            }
            "num-detected-classes" => {
                if let Ok(v) = value.trim().parse::<u32>() {
                    settings.num_classes = v.max(1);
                }
            }
            _ => {}
        }
    }
    settings
}

fn next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 16
}

/// Deterministic detections for one frame
pub(crate) fn synth_detections(frame_number: u64, settings: &InferSettings) -> Vec<ObjectRecord> {
    let mut state = frame_number.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let count = next(&mut state) % 3;
    let mut objects = Vec::with_capacity(count as usize);
    for _ in 0..count {
        // Bias towards person (0) and vehicle (2), the classes the
        // reporting hook tallies.
        let class_id = match next(&mut state) % 4 {
            0 | 1 => 0,
            2 => 2,
            _ => (next(&mut state) % u64::from(settings.num_classes)) as u32,
        };
        let confidence = 0.30 + (next(&mut state) % 70) as f32 / 100.0;
        let x = (next(&mut state) % 60) as f32 / 100.0;
        let y = (next(&mut state) % 60) as f32 / 100.0;
        let width = 0.10 + (next(&mut state) % 25) as f32 / 100.0;
        let height = 0.10 + (next(&mut state) % 30) as f32 / 100.0;
        if confidence < settings.threshold {
            continue;
        }
        objects.push(ObjectRecord {
            class_id,
            track_id: None,
            confidence,
            bbox: BoundingBox::new(x, y, width, height),
        });
    }
    objects
}

struct ObjectDetect {
    settings: InferSettings,
}

impl StageImpl for ObjectDetect {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        loop {
            match ctx.pull(0)? {
                Some(mut buffer) => {
                    let meta = buffer.meta.take().unwrap_or_default();
                    let mut detected = vidgraph_common::BatchMeta::new();
                    for frame in meta.into_frames() {
                        let mut record = FrameRecord::new(frame.frame_number, frame.pts_secs);
                        record.objects = synth_detections(frame.frame_number, &self.settings);
                        detected.push(record);
                    }
                    debug!(
                        batch = buffer.sequence,
                        objects = detected.object_count(),
                        "Inference complete"
                    );
                    ctx.push(0, buffer.with_meta(detected))?;
                }
                None => break,
            }
        }
        ctx.push_eos();
        Ok(())
    }
}

pub(crate) fn object_detect() -> StageKind {
    let descriptor = StageDescriptor::new("object-detect", "Runs object-detection inference")
        .with_config(ConfigSchema::new().required_key("config-file-path"))
        .with_input(PortDecl::sink("sink", raw_video()))
        .with_output(PortDecl::src("src", raw_video()));
    StageKind::new(descriptor, |config| {
        let path = config
            .str_value("config-file-path")
            .ok_or("'config-file-path' must be a string path")?;
        let contents = std::fs::read_to_string(Path::new(path))
            .map_err(|e| format!("cannot read inference config {path}: {e}"))?;
        Ok(Box::new(ObjectDetect {
            settings: parse_infer_config(&contents),
        }))
    })
}
