//! Detection pipeline assembly
//!
//! Builds the graph spec for the full run: file source -> demuxer (video
//! sub-stream linked on announcement) -> parser -> decoder -> converter ->
//! batcher (request port) -> detector -> tracker -> converter -> overlay ->
//! encoder -> muxer -> file sink, with a frame-report inspection hook on
//! the overlay input.

use tracing::info;
use vidgraph_common::StreamKind;
use vidgraph_core::{
    GraphSpec, HookVerdict, InspectionRecord, PipelineConfig, PipelinePlan, PortDirection,
    StageConfig,
};

/// Classes tallied per frame by the report hook (COCO ids)
const PERSON_CLASS_ID: u32 = 0;
const VEHICLE_CLASS_ID: u32 = 2;

/// Inspection hook logging every frame and its objects as they reach the
/// overlay. Observation only; the buffer continues unchanged.
fn frame_report_hook() -> impl FnMut(&InspectionRecord<'_>) -> HookVerdict + Send + 'static {
    move |record| {
        for frame in record.frames() {
            let mut persons = 0u32;
            let mut vehicles = 0u32;
            for object in &frame.objects {
                match object.class_id {
                    PERSON_CLASS_ID => persons += 1,
                    VEHICLE_CLASS_ID => vehicles += 1,
                    _ => {}
                }
                info!(
                    object_id = object.track_id,
                    class_id = object.class_id,
                    confidence = format!("{:.2}", object.confidence).as_str(),
                    "Object"
                );
            }
            info!(
                "Frame {} @ {:.2}s | persons: {} | vehicles: {}",
                frame.frame_number, frame.pts_secs, persons, vehicles
            );
        }
        HookVerdict::Forward
    }
}

/// Build the run plan for a detection pipeline from its configuration
pub fn detection_plan(config: &PipelineConfig) -> PipelinePlan {
    let batching = &config.batching;
    let mut graph = GraphSpec::new();

    graph
        .stage(
            "file-source",
            "source",
            StageConfig::new().set("location", config.input_video.display().to_string()),
        )
        .stage("stream-demux", "demux", StageConfig::new())
        .stage("h264-parse", "parser", StageConfig::new())
        .stage(
            "video-decode",
            "decoder",
            StageConfig::new().set("disable-dpb", true),
        )
        .stage(
            "video-convert",
            "convert-pre",
            StageConfig::new()
                .set("width", batching.width)
                .set("height", batching.height),
        )
        .stage(
            "stream-batch",
            "batcher",
            StageConfig::new()
                .set("width", batching.width)
                .set("height", batching.height)
                .set("batch-size", batching.batch_size)
                .set("timeout-ms", batching.timeout_ms as i64),
        )
        .stage(
            "object-detect",
            "detector",
            StageConfig::new().set("config-file-path", config.infer_config.display().to_string()),
        )
        .stage(
            "object-track",
            "tracker",
            StageConfig::new()
                .set(
                    "config-file-path",
                    config.tracker_config.display().to_string(),
                )
                .set("tracker-width", batching.width)
                .set("tracker-height", batching.height)
                .set("enable-batch-process", true),
        )
        .stage("video-convert", "convert-post", StageConfig::new())
        .stage("overlay", "osd", StageConfig::new())
        .stage(
            "h264-encode",
            "encoder",
            StageConfig::new()
                .set("bitrate", config.encoder.bitrate as i64)
                .set("iframe-interval", 30i64)
                .set("insert-sps-pps", true),
        )
        .stage("stream-mux", "muxer", StageConfig::new())
        .stage(
            "file-sink",
            "sink",
            StageConfig::new()
                .set("location", config.output_file.display().to_string())
                .set("sync", false)
                .set("async", false),
        );

    graph
        .link("source", "src", "demux", "sink")
        // The demuxer discovers its sub-streams at runtime; only the video
        // one is claimed.
        .link_on_announce("demux", StreamKind::Video, "parser", "sink")
        .link("parser", "src", "decoder", "sink")
        .link("decoder", "src", "convert-pre", "sink")
        // The batcher hands out its inputs on request; the slot is released
        // during teardown.
        .link_via_request("convert-pre", "src", "batcher")
        .link("batcher", "src", "detector", "sink")
        .link("detector", "src", "tracker", "sink")
        .link("tracker", "src", "convert-post", "sink")
        .link("convert-post", "src", "osd", "sink")
        .link("osd", "src", "encoder", "sink")
        .link("encoder", "src", "muxer", "sink")
        .link("muxer", "src", "sink", "sink");

    graph.observe("osd", "sink", PortDirection::Input, frame_report_hook());

    PipelinePlan {
        name: "detection-pipeline".to_string(),
        preconditions: config.required_files(),
        graph,
    }
}
