//! Integration tests for graph construction, dynamic port resolution,
//! inspection hooks, and the full lifecycle including teardown guarantees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vidgraph_common::{BatchMeta, FrameRecord, StreamKind};
use vidgraph_core::{
    ControlLoop, Encoding, EventBus, FormatContract, FormatDescriptor, FrameBuffer, GraphSpec,
    GraphState, HookVerdict, LoopOutcome, PipelineError, PipelineGraph, PipelinePlan, PortDecl,
    PortDirection, PortRef, PullEvent, StageConfig, StageContext, StageDescriptor, StageError,
    StageImpl, StageKind, StageRegistry,
};

fn raw() -> FormatContract {
    FormatContract::new(FormatDescriptor::new(Encoding::RawVideo))
}

fn h264() -> FormatContract {
    FormatContract::new(FormatDescriptor::new(Encoding::H264))
}

// ---------------------------------------------------------------------------
// Mock stages
// ---------------------------------------------------------------------------

/// Source producing `frames` sequenced buffers (run until drained if < 0)
struct CounterSource {
    frames: i64,
}

impl StageImpl for CounterSource {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        let mut i: u64 = 0;
        loop {
            if ctx.draining() {
                break;
            }
            if self.frames >= 0 && i >= self.frames as u64 {
                break;
            }
            let mut meta = BatchMeta::new();
            meta.push(FrameRecord::new(i, i as f64 / 30.0));
            let buffer =
                FrameBuffer::new(i, i as f64 / 30.0, FormatDescriptor::new(Encoding::RawVideo))
                    .with_meta(meta);
            if matches!(ctx.push(0, buffer), Err(StageError::Disconnected)) {
                break;
            }
            i += 1;
            if self.frames < 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        ctx.push_eos();
        Ok(())
    }
}

fn counter_source_kind() -> StageKind {
    let descriptor = StageDescriptor::new("counter-source", "sequenced test source")
        .with_config(vidgraph_core::ConfigSchema::new().key("frames"))
        .with_output(PortDecl::src("src", raw()));
    StageKind::new(descriptor, |config| {
        Ok(Box::new(CounterSource {
            frames: config.int_value("frames").unwrap_or(5),
        }))
    })
}

/// Passthrough relay
struct Relay;

impl StageImpl for Relay {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        loop {
            match ctx.pull(0)? {
                Some(buffer) => ctx.push(0, buffer)?,
                None => break,
            }
        }
        ctx.push_eos();
        Ok(())
    }
}

fn relay_kind() -> StageKind {
    let descriptor = StageDescriptor::new("relay", "passthrough relay")
        .with_input(PortDecl::sink("sink", raw()))
        .with_output(PortDecl::src("src", raw()));
    StageKind::new(descriptor, |_| Ok(Box::new(Relay)))
}

/// Relay that fails once it sees the configured sequence number
struct FailingRelay {
    fail_at: u64,
}

impl StageImpl for FailingRelay {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        loop {
            match ctx.pull(0)? {
                Some(buffer) => {
                    if buffer.sequence >= self.fail_at {
                        return Err(StageError::failed("synthetic mid-stream fault"));
                    }
                    ctx.push(0, buffer)?;
                }
                None => break,
            }
        }
        ctx.push_eos();
        Ok(())
    }
}

fn failing_relay_kind() -> StageKind {
    let descriptor = StageDescriptor::new("failing-relay", "relay that faults mid-stream")
        .with_config(vidgraph_core::ConfigSchema::new().key("fail-at"))
        .with_input(PortDecl::sink("sink", raw()))
        .with_output(PortDecl::src("src", raw()));
    StageKind::new(descriptor, |config| {
        Ok(Box::new(FailingRelay {
            fail_at: config.int_value("fail-at").unwrap_or(2) as u64,
        }))
    })
}

/// Sink collecting sequence numbers into a shared log
struct Collector {
    log: Arc<Mutex<Vec<u64>>>,
}

impl StageImpl for Collector {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        loop {
            match ctx.pull(0)? {
                Some(buffer) => self.log.lock().unwrap().push(buffer.sequence),
                None => break,
            }
        }
        Ok(())
    }
}

fn collector_kind(type_id: &'static str, log: Arc<Mutex<Vec<u64>>>) -> StageKind {
    let descriptor = StageDescriptor::new(type_id, "collecting sink")
        .with_input(PortDecl::sink("sink", raw()));
    StageKind::new(descriptor, move |_| {
        Ok(Box::new(Collector { log: log.clone() }))
    })
}

/// Sink whose inputs are acquired from a request template
struct RequestCollector {
    log: Arc<Mutex<Vec<u64>>>,
}

impl StageImpl for RequestCollector {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        loop {
            match ctx.pull_any(None)? {
                PullEvent::Buffer { buffer, .. } => self.log.lock().unwrap().push(buffer.sequence),
                PullEvent::TimedOut => continue,
                PullEvent::Exhausted => break,
            }
        }
        Ok(())
    }
}

fn request_collector_kind(log: Arc<Mutex<Vec<u64>>>) -> StageKind {
    let descriptor = StageDescriptor::new("request-collector", "sink with request ports")
        .with_input(PortDecl::request_sink("sink_%u", raw()));
    StageKind::new(descriptor, move |_| {
        Ok(Box::new(RequestCollector { log: log.clone() }))
    })
}

/// Source with dynamic outputs: announces the configured kinds once it
/// starts observing its (synthetic) input, then streams to whatever linked.
struct Announcer {
    kinds: Vec<StreamKind>,
    frames: u64,
}

impl StageImpl for Announcer {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        let mut linked = Vec::new();
        for kind in &self.kinds {
            if let Some(port) = ctx.announce(*kind, FormatDescriptor::new(Encoding::RawVideo)) {
                linked.push(port);
            }
        }
        for i in 0..self.frames {
            for &port in &linked {
                ctx.push(port, FrameBuffer::new(i, 0.0, FormatDescriptor::new(Encoding::RawVideo)))?;
            }
        }
        ctx.push_eos();
        Ok(())
    }
}

fn announcer_kind(kinds: Vec<StreamKind>, frames: u64) -> StageKind {
    let descriptor = StageDescriptor::new("announcer", "source with dynamic outputs")
        .with_output(PortDecl::dynamic_src("src_%u", raw()));
    StageKind::new(descriptor, move |_| {
        Ok(Box::new(Announcer {
            kinds: kinds.clone(),
            frames,
        }))
    })
}

/// Stage whose construction counts, to prove nothing is built when
/// preconditions fail
fn counting_kind(counter: Arc<AtomicUsize>) -> StageKind {
    let descriptor = StageDescriptor::new("counted-source", "construction counter")
        .with_output(PortDecl::src("src", raw()));
    StageKind::new(descriptor, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CounterSource { frames: 1 }))
    })
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

// ---------------------------------------------------------------------------
// Construction-time properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_precondition_means_no_stage_is_ever_created() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counting_kind(constructed.clone()));
    registry.register(collector_kind("collector", log));

    let mut graph = GraphSpec::new();
    graph
        .stage("counted-source", "source", StageConfig::new())
        .stage("collector", "sink", StageConfig::new())
        .link("source", "src", "sink", "sink");

    let plan = PipelinePlan {
        name: "missing-input".to_string(),
        preconditions: vec!["/nonexistent/input.mp4".into()],
        graph,
    };

    let err = vidgraph_core::run_pipeline(&registry, plan, never())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PreconditionFailed { .. }));
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_stage_type_aborts_build() {
    let registry = StageRegistry::new();
    let (bus, _events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    let mut spec = GraphSpec::new();
    spec.stage("nvinfer", "pgie", StageConfig::new());

    let err = graph
        .build(&registry, spec, &mut Vec::new())
        .unwrap_err();
    match err {
        PipelineError::UnknownStageType { type_id } => assert_eq!(type_id, "nvinfer"),
        other => panic!("expected UnknownStageType, got {other}"),
    }
}

#[test]
fn incompatible_formats_fail_without_mutating_the_graph() {
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    // A sink that only accepts H.264, disjoint from the raw source.
    let descriptor = StageDescriptor::new("h264-sink", "encoded-only sink")
        .with_input(PortDecl::sink("sink", h264()));
    registry.register(StageKind::new(descriptor, |_| {
        Ok(Box::new(Collector {
            log: Arc::new(Mutex::new(Vec::new())),
        }))
    }));

    let (bus, _events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    let mut spec = GraphSpec::new();
    spec.stage("counter-source", "source", StageConfig::new())
        .stage("h264-sink", "sink", StageConfig::new())
        .link("source", "src", "sink", "sink");

    let err = graph.build(&registry, spec, &mut Vec::new()).unwrap_err();
    match err {
        PipelineError::IncompatibleFormat { src, dst } => {
            assert_eq!(src, PortRef::new("source", "src"));
            assert_eq!(dst, PortRef::new("sink", "sink"));
        }
        other => panic!("expected IncompatibleFormat, got {other}"),
    }

    // No partial link left behind.
    assert_eq!(
        graph.port_is_linked(&PortRef::new("source", "src")),
        Some(false)
    );
    assert_eq!(
        graph.port_is_linked(&PortRef::new("sink", "sink")),
        Some(false)
    );
}

#[test]
fn linking_a_busy_port_fails() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(collector_kind("collector", log));

    let (bus, _events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    let mut spec = GraphSpec::new();
    spec.stage("counter-source", "a", StageConfig::new())
        .stage("counter-source", "b", StageConfig::new())
        .stage("collector", "sink", StageConfig::new())
        .link("a", "src", "sink", "sink")
        .link("b", "src", "sink", "sink");

    let err = graph.build(&registry, spec, &mut Vec::new()).unwrap_err();
    match err {
        PipelineError::PortBusy { port } => assert_eq!(port, PortRef::new("sink", "sink")),
        other => panic!("expected PortBusy, got {other}"),
    }
}

#[test]
fn unsupported_config_keys_warn_but_do_not_abort() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(collector_kind("collector", log));

    let (bus, _events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    let mut spec = GraphSpec::new();
    spec.stage(
        "counter-source",
        "source",
        StageConfig::new().set("frames", 3i64).set("turbo-mode", true),
    )
    .stage("collector", "sink", StageConfig::new())
    .link("source", "src", "sink", "sink");

    graph.build(&registry, spec, &mut Vec::new()).unwrap();

    let warnings = graph.config_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].0, "source");
    assert_eq!(warnings[0].1, vec!["turbo-mode".to_string()]);
}

#[test]
fn activation_rejects_unlinked_static_ports() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(collector_kind("collector", log));

    let (bus, _events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    let mut spec = GraphSpec::new();
    spec.stage("counter-source", "source", StageConfig::new())
        .stage("collector", "sink", StageConfig::new());
    // No link.
    graph.build(&registry, spec, &mut Vec::new()).unwrap();

    let err = graph.activate().unwrap_err();
    assert!(matches!(err, PipelineError::ActivationFailed { .. }));
}

#[test]
fn stop_is_idempotent_and_the_graph_is_not_reusable() {
    let (bus, _events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    assert_eq!(graph.state(), GraphState::Unbuilt);

    graph.stop();
    assert_eq!(graph.state(), GraphState::Stopped);
    graph.stop();
    assert_eq!(graph.state(), GraphState::Stopped);

    let registry = StageRegistry::new();
    let err = graph
        .build(&registry, GraphSpec::new(), &mut Vec::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState { .. }));
}

// ---------------------------------------------------------------------------
// Dynamic port resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_matching_announcement_wins_and_duplicates_are_noops() {
    let video_log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    // Audio first, then video twice: only the first video announcement
    // must link.
    registry.register(announcer_kind(
        vec![StreamKind::Audio, StreamKind::Video, StreamKind::Video],
        4,
    ));
    registry.register(collector_kind("video-collector", video_log.clone()));

    let mut spec = GraphSpec::new();
    spec.stage("announcer", "demux", StageConfig::new())
        .stage("video-collector", "video-sink", StageConfig::new())
        .link_on_announce("demux", StreamKind::Video, "video-sink", "sink");

    let (bus, events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    graph.build(&registry, spec, &mut Vec::new()).unwrap();
    graph.activate().unwrap();

    let outcome = ControlLoop::new(events).run(never()).await;
    assert_eq!(outcome, LoopOutcome::Completed);
    assert_eq!(graph.fulfilled_dynamic_links(), 1);
    graph.stop();

    // One linked port, four frames, no duplicates from the second
    // announcement.
    assert_eq!(*video_log.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn unannounced_kinds_never_link_and_their_sinks_complete_empty() {
    let video_log = Arc::new(Mutex::new(Vec::new()));
    let audio_log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(announcer_kind(vec![StreamKind::Video], 3));
    registry.register(collector_kind("video-collector", video_log.clone()));
    registry.register(collector_kind("audio-collector", audio_log.clone()));

    let mut spec = GraphSpec::new();
    spec.stage("announcer", "demux", StageConfig::new())
        .stage("video-collector", "video-sink", StageConfig::new())
        .stage("audio-collector", "audio-sink", StageConfig::new())
        .link_on_announce("demux", StreamKind::Video, "video-sink", "sink")
        .link_on_announce("demux", StreamKind::Audio, "audio-sink", "sink");

    let (bus, events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    graph.build(&registry, spec, &mut Vec::new()).unwrap();
    graph.activate().unwrap();

    let outcome = ControlLoop::new(events).run(never()).await;
    assert_eq!(outcome, LoopOutcome::Completed);
    assert_eq!(graph.fulfilled_dynamic_links(), 1);
    graph.stop();

    assert_eq!(video_log.lock().unwrap().len(), 3);
    // The audio rule stayed unfulfilled: not an error, just never linked.
    assert!(audio_log.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Inspection hooks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hooks_observe_buffers_in_arrival_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(collector_kind("collector", log.clone()));

    let observed_in_hook = observed.clone();
    let mut spec = GraphSpec::new();
    spec.stage(
        "counter-source",
        "source",
        StageConfig::new().set("frames", 10i64),
    )
    .stage("collector", "sink", StageConfig::new())
    .link("source", "src", "sink", "sink")
    .observe("sink", "sink", PortDirection::Input, move |record| {
        observed_in_hook
            .lock()
            .unwrap()
            .push((record.sequence(), record.object_count()));
        HookVerdict::Forward
    });

    let (bus, events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    graph.build(&registry, spec, &mut Vec::new()).unwrap();
    graph.activate().unwrap();
    let outcome = ControlLoop::new(events).run(never()).await;
    assert_eq!(outcome, LoopOutcome::Completed);
    graph.stop();

    let observed = observed.lock().unwrap();
    let sequences: Vec<u64> = observed.iter().map(|(s, _)| *s).collect();
    assert_eq!(sequences, (0..10).collect::<Vec<u64>>());
    // The hook sees buffers before the sink consumes them, in the same
    // order the sink receives them.
    assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn hook_drop_discards_buffers_without_stopping_the_stream() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(collector_kind("collector", log.clone()));

    let mut spec = GraphSpec::new();
    spec.stage(
        "counter-source",
        "source",
        StageConfig::new().set("frames", 6i64),
    )
    .stage("collector", "sink", StageConfig::new())
    .link("source", "src", "sink", "sink")
    .observe("sink", "sink", PortDirection::Input, |record| {
        if record.sequence() % 2 == 1 {
            HookVerdict::Drop
        } else {
            HookVerdict::Forward
        }
    });

    let (bus, events) = EventBus::channel();
    let mut graph = PipelineGraph::new("t", bus);
    graph.build(&registry, spec, &mut Vec::new()).unwrap();
    graph.activate().unwrap();
    let outcome = ControlLoop::new(events).run(never()).await;
    assert_eq!(outcome, LoopOutcome::Completed);
    graph.stop();

    assert_eq!(*log.lock().unwrap(), vec![0, 2, 4]);
}

#[tokio::test]
async fn hook_fail_faults_the_pipeline() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(collector_kind("collector", log));

    let mut spec = GraphSpec::new();
    spec.stage(
        "counter-source",
        "source",
        StageConfig::new().set("frames", 10i64),
    )
    .stage("collector", "sink", StageConfig::new())
    .link("source", "src", "sink", "sink")
    .observe("sink", "sink", PortDirection::Input, |record| {
        if record.sequence() == 3 {
            HookVerdict::Fail
        } else {
            HookVerdict::Forward
        }
    });

    let plan = PipelinePlan {
        name: "hook-fail".to_string(),
        preconditions: Vec::new(),
        graph: spec,
    };
    let err = vidgraph_core::run_pipeline(&registry, plan, never())
        .await
        .unwrap_err();
    match err {
        PipelineError::RuntimeStageError { stage, .. } => assert_eq!(stage, "sink"),
        other => panic!("expected RuntimeStageError, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle end-to-end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn natural_eos_releases_request_ports_and_stops_cleanly() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(request_collector_kind(log.clone()));

    let mut spec = GraphSpec::new();
    spec.stage(
        "counter-source",
        "source",
        StageConfig::new().set("frames", 8i64),
    )
    .stage("request-collector", "batcher", StageConfig::new())
    .link_via_request("source", "src", "batcher");

    let plan = PipelinePlan {
        name: "eos-run".to_string(),
        preconditions: Vec::new(),
        graph: spec,
    };
    let report = vidgraph_core::run_pipeline(&registry, plan, never())
        .await
        .unwrap();
    assert_eq!(report.outcome, LoopOutcome::Completed);
    assert_eq!(report.released_ports, 1);
    assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<u64>>());
}

#[tokio::test]
async fn mid_stream_fault_still_releases_request_ports() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(failing_relay_kind());
    registry.register(request_collector_kind(log));

    let mut spec = GraphSpec::new();
    spec.stage(
        "counter-source",
        "source",
        StageConfig::new().set("frames", 100i64),
    )
    .stage("failing-relay", "decoder", StageConfig::new().set("fail-at", 3i64))
    .stage("request-collector", "batcher", StageConfig::new())
    .link("source", "src", "decoder", "sink")
    .link_via_request("decoder", "src", "batcher");

    let (bus, events) = EventBus::channel();
    let mut graph = PipelineGraph::new("fault-run", bus);
    let mut handles = Vec::new();
    graph.build(&registry, spec, &mut handles).unwrap();
    assert_eq!(handles.len(), 1);
    graph.activate().unwrap();

    let outcome = ControlLoop::new(events).run(never()).await;
    match &outcome {
        LoopOutcome::Faulted { stage, detail } => {
            assert_eq!(stage, "decoder");
            assert!(detail.contains("synthetic"));
        }
        other => panic!("expected fault, got {other:?}"),
    }

    // Fault path: no graceful drain, straight to stop. Handles are still
    // released, and release remains valid after stop.
    graph.stop();
    assert_eq!(graph.state(), GraphState::Stopped);
    for handle in handles.drain(..).rev() {
        graph.release_request_port(handle).unwrap();
    }
    assert_eq!(graph.outstanding_request_slots(), 0);
}

#[tokio::test]
async fn interrupt_takes_the_drain_then_stop_path() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    registry.register(counter_source_kind());
    registry.register(relay_kind());
    registry.register(collector_kind("collector", log.clone()));

    let mut spec = GraphSpec::new();
    // Unbounded source: only an interrupt ends this run.
    spec.stage(
        "counter-source",
        "source",
        StageConfig::new().set("frames", -1i64),
    )
    .stage("relay", "convert", StageConfig::new())
    .stage("collector", "sink", StageConfig::new())
    .link("source", "src", "convert", "sink")
    .link("convert", "src", "sink", "sink");

    let plan = PipelinePlan {
        name: "interrupted-run".to_string(),
        preconditions: Vec::new(),
        graph: spec,
    };
    let report = vidgraph_core::run_pipeline(
        &registry,
        plan,
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, LoopOutcome::Interrupted);
    // The stream was flowing before the interrupt and drained afterwards.
    assert!(!log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn runs_are_deterministic_for_a_fixed_input() {
    async fn run_once() -> Vec<(u64, usize)> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let observed = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StageRegistry::new();
        registry.register(counter_source_kind());
        registry.register(collector_kind("collector", log));

        let observed_in_hook = observed.clone();
        let mut spec = GraphSpec::new();
        spec.stage(
            "counter-source",
            "source",
            StageConfig::new().set("frames", 16i64),
        )
        .stage("collector", "sink", StageConfig::new())
        .link("source", "src", "sink", "sink")
        .observe("sink", "sink", PortDirection::Input, move |record| {
            observed_in_hook
                .lock()
                .unwrap()
                .push((record.sequence(), record.object_count()));
            HookVerdict::Forward
        });

        let plan = PipelinePlan {
            name: "deterministic-run".to_string(),
            preconditions: Vec::new(),
            graph: spec,
        };
        vidgraph_core::run_pipeline(&registry, plan, never())
            .await
            .unwrap();
        let result = observed.lock().unwrap().clone();
        result
    }

    let first = run_once().await;
    let second = run_once().await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 16);
}
