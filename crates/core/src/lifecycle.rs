//! Lifecycle manager: sequences precondition validation, graph build,
//! activation, the control-plane event loop, and teardown. Teardown runs on
//! every exit path, and every acquired request port is released exactly
//! once, in reverse order of acquisition.

use crate::bus::{ControlLoop, EventBus, LoopOutcome};
use crate::error::PipelineError;
use crate::graph::{GraphSpec, PipelineGraph};
use crate::port::RequestedPort;
use crate::registry::StageRegistry;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A complete description of one pipeline run: graph topology plus the
/// external files that must exist before any stage is created.
pub struct PipelinePlan {
    pub name: String,
    pub preconditions: Vec<PathBuf>,
    pub graph: GraphSpec,
}

/// Summary of a finished run
#[derive(Debug)]
pub struct RunReport {
    pub outcome: LoopOutcome,
    pub duration: Duration,
    /// Request-port handles released during teardown
    pub released_ports: usize,
}

/// Summary of a build-only check
#[derive(Debug, serde::Serialize)]
pub struct CheckReport {
    pub stages: usize,
    /// Unsupported configuration keys per stage
    pub warnings: Vec<(String, Vec<String>)>,
}

fn validate_preconditions(paths: &[PathBuf]) -> Result<(), PipelineError> {
    for path in paths {
        if !path.exists() {
            return Err(PipelineError::PreconditionFailed { path: path.clone() });
        }
    }
    Ok(())
}

fn setup(
    graph: &mut PipelineGraph,
    registry: &StageRegistry,
    spec: GraphSpec,
    acquired: &mut Vec<RequestedPort>,
) -> Result<(), PipelineError> {
    graph.build(registry, spec, acquired)?;
    graph.activate()
}

/// Release every acquired handle in reverse order of acquisition, then stop
/// the graph. Returns the number of handles released.
fn teardown(
    graph: &mut PipelineGraph,
    acquired: &mut Vec<RequestedPort>,
    drain: bool,
) -> usize {
    if drain {
        graph.request_drain();
    }
    let mut released = 0;
    while let Some(handle) = acquired.pop() {
        match graph.release_request_port(handle) {
            Ok(()) => released += 1,
            Err(e) => warn!("Failed to release request port: {e}"),
        }
    }
    graph.stop();
    released
}

/// Run a pipeline to completion: validate preconditions, build and activate
/// the graph, drive the control-plane event loop until end-of-stream, a
/// stage fault, or the shutdown future resolves, then tear everything down.
///
/// A fault skips the graceful drain (the graph moves directly to Stopped)
/// but still releases every request port and stops the graph before the
/// error is returned.
///
/// # Errors
///
/// `PreconditionFailed` before any stage is created; build/activation
/// errors from the graph; `RuntimeStageError` when a stage faults
/// mid-stream.
pub async fn run_pipeline(
    registry: &StageRegistry,
    plan: PipelinePlan,
    shutdown: impl Future<Output = ()>,
) -> Result<RunReport, PipelineError> {
    let start = Instant::now();
    validate_preconditions(&plan.preconditions)?;

    let (bus, events) = EventBus::channel();
    let mut graph = PipelineGraph::new(plan.name.clone(), bus);
    let mut acquired: Vec<RequestedPort> = Vec::new();

    if let Err(e) = setup(&mut graph, registry, plan.graph, &mut acquired) {
        teardown(&mut graph, &mut acquired, false);
        return Err(e);
    }

    info!(pipeline = %plan.name, "Pipeline running");
    let outcome = ControlLoop::new(events).run(shutdown).await;

    let drain = !matches!(outcome, LoopOutcome::Faulted { .. });
    let released_ports = teardown(&mut graph, &mut acquired, drain);

    match outcome {
        LoopOutcome::Faulted { stage, detail } => {
            Err(PipelineError::RuntimeStageError { stage, detail })
        }
        outcome => {
            let duration = start.elapsed();
            info!(
                pipeline = %plan.name,
                duration_secs = duration.as_secs_f64(),
                "Pipeline run finished"
            );
            Ok(RunReport {
                outcome,
                duration,
                released_ports,
            })
        }
    }
}

/// Validate preconditions and build the graph without activating it, then
/// tear it down. Reports stage count and configuration warnings.
///
/// # Errors
///
/// The same construction-time errors as a full run.
pub fn check_pipeline(
    registry: &StageRegistry,
    plan: PipelinePlan,
) -> Result<CheckReport, PipelineError> {
    validate_preconditions(&plan.preconditions)?;

    let (bus, _events) = EventBus::channel();
    let mut graph = PipelineGraph::new(plan.name, bus);
    let mut acquired: Vec<RequestedPort> = Vec::new();

    let result = graph.build(registry, plan.graph, &mut acquired);
    let stages = graph.stage_count();
    let warnings = graph.config_warnings();
    teardown(&mut graph, &mut acquired, false);

    result.map(|()| CheckReport { stages, warnings })
}
