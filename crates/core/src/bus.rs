//! Control-plane event bus and the single-threaded event loop that drives
//! orchestration-level state transitions.

use crate::graph::GraphState;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Asynchronous lifecycle/error notifications, distinct from the per-buffer
/// data path.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The stream reached its natural end. Normal termination, not an error.
    EndOfStream,
    /// A stage reported a fatal internal error
    Error { stage: String, detail: String },
    /// The graph moved between lifecycle states
    StateChanged { from: GraphState, to: GraphState },
}

/// Sender half of the control-plane channel. Cheap to clone into stage
/// workers; posting never blocks the data path.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventBus {
    pub fn channel() -> (EventBus, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventBus { tx }, rx)
    }

    /// Post an event. Events posted after the loop has terminated (e.g.
    /// state changes during teardown) are dropped silently.
    pub fn post(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Terminal outcome of the event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// End of stream reached; proceed to graceful teardown
    Completed,
    /// A stage faulted; teardown still runs, draining is skipped
    Faulted { stage: String, detail: String },
    /// External interrupt; drain then stop
    Interrupted,
}

/// Run-to-completion event loop. Consumes events until a terminal condition
/// arrives; suspension happens only while blocked on event arrival.
pub struct ControlLoop {
    rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl ControlLoop {
    pub fn new(rx: mpsc::UnboundedReceiver<PipelineEvent>) -> Self {
        Self { rx }
    }

    /// Consume events until end-of-stream, a stage error, or the shutdown
    /// future resolves. Loop termination is the sole trigger for moving the
    /// lifecycle from running to shutting down.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> LoopOutcome {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Interrupt received, draining pipeline");
                    return LoopOutcome::Interrupted;
                }
                event = self.rx.recv() => match event {
                    Some(PipelineEvent::EndOfStream) => {
                        info!("End of stream reached");
                        return LoopOutcome::Completed;
                    }
                    Some(PipelineEvent::Error { stage, detail }) => {
                        error!(stage, "Pipeline error: {}", detail);
                        return LoopOutcome::Faulted { stage, detail };
                    }
                    Some(PipelineEvent::StateChanged { from, to }) => {
                        debug!(%from, %to, "Graph state changed");
                    }
                    None => {
                        // Every sender dropped without a terminal event;
                        // nothing more can arrive.
                        warn!("Control-plane bus closed without a terminal event");
                        return LoopOutcome::Completed;
                    }
                }
            }
        }
    }
}
