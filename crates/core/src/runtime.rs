//! Data-path runtime: channel wiring between linked ports, per-stage worker
//! threads, and the context handed to each running stage.

use crate::buffer::{DataMessage, FrameBuffer};
use crate::bus::PipelineEvent;
use crate::caps::FormatDescriptor;
use crate::error::{PipelineError, StageError};
use crate::graph::{PipelineGraph, RuleState};
use crate::port::PortDirection;
use crate::probe::{HookSet, HookVerdict};
use crossbeam_channel::{bounded, Receiver, RecvError, Select, Sender};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use vidgraph_common::StreamKind;

/// Buffers in flight per link. Bounded so a slow stage backpressures its
/// upstream instead of growing memory without limit.
const LINK_CAPACITY: usize = 8;

/// Live worker threads and the shared drain flag
pub(crate) struct GraphRuntime {
    pub(crate) workers: Vec<(String, JoinHandle<()>)>,
    pub(crate) draining: Arc<AtomicBool>,
}

pub(crate) struct InputPort {
    name: String,
    rx: Receiver<DataMessage>,
    hooks: HookSet,
    eos: bool,
}

pub(crate) struct OutputPort {
    name: String,
    tx: Sender<DataMessage>,
    hooks: HookSet,
}

/// Output channel created for a dynamic-link rule, parked until the stage
/// announces a matching port.
struct ParkedOutput {
    rule: usize,
    tx: Sender<DataMessage>,
}

/// Result of waiting on any input port
#[derive(Debug)]
pub enum PullEvent {
    /// A buffer arrived on the given input port
    Buffer { port: usize, buffer: FrameBuffer },
    /// The timeout elapsed with no message
    TimedOut,
    /// Every input port has reached end of stream
    Exhausted,
}

/// Everything a running stage needs: its channel endpoints, attached
/// inspection hooks, the dynamic-port resolver, and the drain flag. Owned
/// by the worker thread for the duration of the run.
pub struct StageContext {
    stage: String,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    parked: Vec<ParkedOutput>,
    rules: Arc<Mutex<Vec<RuleState>>>,
    draining: Arc<AtomicBool>,
}

impl StageContext {
    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Currently linked outputs (announced ports appear here once linked)
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// True once a drain has been requested; sources should finish their
    /// stream and forward end-of-stream.
    pub fn draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Receive the next buffer from one input port. Returns `Ok(None)` once
    /// the port reached end of stream (an expected state, signaled
    /// explicitly, not a fault). A peer that disappears without sending
    /// end-of-stream raises `Disconnected`: the worker exits quietly and
    /// does not forge an end-of-stream of its own, so an upstream fault
    /// cannot masquerade as a clean completion.
    ///
    /// Hooks attached to the port run here, in arrival order; a `Drop`
    /// verdict skips the buffer, a `Fail` verdict raises `HookRejected`.
    pub fn pull(&mut self, port: usize) -> Result<Option<FrameBuffer>, StageError> {
        loop {
            let message = {
                let input = &self.inputs[port];
                if input.eos {
                    return Ok(None);
                }
                input.rx.recv()
            };
            match message {
                Ok(DataMessage::Buffer(buffer)) => {
                    match self.inputs[port].hooks.inspect(&buffer) {
                        HookVerdict::Forward => return Ok(Some(buffer)),
                        HookVerdict::Drop => continue,
                        HookVerdict::Fail => {
                            return Err(StageError::HookRejected {
                                port: self.inputs[port].name.clone(),
                            })
                        }
                    }
                }
                Ok(DataMessage::EndOfStream) => {
                    self.inputs[port].eos = true;
                    return Ok(None);
                }
                Err(RecvError) => return Err(StageError::Disconnected),
            }
        }
    }

    /// Wait for a buffer on any input port, with an optional timeout.
    /// Used by stages that merge several inputs (e.g. a batcher with
    /// request ports and a batched-push timeout).
    pub fn pull_any(&mut self, timeout: Option<Duration>) -> Result<PullEvent, StageError> {
        loop {
            let live: Vec<usize> = (0..self.inputs.len())
                .filter(|&i| !self.inputs[i].eos)
                .collect();
            if live.is_empty() {
                return Ok(PullEvent::Exhausted);
            }

            let selected = {
                let mut select = Select::new();
                for &i in &live {
                    select.recv(&self.inputs[i].rx);
                }
                match timeout {
                    Some(t) => match select.select_timeout(t) {
                        Ok(op) => {
                            let port = live[op.index()];
                            Some((port, op.recv(&self.inputs[port].rx)))
                        }
                        Err(_) => None,
                    },
                    None => {
                        let op = select.select();
                        let port = live[op.index()];
                        Some((port, op.recv(&self.inputs[port].rx)))
                    }
                }
            };

            match selected {
                None => return Ok(PullEvent::TimedOut),
                Some((port, Ok(DataMessage::Buffer(buffer)))) => {
                    match self.inputs[port].hooks.inspect(&buffer) {
                        HookVerdict::Forward => return Ok(PullEvent::Buffer { port, buffer }),
                        HookVerdict::Drop => continue,
                        HookVerdict::Fail => {
                            return Err(StageError::HookRejected {
                                port: self.inputs[port].name.clone(),
                            })
                        }
                    }
                }
                Some((port, Ok(DataMessage::EndOfStream))) => {
                    self.inputs[port].eos = true;
                    continue;
                }
                Some((_, Err(_))) => return Err(StageError::Disconnected),
            }
        }
    }

    /// Send a buffer downstream on one output port. Hooks attached to the
    /// port run before the send. `Disconnected` means the peer went away
    /// (shutdown), not a fault.
    pub fn push(&mut self, port: usize, buffer: FrameBuffer) -> Result<(), StageError> {
        let output = &mut self.outputs[port];
        match output.hooks.inspect(&buffer) {
            HookVerdict::Forward => output
                .tx
                .send(DataMessage::Buffer(buffer))
                .map_err(|_| StageError::Disconnected),
            HookVerdict::Drop => Ok(()),
            HookVerdict::Fail => Err(StageError::HookRejected {
                port: output.name.clone(),
            }),
        }
    }

    /// Signal end of stream on every linked output
    pub fn push_eos(&mut self) {
        for output in &self.outputs {
            let _ = output.tx.send(DataMessage::EndOfStream);
        }
    }

    /// Announce a dynamically discovered port of the given kind. The
    /// resolver matches it against pending link rules, first match wins;
    /// announcements for a kind that is already linked, or that no rule
    /// expects, are no-ops. On a match the new output port index is
    /// returned and the stage may start pushing to it.
    pub fn announce(&mut self, kind: StreamKind, format: FormatDescriptor) -> Option<usize> {
        let (rule_index, dst) = {
            let Ok(mut rules) = self.rules.lock() else {
                return None;
            };
            let index = rules
                .iter()
                .position(|r| r.src_stage == self.stage && r.kind == kind && !r.fulfilled);
            let Some(index) = index else {
                debug!(stage = %self.stage, %kind, "No pending link rule for announced port, ignoring");
                return None;
            };
            if !rules[index].dst_contract.accepts(&format) {
                warn!(
                    stage = %self.stage,
                    %kind,
                    format = %format,
                    "Announced port does not satisfy the pending contract, ignoring"
                );
                return None;
            }
            rules[index].fulfilled = true;
            (index, rules[index].dst.clone())
        };

        let position = self.parked.iter().position(|p| p.rule == rule_index)?;
        let parked = self.parked.remove(position);
        info!(stage = %self.stage, %kind, dst = %dst, "Dynamic port linked");
        self.outputs.push(OutputPort {
            name: format!("src_{kind}"),
            tx: parked.tx,
            hooks: HookSet::default(),
        });
        Some(self.outputs.len() - 1)
    }
}

impl Drop for StageContext {
    /// Pending link rules that were never fulfilled become permanently
    /// unfulfilled once this stream instance completes: their parked
    /// channels receive end-of-stream so the waiting destinations finish
    /// cleanly instead of hanging.
    fn drop(&mut self) {
        for parked in &self.parked {
            let _ = parked.tx.send(DataMessage::EndOfStream);
        }
    }
}

impl PipelineGraph {
    /// Wire channels for every link, attach hooks to their endpoints, and
    /// spawn one worker thread per stage.
    pub(crate) fn spawn_runtime(&mut self) -> Result<(), PipelineError> {
        let draining = Arc::new(AtomicBool::new(false));

        let mut input_rx: HashMap<(usize, usize), Receiver<DataMessage>> = HashMap::new();
        let mut output_tx: HashMap<(usize, usize), Sender<DataMessage>> = HashMap::new();

        for ni in 0..self.nodes.len() {
            for pi in 0..self.nodes[ni].outputs.len() {
                let Some(peer) = self.nodes[ni].outputs[pi].peer.clone() else {
                    continue;
                };
                let (di, dpi) = self
                    .find_port(&peer, PortDirection::Input)
                    .ok_or_else(|| PipelineError::UnknownPort { port: peer })?;
                let (tx, rx) = bounded(LINK_CAPACITY);
                output_tx.insert((ni, pi), tx);
                input_rx.insert((di, dpi), rx);
            }
        }

        // Channels for pending dynamic rules: the destination receives its
        // endpoint now; the sender is parked with the announcing stage and
        // handed over on the first matching announcement.
        let mut parked_for_stage: HashMap<String, Vec<ParkedOutput>> = HashMap::new();
        {
            let rules = self
                .rules
                .lock()
                .map_err(|_| PipelineError::Config("resolver state poisoned".to_string()))?;
            for (ri, rule) in rules.iter().enumerate() {
                let (di, dpi) = self
                    .find_port(&rule.dst, PortDirection::Input)
                    .ok_or_else(|| PipelineError::UnknownPort {
                        port: rule.dst.clone(),
                    })?;
                let (tx, rx) = bounded(LINK_CAPACITY);
                input_rx.insert((di, dpi), rx);
                parked_for_stage
                    .entry(rule.src_stage.clone())
                    .or_default()
                    .push(ParkedOutput { rule: ri, tx });
            }
        }

        let mut hook_map: HashMap<(usize, usize, PortDirection), HookSet> = HashMap::new();
        let drained_hooks: Vec<_> = self.hooks.drain(..).collect();
        for (port, direction, callback) in drained_hooks {
            let (ni, pi) = self
                .find_port(&port, direction)
                .ok_or_else(|| PipelineError::UnknownPort { port })?;
            hook_map.entry((ni, pi, direction)).or_default().push(callback);
        }

        let sink_count = self
            .nodes
            .iter()
            .filter(|n| n.descriptor.outputs.is_empty())
            .count();
        let sinks_remaining = Arc::new(AtomicUsize::new(sink_count));

        struct PreparedWorker {
            name: String,
            imp: Box<dyn crate::stage::StageImpl>,
            ctx: StageContext,
            is_sink: bool,
        }

        let mut prepared = Vec::with_capacity(self.nodes.len());
        for ni in 0..self.nodes.len() {
            let name = self.nodes[ni].name.clone();
            let imp = self.nodes[ni]
                .imp
                .take()
                .ok_or_else(|| PipelineError::ActivationFailed {
                    stage: name.clone(),
                    reason: "stage was never constructed".to_string(),
                })?;

            let mut inputs = Vec::new();
            for pi in 0..self.nodes[ni].inputs.len() {
                if self.nodes[ni].inputs[pi].released {
                    continue;
                }
                let rx = input_rx
                    .remove(&(ni, pi))
                    .ok_or_else(|| PipelineError::ActivationFailed {
                        stage: name.clone(),
                        reason: format!(
                            "no channel for input port '{}'",
                            self.nodes[ni].inputs[pi].decl.name
                        ),
                    })?;
                inputs.push(InputPort {
                    name: self.nodes[ni].inputs[pi].decl.name.clone(),
                    rx,
                    hooks: hook_map
                        .remove(&(ni, pi, PortDirection::Input))
                        .unwrap_or_default(),
                    eos: false,
                });
            }

            let mut outputs = Vec::new();
            for pi in 0..self.nodes[ni].outputs.len() {
                let Some(tx) = output_tx.remove(&(ni, pi)) else {
                    continue;
                };
                outputs.push(OutputPort {
                    name: self.nodes[ni].outputs[pi].decl.name.clone(),
                    tx,
                    hooks: hook_map
                        .remove(&(ni, pi, PortDirection::Output))
                        .unwrap_or_default(),
                });
            }

            let ctx = StageContext {
                stage: name.clone(),
                inputs,
                outputs,
                parked: parked_for_stage.remove(&name).unwrap_or_default(),
                rules: self.rules.clone(),
                draining: draining.clone(),
            };
            let is_sink = self.nodes[ni].descriptor.outputs.is_empty();
            prepared.push(PreparedWorker {
                name,
                imp,
                ctx,
                is_sink,
            });
        }

        let mut workers = Vec::with_capacity(prepared.len());
        for worker in prepared {
            let PreparedWorker {
                name,
                imp,
                ctx,
                is_sink,
            } = worker;
            let bus = self.bus.clone();
            let sinks_remaining = sinks_remaining.clone();
            let stage = name.clone();

            let handle = std::thread::Builder::new()
                .name(format!("stage-{name}"))
                .spawn(move || {
                    debug!(stage = %stage, "Worker started");
                    match catch_unwind(AssertUnwindSafe(|| imp.run(ctx))) {
                        Ok(Ok(())) => {
                            debug!(stage = %stage, "Worker finished");
                            // The last sink to finish marks the whole
                            // stream as complete.
                            if is_sink && sinks_remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                                bus.post(PipelineEvent::EndOfStream);
                            }
                        }
                        Ok(Err(StageError::Disconnected)) => {
                            debug!(stage = %stage, "Worker exited on disconnect");
                        }
                        Ok(Err(e)) => {
                            bus.post(PipelineEvent::Error {
                                stage: stage.clone(),
                                detail: e.to_string(),
                            });
                        }
                        Err(_) => {
                            bus.post(PipelineEvent::Error {
                                stage: stage.clone(),
                                detail: "worker panicked".to_string(),
                            });
                        }
                    }
                })
                .map_err(|e| PipelineError::ActivationFailed {
                    stage: name.clone(),
                    reason: format!("failed to spawn worker: {e}"),
                })?;
            workers.push((name, handle));
        }

        self.runtime = Some(GraphRuntime { workers, draining });
        Ok(())
    }
}
