//! The pipeline graph: the directed graph of stages and port links, its
//! lifecycle state machine, and the port resolver for static and
//! dynamically-announced connections.

use crate::bus::{EventBus, PipelineEvent};
use crate::caps::FormatContract;
use crate::error::PipelineError;
use crate::port::{PortDecl, PortDirection, PortPresence, PortRef, RequestedPort};
use crate::probe::{HookFn, HookVerdict, InspectionRecord};
use crate::registry::StageRegistry;
use crate::runtime::GraphRuntime;
use crate::stage::{StageConfig, StageDescriptor, StageImpl};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use vidgraph_common::StreamKind;

/// Lifecycle states of a pipeline graph. One lifecycle per instance:
/// constructed once, activated once, torn down once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Unbuilt,
    Built,
    Active,
    Draining,
    Stopped,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphState::Unbuilt => write!(f, "unbuilt"),
            GraphState::Built => write!(f, "built"),
            GraphState::Active => write!(f, "active"),
            GraphState::Draining => write!(f, "draining"),
            GraphState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Declaration of one stage instance in a graph spec
#[derive(Debug, Clone)]
pub struct StageDecl {
    pub type_id: String,
    pub name: String,
    pub config: StageConfig,
}

struct DynamicLinkDecl {
    src_stage: String,
    kind: StreamKind,
    dst: PortRef,
}

struct RequestLinkDecl {
    src: PortRef,
    dst_stage: String,
}

struct HookDecl {
    port: PortRef,
    direction: PortDirection,
    callback: HookFn,
}

/// Declarative description of a graph: stages, links, pending dynamic-link
/// rules, request-port links, and inspection-hook attachments. Consumed by
/// [`PipelineGraph::build`].
#[derive(Default)]
pub struct GraphSpec {
    stages: Vec<StageDecl>,
    links: Vec<(PortRef, PortRef)>,
    dynamic_links: Vec<DynamicLinkDecl>,
    request_links: Vec<RequestLinkDecl>,
    hooks: Vec<HookDecl>,
}

impl GraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stage instance
    pub fn stage(
        &mut self,
        type_id: impl Into<String>,
        name: impl Into<String>,
        config: StageConfig,
    ) -> &mut Self {
        self.stages.push(StageDecl {
            type_id: type_id.into(),
            name: name.into(),
            config,
        });
        self
    }

    /// Declare an immediate link between two static ports
    pub fn link(
        &mut self,
        src_stage: impl Into<String>,
        src_port: impl Into<String>,
        dst_stage: impl Into<String>,
        dst_port: impl Into<String>,
    ) -> &mut Self {
        self.links.push((
            PortRef::new(src_stage, src_port),
            PortRef::new(dst_stage, dst_port),
        ));
        self
    }

    /// Register a pending link rule: when `src_stage` announces a port of
    /// the given kind, link it to the destination. First match wins; later
    /// announcements of the same kind are no-ops.
    pub fn link_on_announce(
        &mut self,
        src_stage: impl Into<String>,
        kind: StreamKind,
        dst_stage: impl Into<String>,
        dst_port: impl Into<String>,
    ) -> &mut Self {
        self.dynamic_links.push(DynamicLinkDecl {
            src_stage: src_stage.into(),
            kind,
            dst: PortRef::new(dst_stage, dst_port),
        });
        self
    }

    /// Acquire a request-port slot on `dst_stage` and link `src` to it. The
    /// acquired slot must be released during teardown.
    pub fn link_via_request(
        &mut self,
        src_stage: impl Into<String>,
        src_port: impl Into<String>,
        dst_stage: impl Into<String>,
    ) -> &mut Self {
        self.request_links.push(RequestLinkDecl {
            src: PortRef::new(src_stage, src_port),
            dst_stage: dst_stage.into(),
        });
        self
    }

    /// Attach an inspection hook to a port. The callback runs synchronously
    /// in the worker thread of that port, once per buffer, in arrival
    /// order, and must not mutate the data.
    pub fn observe<F>(
        &mut self,
        stage: impl Into<String>,
        port: impl Into<String>,
        direction: PortDirection,
        callback: F,
    ) -> &mut Self
    where
        F: FnMut(&InspectionRecord<'_>) -> HookVerdict + Send + 'static,
    {
        self.hooks.push(HookDecl {
            port: PortRef::new(stage, port),
            direction,
            callback: Box::new(callback),
        });
        self
    }
}

/// One instantiated port on a stage
pub(crate) struct PortSlot {
    pub(crate) decl: PortDecl,
    /// Weak reference to the linked peer; does not own it
    pub(crate) peer: Option<PortRef>,
    /// Destination of a pending dynamic-link rule
    pub(crate) awaiting_announce: bool,
    /// Slot acquired from a request template
    pub(crate) requested: bool,
    pub(crate) released: bool,
}

impl PortSlot {
    fn of(decl: PortDecl) -> Self {
        Self {
            decl,
            peer: None,
            awaiting_announce: false,
            requested: false,
            released: false,
        }
    }
}

/// One stage instance owned by the graph
pub(crate) struct StageNode {
    pub(crate) name: String,
    pub(crate) descriptor: StageDescriptor,
    pub(crate) inputs: Vec<PortSlot>,
    pub(crate) outputs: Vec<PortSlot>,
    pub(crate) imp: Option<Box<dyn StageImpl>>,
    pub(crate) config_warnings: Vec<String>,
}

/// State of one pending dynamic-link rule, shared with stage workers so
/// announcements resolve against it at runtime.
pub(crate) struct RuleState {
    pub(crate) src_stage: String,
    pub(crate) kind: StreamKind,
    pub(crate) dst: PortRef,
    pub(crate) dst_contract: FormatContract,
    pub(crate) fulfilled: bool,
}

/// The ordered, directed graph of stages and port connections. Owns its
/// stages for the duration of one lifecycle.
pub struct PipelineGraph {
    name: String,
    state: GraphState,
    pub(crate) nodes: Vec<StageNode>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) rules: Arc<Mutex<Vec<RuleState>>>,
    pub(crate) hooks: Vec<(PortRef, PortDirection, HookFn)>,
    pub(crate) bus: EventBus,
    pub(crate) runtime: Option<GraphRuntime>,
}

impl PipelineGraph {
    pub fn new(name: impl Into<String>, bus: EventBus) -> Self {
        Self {
            name: name.into(),
            state: GraphState::Unbuilt,
            nodes: Vec::new(),
            index: HashMap::new(),
            rules: Arc::new(Mutex::new(Vec::new())),
            hooks: Vec::new(),
            bus,
            runtime: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn stage_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Unsupported configuration keys recorded per stage during build
    pub fn config_warnings(&self) -> Vec<(String, Vec<String>)> {
        self.nodes
            .iter()
            .filter(|n| !n.config_warnings.is_empty())
            .map(|n| (n.name.clone(), n.config_warnings.clone()))
            .collect()
    }

    /// Whether the named port currently has a peer. `None` if no such port.
    pub fn port_is_linked(&self, port: &PortRef) -> Option<bool> {
        for direction in [PortDirection::Output, PortDirection::Input] {
            if let Some((ni, pi)) = self.find_port(port, direction) {
                let slot = match direction {
                    PortDirection::Input => &self.nodes[ni].inputs[pi],
                    PortDirection::Output => &self.nodes[ni].outputs[pi],
                };
                return Some(slot.peer.is_some());
            }
        }
        None
    }

    /// Number of dynamic-link rules that have been fulfilled by an
    /// announcement so far
    pub fn fulfilled_dynamic_links(&self) -> usize {
        match self.rules.lock() {
            Ok(rules) => rules.iter().filter(|r| r.fulfilled).count(),
            Err(_) => 0,
        }
    }

    /// Request-port slots acquired but not yet released
    pub fn outstanding_request_slots(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter())
            .filter(|s| s.requested && !s.released)
            .count()
    }

    /// Build the graph from a spec: create all stages through the registry,
    /// perform all static links, acquire request ports, and register
    /// dynamic-link rules. Fails fast on the first error, identifying the
    /// offending stage or link; stages created before the failure remain in
    /// the graph so teardown sees a consistent view.
    ///
    /// Request-port handles are pushed onto `acquired` as they are taken,
    /// so the caller can release them even when the build aborts midway.
    ///
    /// # Errors
    ///
    /// `UnknownStageType`, `StageConstructionFailed`, `IncompatibleFormat`,
    /// `PortBusy`, `UnknownPort`, or `InvalidState` when the graph is not
    /// `Unbuilt`.
    pub fn build(
        &mut self,
        registry: &StageRegistry,
        spec: GraphSpec,
        acquired: &mut Vec<RequestedPort>,
    ) -> Result<(), PipelineError> {
        if self.state != GraphState::Unbuilt {
            return Err(PipelineError::InvalidState {
                expected: GraphState::Unbuilt,
                actual: self.state,
            });
        }

        info!(
            pipeline = %self.name,
            stages = spec.stages.len(),
            links = spec.links.len(),
            "Building pipeline graph"
        );

        for decl in &spec.stages {
            self.create_stage(registry, decl)?;
        }

        for (src, dst) in &spec.links {
            self.link_static(src, dst)?;
        }

        for rl in &spec.request_links {
            let handle = self.acquire_request_port(&rl.dst_stage)?;
            let dst = handle.port_ref();
            acquired.push(handle);
            self.link_static(&rl.src, &dst)?;
        }

        for dl in &spec.dynamic_links {
            self.register_dynamic_link(&dl.src_stage, dl.kind, &dl.dst)?;
        }

        for hook in spec.hooks {
            // Hooks must reference a port that exists in the declared
            // direction before activation wires them in.
            if self.find_port(&hook.port, hook.direction).is_none() {
                return Err(PipelineError::UnknownPort { port: hook.port });
            }
            self.hooks.push((hook.port, hook.direction, hook.callback));
        }

        self.transition(GraphState::Built);
        Ok(())
    }

    /// Create one stage via the registry and register it into the graph's
    /// stage set before construction completes.
    fn create_stage(
        &mut self,
        registry: &StageRegistry,
        decl: &StageDecl,
    ) -> Result<(), PipelineError> {
        let kind = registry
            .get(&decl.type_id)
            .ok_or_else(|| PipelineError::UnknownStageType {
                type_id: decl.type_id.clone(),
            })?;

        if self.index.contains_key(&decl.name) {
            return Err(PipelineError::StageConstructionFailed {
                name: decl.name.clone(),
                type_id: decl.type_id.clone(),
                reason: "duplicate stage name".to_string(),
            });
        }

        let descriptor = kind.descriptor().clone();
        let inputs = descriptor
            .inputs
            .iter()
            .filter(|d| d.presence == PortPresence::Static)
            .cloned()
            .map(PortSlot::of)
            .collect();
        let outputs = descriptor
            .outputs
            .iter()
            .filter(|d| d.presence == PortPresence::Static)
            .cloned()
            .map(PortSlot::of)
            .collect();

        self.index.insert(decl.name.clone(), self.nodes.len());
        self.nodes.push(StageNode {
            name: decl.name.clone(),
            descriptor,
            inputs,
            outputs,
            imp: None,
            config_warnings: Vec::new(),
        });
        let node_index = self.nodes.len() - 1;

        let missing = self.nodes[node_index].descriptor.config.missing(&decl.config);
        if !missing.is_empty() {
            return Err(PipelineError::StageConstructionFailed {
                name: decl.name.clone(),
                type_id: decl.type_id.clone(),
                reason: format!("missing required config keys: {}", missing.join(", ")),
            });
        }

        // Unsupported keys degrade to warnings: the configuration is
        // partially applied, never silently treated as a full success.
        let unsupported = self.nodes[node_index]
            .descriptor
            .config
            .unsupported(&decl.config);
        for key in &unsupported {
            warn!(stage = %decl.name, key = %key, "Unsupported configuration key ignored");
        }
        self.nodes[node_index].config_warnings = unsupported;

        let imp = kind
            .build(&decl.config)
            .map_err(|reason| PipelineError::StageConstructionFailed {
                name: decl.name.clone(),
                type_id: decl.type_id.clone(),
                reason,
            })?;
        self.nodes[node_index].imp = Some(imp);
        debug!(stage = %decl.name, type_id = %decl.type_id, "Stage created");
        Ok(())
    }

    pub(crate) fn find_port(
        &self,
        port: &PortRef,
        direction: PortDirection,
    ) -> Option<(usize, usize)> {
        let ni = *self.index.get(&port.stage)?;
        let slots = match direction {
            PortDirection::Input => &self.nodes[ni].inputs,
            PortDirection::Output => &self.nodes[ni].outputs,
        };
        let pi = slots.iter().position(|s| s.decl.name == port.port)?;
        Some((ni, pi))
    }

    /// Link two static ports immediately. Validates everything before
    /// mutating, so a failed link leaves the graph unchanged.
    ///
    /// # Errors
    ///
    /// `UnknownPort` if either end does not exist, `PortBusy` if either end
    /// already has a peer, `IncompatibleFormat` if the contracts do not
    /// intersect.
    pub fn link_static(&mut self, src: &PortRef, dst: &PortRef) -> Result<(), PipelineError> {
        let (si, spi) = self
            .find_port(src, PortDirection::Output)
            .ok_or_else(|| PipelineError::UnknownPort { port: src.clone() })?;
        let (di, dpi) = self
            .find_port(dst, PortDirection::Input)
            .ok_or_else(|| PipelineError::UnknownPort { port: dst.clone() })?;

        let src_slot = &self.nodes[si].outputs[spi];
        let dst_slot = &self.nodes[di].inputs[dpi];

        if src_slot.peer.is_some() {
            return Err(PipelineError::PortBusy { port: src.clone() });
        }
        if dst_slot.peer.is_some() || dst_slot.awaiting_announce {
            return Err(PipelineError::PortBusy { port: dst.clone() });
        }
        if !src_slot.decl.contract.intersects(&dst_slot.decl.contract) {
            return Err(PipelineError::IncompatibleFormat {
                src: src.clone(),
                dst: dst.clone(),
            });
        }

        self.nodes[si].outputs[spi].peer = Some(dst.clone());
        self.nodes[di].inputs[dpi].peer = Some(src.clone());
        debug!("Linked {} -> {}", src, dst);
        Ok(())
    }

    /// Store a pending link rule for a port the source stage will announce
    /// at runtime. Does not link anything yet.
    fn register_dynamic_link(
        &mut self,
        src_stage: &str,
        kind: StreamKind,
        dst: &PortRef,
    ) -> Result<(), PipelineError> {
        let src_has_template = self
            .index
            .get(src_stage)
            .map(|&ni| {
                self.nodes[ni]
                    .descriptor
                    .outputs
                    .iter()
                    .any(|d| d.presence == PortPresence::Dynamic)
            })
            .unwrap_or(false);
        if !src_has_template {
            return Err(PipelineError::UnknownPort {
                port: PortRef::new(src_stage, format!("(dynamic {kind})")),
            });
        }

        let (di, dpi) = self
            .find_port(dst, PortDirection::Input)
            .ok_or_else(|| PipelineError::UnknownPort { port: dst.clone() })?;
        let dst_slot = &mut self.nodes[di].inputs[dpi];
        if dst_slot.peer.is_some() || dst_slot.awaiting_announce {
            return Err(PipelineError::PortBusy { port: dst.clone() });
        }
        dst_slot.awaiting_announce = true;
        let dst_contract = dst_slot.decl.contract.clone();

        self.rules
            .lock()
            .map_err(|_| PipelineError::Config("resolver state poisoned".to_string()))?
            .push(RuleState {
                src_stage: src_stage.to_string(),
                kind,
                dst: dst.clone(),
                dst_contract,
                fulfilled: false,
            });
        debug!(src = %src_stage, %kind, dst = %dst, "Registered dynamic link rule");
        Ok(())
    }

    /// Acquire a port slot from a stage's request template. The returned
    /// handle must be released during teardown or the stage leaks the slot.
    pub fn acquire_request_port(&mut self, stage: &str) -> Result<RequestedPort, PipelineError> {
        let ni = *self
            .index
            .get(stage)
            .ok_or_else(|| PipelineError::UnknownPort {
                port: PortRef::new(stage, "(request)"),
            })?;
        let node = &mut self.nodes[ni];
        let template = node
            .descriptor
            .inputs
            .iter()
            .find(|d| d.presence == PortPresence::OnRequest)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownPort {
                port: PortRef::new(stage, "(request)"),
            })?;

        let slot_index = node.inputs.iter().filter(|s| s.requested).count();
        let name = template.name.replace("%u", &slot_index.to_string());
        let decl = PortDecl {
            name: name.clone(),
            direction: PortDirection::Input,
            presence: PortPresence::OnRequest,
            contract: template.contract,
        };
        node.inputs.push(PortSlot {
            decl,
            peer: None,
            awaiting_announce: false,
            requested: true,
            released: false,
        });
        info!(stage = %stage, port = %name, "Acquired request port");
        Ok(RequestedPort::new(stage.to_string(), name))
    }

    /// Release a request-port slot. Consumes the handle, so a slot can be
    /// released exactly once. Valid in any state, including after `stop()`.
    pub fn release_request_port(&mut self, handle: RequestedPort) -> Result<(), PipelineError> {
        let ni = *self
            .index
            .get(handle.stage())
            .ok_or_else(|| PipelineError::UnknownPort {
                port: handle.port_ref(),
            })?;
        let slot = self.nodes[ni]
            .inputs
            .iter_mut()
            .find(|s| s.requested && s.decl.name == handle.port())
            .ok_or_else(|| PipelineError::UnknownPort {
                port: handle.port_ref(),
            })?;

        slot.released = true;
        let peer = slot.peer.take();
        if let Some(peer) = peer {
            if let Some((pni, ppi)) = self.find_port(&peer, PortDirection::Output) {
                self.nodes[pni].outputs[ppi].peer = None;
            }
        }
        info!(port = %handle, "Released request port");
        Ok(())
    }

    /// Activate the graph: verify static-port coverage, let every stage
    /// prepare, then spawn the per-stage workers.
    ///
    /// # Errors
    ///
    /// `ActivationFailed` when a static port is unlinked or a stage rejects
    /// the transition; `InvalidState` when the graph is not `Built`.
    pub fn activate(&mut self) -> Result<(), PipelineError> {
        if self.state != GraphState::Built {
            return Err(PipelineError::InvalidState {
                expected: GraphState::Built,
                actual: self.state,
            });
        }

        for node in &self.nodes {
            for slot in &node.inputs {
                if slot.released {
                    continue;
                }
                if slot.peer.is_none() && !slot.awaiting_announce {
                    return Err(PipelineError::ActivationFailed {
                        stage: node.name.clone(),
                        reason: format!("input port '{}' is not linked", slot.decl.name),
                    });
                }
            }
            for slot in &node.outputs {
                if slot.peer.is_none() {
                    return Err(PipelineError::ActivationFailed {
                        stage: node.name.clone(),
                        reason: format!("output port '{}' is not linked", slot.decl.name),
                    });
                }
            }
        }

        if !self
            .nodes
            .iter()
            .any(|n| n.descriptor.outputs.is_empty())
        {
            return Err(PipelineError::ActivationFailed {
                stage: self.name.clone(),
                reason: "graph has no sink stage".to_string(),
            });
        }

        for node in &mut self.nodes {
            let imp = node
                .imp
                .as_mut()
                .ok_or_else(|| PipelineError::ActivationFailed {
                    stage: node.name.clone(),
                    reason: "stage was never constructed".to_string(),
                })?;
            imp.prepare().map_err(|e| PipelineError::ActivationFailed {
                stage: node.name.clone(),
                reason: e.to_string(),
            })?;
        }

        self.spawn_runtime()?;
        self.transition(GraphState::Active);
        info!(pipeline = %self.name, "Pipeline active");
        Ok(())
    }

    /// Begin draining: sources stop producing and in-flight buffers flush
    /// through. No-op outside the Active state.
    pub fn request_drain(&mut self) {
        if self.state != GraphState::Active {
            return;
        }
        if let Some(runtime) = &self.runtime {
            runtime.draining.store(true, Ordering::SeqCst);
        }
        self.transition(GraphState::Draining);
        info!(pipeline = %self.name, "Drain requested, flushing in-flight buffers");
    }

    /// Stop the graph and reclaim worker threads. Safe to call from any
    /// state and idempotent; the terminal state is always `Stopped`.
    pub fn stop(&mut self) {
        if self.state == GraphState::Stopped {
            return;
        }

        if let Some(runtime) = self.runtime.take() {
            runtime.draining.store(true, Ordering::SeqCst);
            for (stage, handle) in runtime.workers {
                if handle.join().is_err() {
                    warn!(stage = %stage, "Worker thread panicked during shutdown");
                }
            }
        }

        let leaked = self.outstanding_request_slots();
        if leaked > 0 {
            warn!(leaked, "Request port slots still outstanding at stop");
        }

        self.transition(GraphState::Stopped);
        info!(pipeline = %self.name, "Pipeline stopped");
    }

    fn transition(&mut self, to: GraphState) {
        let from = self.state;
        self.state = to;
        debug!(pipeline = %self.name, %from, %to, "State transition");
        self.bus.post(PipelineEvent::StateChanged { from, to });
    }
}
