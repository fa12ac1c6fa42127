//! Vidgraph Core - Pipeline orchestration engine
//!
//! This crate provides the component-graph model for directed media
//! pipelines: a stage registry/factory, static and dynamically-announced
//! port resolution with format-contract matching, the graph lifecycle state
//! machine, non-mutating inspection hooks, the asynchronous control-plane
//! event loop, and the lifecycle manager that guarantees teardown on every
//! exit path.
//!
//! Processing stages (demux, decode, inference, encode, ...) are opaque to
//! this crate: they are declared through port contracts and configuration
//! schemas, registered by type identifier, and driven over channels by
//! per-stage worker threads.

pub mod buffer;
pub mod bus;
pub mod caps;
pub mod config;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod port;
pub mod probe;
pub mod registry;
pub mod runtime;
pub mod stage;

pub use buffer::{DataMessage, FrameBuffer};
pub use bus::{ControlLoop, EventBus, LoopOutcome, PipelineEvent};
pub use caps::{Encoding, FormatContract, FormatDescriptor, MemoryClass, PixelLayout};
pub use config::{BatchingConfig, EncoderConfig, PipelineConfig};
pub use error::{PipelineError, StageError};
pub use graph::{GraphSpec, GraphState, PipelineGraph, StageDecl};
pub use lifecycle::{check_pipeline, run_pipeline, CheckReport, PipelinePlan, RunReport};
pub use port::{PortDecl, PortDirection, PortPresence, PortRef, RequestedPort};
pub use probe::{HookVerdict, InspectionRecord};
pub use registry::{StageKind, StageRegistry};
pub use runtime::{PullEvent, StageContext};
pub use stage::{ConfigSchema, ConfigValue, StageConfig, StageDescriptor, StageImpl};
