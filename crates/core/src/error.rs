//! Error types for pipeline construction and execution

use crate::graph::GraphState;
use crate::port::PortRef;
use std::path::PathBuf;
use thiserror::Error;

/// Orchestration-level errors. Construction-time failures abort the build
/// with no partial activation; runtime failures arrive through the
/// control-plane event loop and always trigger full teardown.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required file not found: {path}")]
    PreconditionFailed { path: PathBuf },

    #[error("unknown stage type: {type_id}")]
    UnknownStageType { type_id: String },

    #[error("stage '{name}' ({type_id}) could not be constructed: {reason}")]
    StageConstructionFailed {
        name: String,
        type_id: String,
        reason: String,
    },

    #[error("incompatible formats linking {src} -> {dst}")]
    IncompatibleFormat { src: PortRef, dst: PortRef },

    #[error("port {port} is already linked")]
    PortBusy { port: PortRef },

    #[error("no such port: {port}")]
    UnknownPort { port: PortRef },

    #[error("graph is {actual}, operation requires {expected}")]
    InvalidState {
        expected: GraphState,
        actual: GraphState,
    },

    #[error("activation failed for stage '{stage}': {reason}")]
    ActivationFailed { stage: String, reason: String },

    #[error("stage '{stage}' failed at runtime: {detail}")]
    RuntimeStageError { stage: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised inside a stage worker. `Disconnected` means a peer went
/// away during shutdown and is not reported as a pipeline fault.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("peer disconnected")]
    Disconnected,

    #[error("inspection hook rejected buffer on port '{port}'")]
    HookRejected { port: String },
}

impl StageError {
    pub fn failed(msg: impl Into<String>) -> Self {
        StageError::Failed(msg.into())
    }
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        StageError::Failed(e.to_string())
    }
}
