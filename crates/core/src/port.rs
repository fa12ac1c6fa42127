//! Port model: typed connection points on stages, static or dynamic,
//! and the move-only handle for dynamically requested port slots.

use crate::caps::FormatContract;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a port relative to its stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// How a port comes into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPresence {
    /// Exists as soon as the stage is created
    Static,
    /// Announced by the stage at runtime, once it has observed its input
    Dynamic,
    /// Acquired explicitly from a template; the slot must be released
    OnRequest,
}

/// Declaration of a port on a stage type. For `Dynamic` and `OnRequest`
/// ports the name is a template (`src_%u`, `sink_%u`).
#[derive(Debug, Clone)]
pub struct PortDecl {
    pub name: String,
    pub direction: PortDirection,
    pub presence: PortPresence,
    pub contract: FormatContract,
}

impl PortDecl {
    /// Static input port
    pub fn sink(name: impl Into<String>, contract: FormatContract) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            presence: PortPresence::Static,
            contract,
        }
    }

    /// Static output port
    pub fn src(name: impl Into<String>, contract: FormatContract) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            presence: PortPresence::Static,
            contract,
        }
    }

    /// Output port template announced at runtime
    pub fn dynamic_src(template: impl Into<String>, contract: FormatContract) -> Self {
        Self {
            name: template.into(),
            direction: PortDirection::Output,
            presence: PortPresence::Dynamic,
            contract,
        }
    }

    /// Input port template instantiated per request
    pub fn request_sink(template: impl Into<String>, contract: FormatContract) -> Self {
        Self {
            name: template.into(),
            direction: PortDirection::Input,
            presence: PortPresence::OnRequest,
            contract,
        }
    }
}

/// Reference to a port by stage and port name. Holding a `PortRef` does not
/// keep anything alive; it is resolved against the graph on use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub stage: String,
    pub port: String,
}

impl PortRef {
    pub fn new(stage: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stage, self.port)
    }
}

/// Handle for a port slot acquired from a request template. Move-only: the
/// slot is released by passing the handle back to the graph, which consumes
/// it, so a handle can neither be released twice nor copied.
#[derive(Debug)]
pub struct RequestedPort {
    stage: String,
    port: String,
}

impl RequestedPort {
    pub(crate) fn new(stage: String, port: String) -> Self {
        Self { stage, port }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn port_ref(&self) -> PortRef {
        PortRef::new(self.stage.clone(), self.port.clone())
    }
}

impl fmt::Display for RequestedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stage, self.port)
    }
}
