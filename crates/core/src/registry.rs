//! Stage type registry: the factory's lookup table from type identifier to
//! descriptor and builder.

use crate::stage::{StageConfig, StageDescriptor, StageImpl};
use std::collections::HashMap;
use tracing::{info, warn};

type BuilderFn = Box<dyn Fn(&StageConfig) -> Result<Box<dyn StageImpl>, String> + Send + Sync>;

/// A registered stage type: descriptor plus builder
pub struct StageKind {
    descriptor: StageDescriptor,
    builder: BuilderFn,
}

impl StageKind {
    pub fn new<F>(descriptor: StageDescriptor, builder: F) -> Self
    where
        F: Fn(&StageConfig) -> Result<Box<dyn StageImpl>, String> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            builder: Box::new(builder),
        }
    }

    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    /// Ask the backing implementation to construct an instance. A rejection
    /// here surfaces as `StageConstructionFailed`.
    pub(crate) fn build(&self, config: &StageConfig) -> Result<Box<dyn StageImpl>, String> {
        (self.builder)(config)
    }
}

impl std::fmt::Debug for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageKind")
            .field("type_id", &self.descriptor.type_id)
            .finish()
    }
}

/// Registry of stage types available to the factory
#[derive(Debug, Default)]
pub struct StageRegistry {
    kinds: HashMap<String, StageKind>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: StageKind) {
        let type_id = kind.descriptor.type_id.clone();
        info!("Registering stage type: {}", type_id);
        if self.kinds.insert(type_id.clone(), kind).is_some() {
            warn!("Stage type '{}' was already registered, replacing", type_id);
        }
    }

    pub fn get(&self, type_id: &str) -> Option<&StageKind> {
        self.kinds.get(type_id)
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.kinds.contains_key(type_id)
    }

    /// Registered type identifiers, sorted for stable listings
    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
