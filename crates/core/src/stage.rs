//! Stage model: configuration maps, per-type configuration schemas, stage
//! descriptors, and the runtime trait implemented by concrete stages.

use crate::error::StageError;
use crate::port::PortDecl;
use crate::runtime::StageContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A configuration value for a stage property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{v}"),
            ConfigValue::Int(v) => write!(f, "{v}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        ConfigValue::Int(i64::from(v))
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

/// Key-value configuration for one stage instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig(BTreeMap<String, ConfigValue>);

impl StageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_str)
    }

    pub fn int_value(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigValue::as_int)
    }

    pub fn float_value(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ConfigValue::as_float)
    }

    pub fn bool_value(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, ConfigValue>> for StageConfig {
    fn from(map: BTreeMap<String, ConfigValue>) -> Self {
        Self(map)
    }
}

/// Declared configuration schema for a stage type. The factory checks every
/// provided key against the schema: unsupported keys become a typed
/// rejection list (surfaced as warnings), missing required keys abort
/// construction.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    keys: Vec<ConfigKey>,
}

#[derive(Debug, Clone)]
struct ConfigKey {
    name: &'static str,
    required: bool,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an optional key
    pub fn key(mut self, name: &'static str) -> Self {
        self.keys.push(ConfigKey {
            name,
            required: false,
        });
        self
    }

    /// Declare a key that must be present for construction to succeed
    pub fn required_key(mut self, name: &'static str) -> Self {
        self.keys.push(ConfigKey {
            name,
            required: true,
        });
        self
    }

    pub fn supports(&self, name: &str) -> bool {
        self.keys.iter().any(|k| k.name == name)
    }

    /// Keys present in the config that the stage type does not support
    pub fn unsupported(&self, config: &StageConfig) -> Vec<String> {
        config
            .keys()
            .filter(|k| !self.supports(k))
            .map(str::to_string)
            .collect()
    }

    /// Required keys absent from the config
    pub fn missing(&self, config: &StageConfig) -> Vec<&'static str> {
        self.keys
            .iter()
            .filter(|k| k.required && config.get(k.name).is_none())
            .map(|k| k.name)
            .collect()
    }
}

/// Static description of a stage type: identity, configuration schema, and
/// port declarations.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub type_id: String,
    pub description: String,
    pub config: ConfigSchema,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
}

impl StageDescriptor {
    pub fn new(type_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            description: description.into(),
            config: ConfigSchema::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ConfigSchema) -> Self {
        self.config = config;
        self
    }

    pub fn with_input(mut self, decl: PortDecl) -> Self {
        self.inputs.push(decl);
        self
    }

    pub fn with_output(mut self, decl: PortDecl) -> Self {
        self.outputs.push(decl);
        self
    }
}

/// Runtime behavior of a stage. Each activated stage runs on its own worker
/// thread; the context carries its channel endpoints, inspection hooks, and
/// the drain flag.
///
/// Worker contract: consume inputs until exhausted (or until `draining()`
/// for sources), forward end-of-stream, and return. Treat a `Disconnected`
/// error as a shutdown signal, not a fault.
pub trait StageImpl: Send {
    /// Called during graph activation, before the worker thread starts.
    /// Returning an error rejects the transition to Active.
    fn prepare(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    /// Runs on a dedicated worker thread until the stream completes
    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), StageError>;
}
