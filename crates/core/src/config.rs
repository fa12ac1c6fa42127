//! Pipeline run configuration: the external interface of a detection run,
//! loaded from YAML.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Frame batching parameters (batch assembly ahead of inference)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// How long to wait for a full batch before pushing a partial one
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_batch_size() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    40
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            batch_size: default_batch_size(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Re-encoding parameters for the output stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Target bitrate in bits per second
    #[serde(default = "default_bitrate")]
    pub bitrate: u64,
}

fn default_bitrate() -> u64 {
    4_000_000
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate: default_bitrate(),
        }
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input media file
    pub input_video: PathBuf,
    /// Output media file
    pub output_file: PathBuf,
    /// Inference engine configuration file
    pub infer_config: PathBuf,
    /// Tracker configuration file
    pub tracker_config: PathBuf,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

impl PipelineConfig {
    /// Load from a YAML file
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` when the file cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Files that must exist before any stage is created. The output file
    /// is created by the run and is not a precondition.
    pub fn required_files(&self) -> Vec<PathBuf> {
        vec![
            self.input_video.clone(),
            self.infer_config.clone(),
            self.tracker_config.clone(),
        ]
    }
}
