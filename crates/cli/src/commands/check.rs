//! Check command: validate configuration and construct the graph without
//! activating it

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{error, warn};
use vidgraph_cli::pipeline::detection_plan;
use vidgraph_core::{PipelineConfig, StageRegistry};

#[derive(Args)]
pub struct CheckCommand {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    pub fn execute(self) -> Result<()> {
        let config = PipelineConfig::load(&self.config)?;

        let mut registry = StageRegistry::new();
        vidgraph_sim::register_builtin(&mut registry);

        match vidgraph_core::check_pipeline(&registry, detection_plan(&config)) {
            Ok(report) => {
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("OK: {} stages constructed and linked", report.stages);
                    for (stage, keys) in &report.warnings {
                        warn!(stage = %stage, keys = ?keys, "Unsupported configuration keys");
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!("Check failed: {e}");
                bail!("check failed: {e}");
            }
        }
    }
}
