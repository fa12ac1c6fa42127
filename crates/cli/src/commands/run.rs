//! Run command: execute a detection pipeline to completion

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{error, info};
use vidgraph_cli::pipeline::detection_plan;
use vidgraph_core::{LoopOutcome, PipelineConfig, StageRegistry};

#[derive(Args)]
pub struct RunCommand {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override the input media path from the config
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Override the output media path from the config
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl RunCommand {
    pub async fn execute(self) -> Result<()> {
        let mut config = PipelineConfig::load(&self.config)?;
        if let Some(input) = self.input {
            config.input_video = input;
        }
        if let Some(output) = self.output {
            config.output_file = output;
        }

        let mut registry = StageRegistry::new();
        vidgraph_sim::register_builtin(&mut registry);

        let plan = detection_plan(&config);
        let shutdown = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No interrupt handler available; run until end of stream.
                std::future::pending::<()>().await;
            }
        };

        match vidgraph_core::run_pipeline(&registry, plan, shutdown).await {
            Ok(report) => {
                match report.outcome {
                    LoopOutcome::Completed => info!(
                        duration_secs = report.duration.as_secs_f64(),
                        output = %config.output_file.display(),
                        "Pipeline completed"
                    ),
                    LoopOutcome::Interrupted => info!(
                        duration_secs = report.duration.as_secs_f64(),
                        "Pipeline interrupted, shut down cleanly"
                    ),
                    LoopOutcome::Faulted { .. } => {}
                }
                Ok(())
            }
            Err(e) => {
                error!("Pipeline failed: {e}");
                bail!("pipeline failed: {e}");
            }
        }
    }
}
