use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{OutputFormat, build_orchestrator};
use crate::cli::Output;
use crate::config::AgentConfig;
use crate::report::{EventBus, ReportDto};
use crate::upload::{OutboxSender, ReportUploadListener};

#[derive(Args)]
pub struct GenerateArgs {
    /// FHIR Bundle (JSON) to run the checks against
    #[arg(long, value_name = "FILE")]
    pub bundle: Option<PathBuf>,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "300")]
    pub timeout: u64,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub async fn execute(args: GenerateArgs, config: &AgentConfig, output: &Output) -> Result<()> {
    let (orchestrator, repository) =
        build_orchestrator(config, args.bundle.as_deref(), EventBus::new()).await?;
    output.verbose(&format!("Running {} checks", orchestrator.checks().len()));

    let dispatcher = orchestrator.start();
    let report = orchestrator
        .generate_and_wait(Duration::from_secs(args.timeout))
        .await;
    dispatcher.abort();
    let report = report?;

    if config.upload.enabled {
        let delivered = ReportUploadListener::new(repository)
            .with_sender(Arc::new(OutboxSender::new(&config.upload.outbox_dir)))
            .upload(report.id)
            .await;
        if delivered == 0 {
            output.warning("Report could not be placed in the outbox");
        }
    }

    let dto = ReportDto::from(&report);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dto)?),
        OutputFormat::Text => {
            output.success(&format!("Report {} generated", dto.id));
            super::show::print_report(&dto, output);
        }
    }
    Ok(())
}
