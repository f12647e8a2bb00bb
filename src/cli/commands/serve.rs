use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::build_orchestrator;
use crate::cli::Output;
use crate::config::AgentConfig;
use crate::report::{EventBus, ReportScheduler};
use crate::upload::{OutboxSender, ReportUploadListener};

#[derive(Args)]
pub struct ServeArgs {
    /// FHIR Bundle (JSON) to run the checks against
    #[arg(long, value_name = "FILE")]
    pub bundle: Option<PathBuf>,

    /// Override schedule.interval_secs
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

pub async fn execute(args: ServeArgs, config: &AgentConfig, output: &Output) -> Result<()> {
    let bus = EventBus::new();
    let (orchestrator, repository) =
        build_orchestrator(config, args.bundle.as_deref(), bus.clone()).await?;

    let dispatcher = orchestrator.start();
    let uploader = config.upload.enabled.then(|| {
        ReportUploadListener::new(repository)
            .with_sender(Arc::new(OutboxSender::new(&config.upload.outbox_dir)))
            .start(&bus)
    });

    let interval = args
        .interval
        .filter(|secs| *secs > 0)
        .map_or_else(|| config.schedule.interval(), Duration::from_secs);
    output.info(&format!(
        "Generating a report every {}s, press Ctrl-C to stop",
        interval.as_secs()
    ));

    let created = ReportScheduler::new(orchestrator, interval)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    dispatcher.abort();
    if let Some(uploader) = uploader {
        uploader.abort();
    }
    output.success(&format!("Stopped after {created} scheduled reports"));
    Ok(())
}
