use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{OutputFormat, open_repository};
use crate::cli::Output;
use crate::config::AgentConfig;
use crate::report::{Report, ReportId, ReportStatus};

#[derive(Args)]
pub struct ListArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportSummary {
    id: ReportId,
    generated_at: String,
    status: ReportStatus,
    results: usize,
    failures: usize,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id,
            generated_at: report.generated_at.to_rfc3339(),
            status: report.status,
            results: report.results.len(),
            failures: report.failed_results().count(),
        }
    }
}

pub async fn execute(args: ListArgs, config: &AgentConfig, output: &Output) -> Result<()> {
    let reports = open_repository(config).await?.find_all().await?;
    let summaries: Vec<ReportSummary> = reports.iter().map(ReportSummary::from).collect();

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Text => {
            if summaries.is_empty() {
                output.info("No reports yet");
                return Ok(());
            }
            output.header(&format!("Reports ({})", summaries.len()));
            for summary in &summaries {
                output.table_row(
                    &format!("#{}", summary.id),
                    &format!(
                        "{}  {}  {} results, {} failed",
                        summary.status, summary.generated_at, summary.results, summary.failures
                    ),
                );
            }
        }
    }
    Ok(())
}
