use anyhow::Result;
use clap::Args;

use super::{OutputFormat, open_repository};
use crate::cli::Output;
use crate::cli::output::Level;
use crate::config::AgentConfig;
use crate::error::EngineError;
use crate::report::{ReportDto, ReportId};

#[derive(Args)]
pub struct ShowArgs {
    /// Report id
    pub id: ReportId,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub async fn execute(args: ShowArgs, config: &AgentConfig, output: &Output) -> Result<()> {
    let repository = open_repository(config).await?;
    let report = repository
        .find_by_id(args.id)
        .await?
        .ok_or(EngineError::NotFound(args.id))?;

    let dto = ReportDto::from(&report);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dto)?),
        OutputFormat::Text => print_report(&dto, output),
    }
    Ok(())
}

pub(crate) fn print_report(report: &ReportDto, output: &Output) {
    output.header(&format!("Report {}", report.id));
    output.table_row("Status", &report.status.to_string());
    output.table_row("Created", &report.generated_at.to_rfc3339());
    output.table_row("Entities", &report.number_of_entities.to_string());
    output.table_row("Epsilon budget", &report.epsilon_budget.to_string());
    output.blank_line();

    if report.results.is_empty() {
        output.info("No results");
        return;
    }

    output.separator();
    for result in &report.results {
        match (&result.error, result.obfuscated_value) {
            (Some(error), _) => output.result_row(&result.check_name, error, Level::Error),
            (None, Some(value)) => {
                let percent = result.ratio * 100.0;
                let level = Level::classify(percent, result.warning_threshold, result.error_threshold);
                output.result_row(
                    &result.check_name,
                    &format!("{value:.0} ({percent:.1}%)"),
                    level,
                );
            }
            (None, None) => output.result_row(&result.check_name, "-", Level::Ok),
        }
    }
    output.separator();
}
