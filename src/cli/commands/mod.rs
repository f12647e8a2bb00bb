use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::sync::Arc;

use crate::checks::builtin_checks;
use crate::config::AgentConfig;
use crate::datastore::BundleStore;
use crate::privacy::NoiseMechanism;
use crate::report::{EventBus, JsonReportRepository, ReportOrchestrator, ReportRepository};
use crate::runner::CheckRunner;

pub mod config;
pub mod generate;
pub mod list;
pub mod serve;
pub mod show;

#[derive(Parser)]
#[command(
    name = "quality-agent",
    version = env!("CARGO_PKG_VERSION"),
    about = "Privacy-preserving data-quality reports over FHIR clinical data",
    long_about = "Runs data-quality checks against a clinical data store and publishes \
                  differentially private reports: every count is Laplace-noised and \
                  small counts are suppressed before anything leaves the agent."
)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a report now and wait for it to finish
    Generate(generate::GenerateArgs),
    /// Show one stored report
    Show(show::ShowArgs),
    /// List stored reports
    List(list::ListArgs),
    /// Generate reports on a schedule until interrupted
    Serve(serve::ServeArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

/// Output format for report commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = crate::config::load(self.config.as_deref().map(Path::new))?;
        setup_logging(&config.logging.level, self.verbose, self.quiet);

        let output = crate::cli::Output::new(self.verbose > 0, self.quiet);
        match self.command {
            Commands::Generate(args) => generate::execute(args, &config, &output).await,
            Commands::Show(args) => show::execute(args, &config, &output).await,
            Commands::List(args) => list::execute(args, &config, &output).await,
            Commands::Serve(args) => serve::execute(args, &config, &output).await,
            Commands::Config(args) => config::execute(args, &config),
        }
    }
}

fn setup_logging(level: &str, verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new(level),
            1 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    // logs go to stderr so that JSON on stdout stays machine-readable
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
    {
        // an embedding application already installed its own subscriber
        tracing::debug!("Keeping existing tracing subscriber: {e}");
    }
}

pub(crate) async fn open_repository(config: &AgentConfig) -> Result<Arc<dyn ReportRepository>> {
    let repository = JsonReportRepository::open(&config.storage.reports_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to open report directory {}",
                config.storage.reports_dir.display()
            )
        })?;
    Ok(Arc::new(repository))
}

/// Assemble the engine over the bundle given on the command line or in the config
pub(crate) async fn build_orchestrator(
    config: &AgentConfig,
    bundle: Option<&Path>,
    bus: EventBus,
) -> Result<(Arc<ReportOrchestrator>, Arc<dyn ReportRepository>)> {
    let Some(bundle) = bundle.or(config.datastore.bundle_path.as_deref()) else {
        bail!("No data store configured: pass --bundle or set datastore.bundle_path");
    };
    let store = BundleStore::load(bundle)?;
    let repository = open_repository(config).await?;

    let runner = CheckRunner::from_config(&config.runner, NoiseMechanism::default());
    let orchestrator = ReportOrchestrator::new(
        repository.clone(),
        Arc::new(store),
        builtin_checks(config),
        runner,
        bus,
    )
    .with_epsilon_budget(config.report.epsilon_budget);

    Ok((Arc::new(orchestrator), repository))
}
