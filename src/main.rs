use anyhow::Result;
use clap::Parser;

use quality_agent::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run().await
}
