use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::AgentConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Display current merged configuration
    Show {
        /// Output format: toml, json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

pub fn execute(args: ConfigArgs, config: &AgentConfig) -> Result<()> {
    match args.command {
        ConfigCommand::Show { format } => {
            let rendered = match format.to_lowercase().as_str() {
                "json" => serde_json::to_string_pretty(config)?,
                "toml" => toml::to_string_pretty(config)?,
                _ => {
                    return Err(anyhow::anyhow!(
                        "Unsupported format: {format}. Use toml or json"
                    ));
                }
            };
            println!("{rendered}");
        }
    }
    Ok(())
}
