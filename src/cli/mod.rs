//! Command-line interface for the quality agent

pub mod commands;
pub mod output;

pub use commands::Cli;
pub use output::Output;
