//! Console output for the quality agent CLI
//!
//! Consistent symbols and colors for human-readable output. Status messages
//! (`success`, `warning`, `info`, `verbose`) go to stderr; report content goes
//! to stdout. JSON output bypasses this module and goes straight to stdout.

use console::style;

/// Output handler for consistent CLI formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("✔").green(), message);
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("⚠").yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("ℹ").blue(), message);
        }
    }

    /// Only printed with `--verbose`
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            eprintln!("{} {}", style("ℹ").dim(), style(message).dim());
        }
    }

    pub fn header(&self, title: &str) {
        if !self.quiet {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    pub fn table_row(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {:<20} {}", style(key).dim(), value);
        }
    }

    /// One report result; the value is highlighted against its thresholds
    pub fn result_row(&self, name: &str, value: &str, level: Level) {
        if self.quiet {
            return;
        }
        let value = match level {
            Level::Ok => style(value).green(),
            Level::Warning => style(value).yellow(),
            Level::Error => style(value).red().bold(),
        };
        println!("  {} {:<48} {}", style("•").cyan(), name, value);
    }

    pub fn separator(&self) {
        if !self.quiet {
            println!("{}", style("─".repeat(60)).dim());
        }
    }

    pub fn blank_line(&self) {
        if !self.quiet {
            println!();
        }
    }
}

/// Severity of a result value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Ok,
    Warning,
    Error,
}

impl Level {
    /// Classify a percentage against warning and error thresholds
    pub fn classify(percent: f64, warning: u32, error: u32) -> Self {
        if percent > f64::from(error) {
            Level::Error
        } else if percent > f64::from(warning) {
            Level::Warning
        } else {
            Level::Ok
        }
    }
}
