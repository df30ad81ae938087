//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Unset options fall back to the config file.

use clap::Parser;
use std::path::PathBuf;

/// RankAudit - is a randomized search really random?
///
/// Samples a search endpoint that claims to shuffle its results, records
/// where each result lands, and tests every rank for uniformity.
///
/// Examples:
///   rankaudit --init-config
///   rankaudit --plan
///   rankaudit --rounds 200 --wait-ms 1500
///   rankaudit --analyze-only --format json -o report.json
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .rankaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite database holding the rank counters
    #[arg(short, long, value_name = "FILE", env = "RANKAUDIT_DB")]
    pub database: Option<PathBuf>,

    /// Table name for this query configuration
    #[arg(short, long, value_name = "NAME")]
    pub table: Option<String>,

    /// Search endpoint URL
    #[arg(long, value_name = "URL", env = "RANKAUDIT_URL")]
    pub url: Option<String>,

    /// Number of rounds to run
    ///
    /// Defaults to the number the sample plan says is still missing.
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub rounds: Option<u64>,

    /// Delay before each request, in milliseconds
    #[arg(long, value_name = "MS")]
    pub wait_ms: Option<u64>,

    /// Rank used to measure how many samples exist
    #[arg(long, value_name = "RANK")]
    pub rank: Option<usize>,

    /// Significance level for the uniformity test (0.0 - 1.0, exclusive)
    #[arg(long, value_name = "ALPHA")]
    pub alpha: Option<f64>,

    /// Skip sampling and only analyze what is stored
    #[arg(long, conflicts_with_all = ["plan", "dry_run", "rounds"])]
    pub analyze_only: bool,

    /// Print the sample plan and exit without writing to the database
    #[arg(long, conflicts_with = "dry_run")]
    pub plan: bool,

    /// Fetch one round, print it and exit without touching the database
    #[arg(long)]
    pub dry_run: bool,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Exit with code 2 if any rank rejects uniformity
    #[arg(long)]
    pub fail_on_bias: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .rankaudit.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(alpha) = self.alpha {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err("Alpha must be strictly between 0.0 and 1.0".to_string());
            }
        }

        if let Some(ref table) = self.table {
            crate::store::validate_table_name(table).map_err(|e| e.to_string())?;
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            database: None,
            table: None,
            url: None,
            rounds: None,
            wait_ms: None,
            rank: None,
            alpha: None,
            analyze_only: false,
            plan: false,
            dry_run: false,
            output: None,
            format: OutputFormat::Markdown,
            fail_on_bias: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.url = Some("ftp://example.org".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_alpha_range() {
        let mut args = make_args();
        args.alpha = Some(1.0);
        assert!(args.validate().is_err());

        args.alpha = Some(0.01);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_table_name() {
        let mut args = make_args();
        args.table = Some("ranks; DROP".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "rankaudit", "-n", "25", "--wait-ms", "10", "--format", "json", "--fail-on-bias",
        ])
        .unwrap();
        assert_eq!(args.rounds, Some(25));
        assert_eq!(args.wait_ms, Some(10));
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.fail_on_bias);

        assert!(Args::try_parse_from(["rankaudit", "--analyze-only", "--plan"]).is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
