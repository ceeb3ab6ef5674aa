//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::contract::{Analyzer, Network, Priority};
use crate::models::{AuditId, ExportFormat, ResultId, Severity};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Contract Sentry - smart-contract security analysis from the terminal
///
/// Submit a contract address or source file to the analysis backend,
/// follow the audit's progress, and render the vulnerability report.
///
/// Examples:
///   contract-sentry analyze --address 0x1234...7890 --network fuji
///   contract-sentry analyze --source ./Token.sol --analyzers static-analysis,gas-analysis
///   contract-sentry results 42 43 --format json
///   contract-sentry reports --page 2
///   contract-sentry --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Base URL of the analysis API
    #[arg(long, global = true, value_name = "URL", env = "CONTRACT_SENTRY_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the analysis API
    #[arg(
        long,
        global = true,
        value_name = "TOKEN",
        env = "CONTRACT_SENTRY_API_TOKEN",
        hide_env_values = true
    )]
    pub api_token: Option<String>,

    /// Request timeout in seconds for submission, cancel and result calls
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum concurrent result fetches
    #[arg(long, global = true, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .contract-sentry.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .contract-sentry.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Submit a contract and follow the audit until it finishes
    Analyze(AnalyzeArgs),

    /// Show the backend status of an audit
    Status {
        /// Audit identifier
        audit_id: AuditId,
    },

    /// Fetch and render results for one or more audits
    Results {
        /// Audit identifiers
        #[arg(required = true)]
        audit_ids: Vec<AuditId>,

        /// Output format (markdown, json)
        #[arg(long, value_name = "FORMAT")]
        format: Option<OutputFormat>,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Ask the backend to cancel an audit
    Cancel {
        /// Audit identifier
        audit_id: AuditId,
    },

    /// List previous reports
    Reports {
        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: usize,

        /// Reports per page
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Only reports with critical findings
        #[arg(long)]
        critical_only: bool,

        /// Only reports with high findings
        #[arg(long)]
        high_only: bool,

        /// Only reports with medium or low findings
        #[arg(long)]
        medium_low_only: bool,

        /// Print one report from this page in full
        #[arg(long, value_name = "REPORT_ID")]
        show: Option<ResultId>,
    },

    /// Download reports as CSV or PDF
    Export {
        /// Export format
        #[arg(long, value_name = "FORMAT")]
        format: ExportFormat,

        /// Destination file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Offset into the report list
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum reports to export
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Aggregate statistics over recent reports
    Stats {
        /// Number of recent reports to include
        #[arg(long, default_value = "100")]
        limit: usize,

        /// Number of entries in the top-N tables
        #[arg(long, default_value = "5")]
        top: usize,
    },
}

/// Arguments of `analyze`.
#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Deployed contract address (0x followed by 40 hex characters)
    ///
    /// Falls back to the address remembered in the config file.
    #[arg(long, value_name = "ADDRESS", conflicts_with = "source")]
    pub address: Option<String>,

    /// Contract source file to upload instead of an address
    #[arg(long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// Target network
    #[arg(short, long, value_name = "NETWORK")]
    pub network: Option<Network>,

    /// Analyzers to run (comma-separated)
    ///
    /// Example: --analyzers static-analysis,gas-analysis
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub analyzers: Option<Vec<Analyzer>>,

    /// Scheduling priority for the audit
    #[arg(long, default_value = "normal", value_name = "PRIORITY")]
    pub priority: Priority,

    /// Milliseconds between status checks
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Output format (markdown, json)
    ///
    /// Defaults to `report.format` from the config file.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Fail if findings at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Save the address, network and analyzers to the config file
    #[arg(long)]
    pub remember: bool,
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

impl OutputFormat {
    /// Pick the CLI choice, else the configured name, else Markdown.
    pub fn resolve(cli: Option<OutputFormat>, configured: &str) -> Self {
        cli.unwrap_or_else(|| match configured.trim().to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Markdown,
        })
    }
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Severity {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Info => Severity::Info,
            FailOnLevel::Low => Severity::Low,
            FailOnLevel::Medium => Severity::Medium,
            FailOnLevel::High => Severity::High,
            FailOnLevel::Critical => Severity::Critical,
        }
    }
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

        if self.command.is_none() {
            return Err("No command given. Run with --help for usage.".to_string());
        }

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        match &self.command {
            Some(Command::Analyze(analyze)) => {
                if analyze.interval_ms == Some(0) {
                    return Err("Polling interval must be at least 1 ms".to_string());
                }
                if let Some(ref analyzers) = analyze.analyzers {
                    if analyzers.is_empty() {
                        return Err("Select at least one analyzer".to_string());
                    }
                }
                if let Some(ref source) = analyze.source {
                    if !source.is_file() {
                        return Err(format!("Source file does not exist: {}", source.display()));
                    }
                }
            }
            Some(Command::Reports { page, limit, .. }) => {
                if *page == 0 {
                    return Err("Page numbers start at 1".to_string());
                }
                if *limit == 0 {
                    return Err("Limit must be at least 1".to_string());
                }
            }
            Some(Command::Stats { limit, .. }) | Some(Command::Export { limit, .. }) => {
                if *limit == 0 {
                    return Err("Limit must be at least 1".to_string());
                }
            }
            _ => {}
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
