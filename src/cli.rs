//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Caller identity used by `query` when none is given.
pub const DEFAULT_CALLER: &str = concat!("apimerge/", env!("CARGO_PKG_VERSION"));

/// ApiMerge - ask many HTTP sources at once, merge what comes back
///
/// Manage the registry of named sources and run aggregations against
/// them, either once from the command line or behind an HTTP endpoint.
///
/// Examples:
///   apimerge add seraph "https://api.example.com/v3/tags?key=abc"
///   apimerge remap seraph id=uuid
///   apimerge query id=069a79f4 name=Notch
///   apimerge serve --bind 127.0.0.1:3000
///   apimerge init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .apimerge.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path of the JSON source store
    #[arg(short, long, global = true, value_name = "FILE", env = "APIMERGE_STORE")]
    pub store: Option<PathBuf>,

    /// Per-source request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Register a source from its full URL
    ///
    /// The URL's query string is kept as static parameters.
    Add {
        /// Unique source name (spaces become '-')
        name: String,
        /// Absolute http:// or https:// URL
        url: String,
    },

    /// List registered sources
    List,

    /// Print one source's configuration as JSON
    Show { name: String },

    /// Remove a source
    Remove { name: String },

    /// Set how inbound parameters are renamed for a source
    ///
    /// With no pairs the remapping is cleared and every inbound parameter
    /// is forwarded unchanged.
    Remap {
        name: String,
        /// INBOUND=OUTGOING pairs
        #[arg(value_parser = parse_key_value, value_name = "IN=OUT")]
        pairs: Vec<(String, String)>,
    },

    /// Run one aggregation and print the composite
    Query {
        /// KEY=VALUE inbound parameters
        #[arg(value_parser = parse_key_value, value_name = "KEY=VALUE")]
        params: Vec<(String, String)>,

        /// Caller identity forwarded to every source
        #[arg(long, default_value = DEFAULT_CALLER)]
        caller: String,
    },

    /// Serve the aggregation endpoint
    Serve {
        /// Socket address to listen on
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Generate a default .apimerge.toml configuration file
    InitConfig,
}

/// Parse a `KEY=VALUE` argument.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Command::Serve {
            bind: Some(ref bind),
        } = self.command
        {
            if bind.parse::<std::net::SocketAddr>().is_err() {
                return Err(format!("Invalid bind address: {}", bind));
            }
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
