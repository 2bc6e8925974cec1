//! Command-line interface definition for mcpgate
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the proxy, check URLs against the network
//! policy, and connect to a server once.

use clap::{Parser, Subcommand, ValueEnum};

use crate::manager::TransportKind;

/// mcpgate - MCP client runtime and SSRF-hardened proxy
#[derive(Parser, Debug, Clone)]
#[command(name = "mcpgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Additional host to allow (repeatable)
    #[arg(long, global = true)]
    pub allow_host: Vec<String>,

    /// Additional port to allow (repeatable)
    #[arg(long, global = true)]
    pub allow_port: Vec<u16>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Available commands for mcpgate
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the proxy and OAuth callback server
    Serve {
        /// Override the bind address from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Check a URL against the network policy
    Validate {
        /// URL to check
        url: String,
    },

    /// Connect to an MCP server once and print what it exposes
    Connect {
        /// MCP endpoint URL
        url: String,

        /// Server identifier
        #[arg(long, default_value = "default")]
        uti: String,

        /// Transport to use
        #[arg(short, long, default_value = "streamable_http", value_parser = parse_transport)]
        transport: TransportKind,

        /// Provider name for the OAuth fallback table
        #[arg(short, long)]
        provider: Option<String>,

        /// Seconds to wait for the authorization callback; 0 only prints the URL
        #[arg(long, default_value_t = 300)]
        wait_secs: u64,
    },
}

fn parse_transport(raw: &str) -> std::result::Result<TransportKind, String> {
    raw.parse::<TransportKind>().map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
