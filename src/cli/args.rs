use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "signalbox", version, about = "Semantic-routing supervisor for tool executors")]
pub struct Cli {
    /// Path to custom config file (default: ./signalbox.toml)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit a goal and print the routing decision
    Route {
        /// Natural-language goal
        prompt: String,

        /// Resolved parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
    },

    /// Expand a ready goal into its final tool-call sequence
    Execute {
        /// Natural-language goal
        prompt: String,

        /// Resolved parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
    },

    /// Intercept a single tool call through overrides and the firewall
    Call {
        /// Tool name
        tool: String,

        /// Call parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
    },

    /// Import a workflow definition file
    Import {
        /// Workflow file (.yaml, .yml, or .json)
        path: PathBuf,

        /// Replace an existing workflow with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Validate every workflow document under a directory
    Validate {
        /// Directory to scan recursively
        path: PathBuf,
    },

    /// Print registry, store, and matcher health
    Status,
}
