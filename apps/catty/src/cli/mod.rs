//! # Catty CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show registry and store statistics
//! - `query` - Run a query against the loaded store
//! - `update` - Apply an update and optionally export the result
//! - `validate` - Run the IRI safety validator on a JSON-LD file
//! - `rebind` - Rewrite a document between development and production IRIs
//! - `discover` - List remote endpoints from the bootstrap index
//! - `federate` - Run a SELECT against remote endpoints
//! - `hash` - Print the dataset checksum

mod commands;

use clap::{Parser, Subcommand};
use catty_core::CattyError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Catty - registry-driven semantic knowledge service
///
/// Loads the ontologies named in `.catty/iri-config.yaml` into named graphs,
/// answers queries over them and federates SELECTs to remote endpoints.
#[derive(Parser, Debug)]
#[command(name = "catty")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Repository root (default: search upward for .catty/iri-config.yaml)
    #[arg(short = 'R', long, global = true)]
    pub repo: Option<PathBuf>,

    /// Application config file (TOML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show registry and store statistics
    Status,

    /// Run a query
    Query {
        /// Query text, or @path to read it from a file
        #[arg(short, long)]
        query: String,

        /// Result format (json, xml, csv, tsv) or graph format for CONSTRUCT/DESCRIBE
        #[arg(short, long)]
        format: Option<String>,

        /// Parameter binding name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Apply an update to the loaded store
    Update {
        /// Update text, or @path to read it from a file
        #[arg(short, long)]
        update: String,

        /// Write the resulting union graph here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Graph format for --output (turtle, ntriples, jsonld)
        #[arg(short, long, default_value = "turtle")]
        format: String,
    },

    /// Validate a JSON-LD document against the registry
    Validate {
        /// Document to check
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Rebind a document's IRIs
    Rebind {
        /// Document to rewrite
        #[arg(short, long)]
        file: PathBuf,

        /// production|development
        #[arg(short, long)]
        target: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Discover remote endpoints
    Discover,

    /// Run a SELECT against remote endpoints
    Federate {
        /// Endpoint URL (repeatable; default: discovered endpoints)
        #[arg(short, long = "endpoint")]
        endpoints: Vec<String>,

        /// Query text, or @path to read it from a file
        #[arg(short, long)]
        query: String,

        /// Per-endpoint timeout in seconds (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print the dataset checksum
    Hash,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CattyError> {
    let ctx = CommandContext::new(cli.repo.clone(), cli.config.clone(), cli.json_mode)?;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&ctx, host, port).await,
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Query {
            query,
            format,
            params,
        }) => cmd_query(&ctx, &query, format.as_deref(), &params),
        Some(Commands::Update {
            update,
            output,
            format,
        }) => cmd_update(&ctx, &update, output.as_deref(), &format),
        Some(Commands::Validate { file }) => cmd_validate(&ctx, &file),
        Some(Commands::Rebind {
            file,
            target,
            output,
        }) => cmd_rebind(&ctx, &file, &target, output.as_deref()),
        Some(Commands::Discover) => cmd_discover(&ctx).await,
        Some(Commands::Federate {
            endpoints,
            query,
            timeout,
        }) => cmd_federate(&ctx, endpoints, &query, timeout).await,
        Some(Commands::Hash) => cmd_hash(&ctx),
    }
}
