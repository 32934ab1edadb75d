//! # Catty - Semantic Knowledge Server
//!
//! The main binary for the registry-driven Catty knowledge service.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for queries, updates and IRI tooling
//! - Federated SELECTs against remote endpoints
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      apps/catty (THE BINARY)                    │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐     │
//! │  │   CLI       │    │   HTTP API  │    │   Federation     │     │
//! │  │  (clap)     │    │   (axum)    │    │   (reqwest)      │     │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘     │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                    ┌───────────────┐                            │
//! │                    │  catty-core   │                            │
//! │                    │ (THE LOGIC)   │                            │
//! │                    └───────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! catty server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! catty status
//! catty query -q 'SELECT ?s WHERE { ?s ?p ?o } LIMIT 5' -f csv
//! catty validate -f ontology/core.jsonld
//! catty federate -e https://query.wikidata.org/sparql -q @select.rq
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // CATTY_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("CATTY_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "catty=info,catty_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = catty::cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = catty::cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Catty startup banner.
fn print_banner() {
    println!(
        r#"
   ██████╗ █████╗ ████████╗████████╗██╗   ██╗
  ██╔════╝██╔══██╗╚══██╔══╝╚══██╔══╝╚██╗ ██╔╝
  ██║     ███████║   ██║      ██║    ╚████╔╝
  ██║     ██╔══██║   ██║      ██║     ╚██╔╝
  ╚██████╗██║  ██║   ██║      ██║      ██║
   ╚═════╝╚═╝  ╚═╝   ╚═╝      ╚═╝      ╚═╝

  Semantic Knowledge Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
