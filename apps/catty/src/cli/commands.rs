//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, AppState};
use crate::config::{AppConfig, find_repo_root, resolve_repo_root};
use crate::federation::{EndpointDiscovery, FederatedQueryOutcome, FederationExecutor};
use catty_core::{
    CattyError, GraphStore, IriRebinder, QueryResult, QueryService, RdfFormat, RebindTarget,
    Registry, ResultFormat, iri::validate, results::serialize, store::CHECKSUM_ALGORITHM,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Largest file read for a query, update or document (16 MB).
const MAX_INPUT_FILE_SIZE: u64 = 16 * 1024 * 1024;

// =============================================================================
// CONTEXT
// =============================================================================

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    cli_repo: Option<PathBuf>,
    pub config: AppConfig,
    pub json_mode: bool,
}

impl CommandContext {
    /// Load the application config. The repository itself is resolved only
    /// by commands that need it.
    pub fn new(
        cli_repo: Option<PathBuf>,
        config_path: Option<PathBuf>,
        json_mode: bool,
    ) -> Result<Self, CattyError> {
        let repo_hint = cli_repo.clone().or_else(|| {
            std::env::current_dir()
                .ok()
                .and_then(|cwd| find_repo_root(&cwd))
        });
        let config = AppConfig::load_or_default(config_path.as_deref(), repo_hint.as_deref())?;
        Ok(Self {
            cli_repo,
            config,
            json_mode,
        })
    }

    pub fn repo_root(&self) -> Result<PathBuf, CattyError> {
        resolve_repo_root(self.cli_repo.as_deref(), &self.config.repository)
    }

    pub fn load_registry(&self) -> Result<(PathBuf, Registry), CattyError> {
        let root = self.repo_root()?;
        let registry = Registry::load(&self.config.repository.registry_path(&root))?;
        Ok((root, registry))
    }

    /// Registry plus a fully loaded store.
    pub fn load_store(&self) -> Result<(PathBuf, Registry, GraphStore), CattyError> {
        let (root, registry) = self.load_registry()?;
        let store = GraphStore::init(&root, &registry)?;
        Ok((root, registry, store))
    }

    pub fn federation_executor(&self) -> FederationExecutor {
        FederationExecutor::from_config(&self.config.federation)
    }

    pub fn discovery(&self) -> EndpointDiscovery {
        EndpointDiscovery::new(self.config.federation.bootstrap_endpoint.clone())
    }
}

// =============================================================================
// INPUT HELPERS
// =============================================================================

/// Read a file after checking that it is a regular file of bounded size.
fn read_input_file(path: &Path) -> Result<String, CattyError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CattyError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(CattyError::Io(format!(
            "'{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(CattyError::Io(format!(
            "'{}' is {} bytes; the limit is {} bytes",
            path.display(),
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| CattyError::Io(format!("Cannot read '{}': {}", path.display(), e)))
}

/// Inline text, or the contents of a file for `@path`.
pub fn read_text_arg(arg: &str) -> Result<String, CattyError> {
    match arg.strip_prefix('@') {
        Some(path) => read_input_file(Path::new(path)),
        None => Ok(arg.to_string()),
    }
}

/// Parse repeated `name=value` arguments.
pub fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>, CattyError> {
    raw.iter()
        .map(|item| match item.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(CattyError::Config(format!(
                "Invalid parameter '{}': expected name=value",
                item
            ))),
        })
        .collect()
}

fn write_output(path: Option<&Path>, content: &str) -> Result<(), CattyError> {
    match path {
        Some(path) => std::fs::write(path, content)
            .map_err(|e| CattyError::Io(format!("Cannot write '{}': {}", path.display(), e))),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    ctx: &CommandContext,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), CattyError> {
    let (root, registry, store) = ctx.load_store()?;
    let mut server = ctx.config.server.clone();
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }

    println!("Catty Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Repository: {}", root.display());
    println!("  Ontologies: {}", registry.len());
    println!("  Triples:    {}", store.statistics().triple_count);
    println!("  Address:    {}", server.bind_addr());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = AppState::new(registry, store)
        .with_federation(
            ctx.federation_executor(),
            ctx.discovery(),
            ctx.config.federation.timeout(),
        )
        .with_repo_root(root);
    api::run_server(&server.bind_addr(), state).await
}

// =============================================================================
// STATUS / HASH
// =============================================================================

/// Show registry and store statistics.
pub fn cmd_status(ctx: &CommandContext) -> Result<(), CattyError> {
    let (root, registry, store) = ctx.load_store()?;
    let stats = store.statistics();

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "repository": root.to_string_lossy(),
            "ontologies": registry.len(),
            "statistics": stats,
        }));
        return Ok(());
    }

    println!("Catty Store Status");
    println!("==================");
    println!("Repository: {}", root.display());
    println!();
    println!("Ontologies:          {}", registry.len());
    println!("Triples:             {}", stats.triple_count);
    println!("Named graphs:        {}", stats.graph_count);
    println!("Distinct subjects:   {}", stats.distinct_subjects);
    println!("Distinct predicates: {}", stats.distinct_predicates);
    println!();
    for entry in registry.entries() {
        let count = stats.graphs.get(&entry.dev_iri).copied().unwrap_or(0);
        println!("  {:<24} {:>8}  <{}>", entry.key, count, entry.dev_iri);
    }
    Ok(())
}

/// Print the dataset checksum.
pub fn cmd_hash(ctx: &CommandContext) -> Result<(), CattyError> {
    let (_, _, store) = ctx.load_store()?;
    let checksum = store.checksum();
    if ctx.json_mode {
        print_json(&serde_json::json!({
            "algorithm": CHECKSUM_ALGORITHM,
            "checksum": checksum,
        }));
    } else {
        println!("{} ({})", checksum, CHECKSUM_ALGORITHM);
    }
    Ok(())
}

// =============================================================================
// QUERY / UPDATE
// =============================================================================

/// Run a query and print the serialized result.
pub fn cmd_query(
    ctx: &CommandContext,
    query: &str,
    format: Option<&str>,
    params: &[String],
) -> Result<(), CattyError> {
    let text = read_text_arg(query)?;
    let params = parse_params(params)?;
    let (_, _, store) = ctx.load_store()?;
    let service = QueryService::new(Arc::new(store));
    let result = service.execute_query(&text, &params)?;

    let output = match &result {
        QueryResult::Bindings(_) => {
            let format = match format {
                Some(token) => ResultFormat::from_token(token).ok_or_else(|| {
                    CattyError::Config(format!("Unknown result format '{}'", token))
                })?,
                None if ctx.json_mode => ResultFormat::Json,
                None => ResultFormat::Tsv,
            };
            serialize(&result, format)?
        }
        QueryResult::Graph(triples) => RdfFormat::from_token(format.unwrap_or_default()).serialize(triples)?,
    };
    write_output(None, &output)
}

/// Apply an update; optionally write the resulting union graph.
pub fn cmd_update(
    ctx: &CommandContext,
    update: &str,
    output: Option<&Path>,
    format: &str,
) -> Result<(), CattyError> {
    let text = read_text_arg(update)?;
    let (_, _, store) = ctx.load_store()?;
    let service = QueryService::new(Arc::new(store));
    let summary = service.execute_update(&text)?;

    if let Some(path) = output {
        let triples = service.store().union_graph();
        write_output(Some(path), &RdfFormat::from_token(format).serialize(&triples)?)?;
    }

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "summary": summary,
            "checksum": service.store().checksum(),
        }));
    } else {
        println!(
            "Update applied: {} operation(s), {} inserted, {} deleted",
            summary.operations, summary.inserted, summary.deleted
        );
        if output.is_none() {
            println!("(store is in memory; pass --output to keep the result)");
        }
    }
    Ok(())
}

// =============================================================================
// VALIDATE / REBIND
// =============================================================================

/// Validate a JSON-LD document. A rejected document is an error exit.
pub fn cmd_validate(ctx: &CommandContext, file: &Path) -> Result<(), CattyError> {
    let (_, registry) = ctx.load_registry()?;
    let text = read_input_file(file)?;
    let report = validate(&text, &registry);

    if ctx.json_mode {
        print_json(&report);
    } else if report.ok {
        println!(
            "OK: {} (base {})",
            file.display(),
            report.base_iri.as_deref().unwrap_or("?")
        );
    } else {
        println!("REJECTED: {}", file.display());
        for error in &report.errors {
            println!("  - {}", error);
        }
    }

    if report.ok {
        Ok(())
    } else {
        Err(CattyError::Rejected(report))
    }
}

/// Rebind a document between environments.
pub fn cmd_rebind(
    ctx: &CommandContext,
    file: &Path,
    target: &str,
    output: Option<&Path>,
) -> Result<(), CattyError> {
    let target = RebindTarget::from_token(target).ok_or_else(|| {
        CattyError::Config(format!(
            "Unknown rebind target '{}': expected production or development",
            target
        ))
    })?;
    let (_, registry) = ctx.load_registry()?;
    let text = read_input_file(file)?;
    let rebinder = IriRebinder::new(&registry, target)?;
    let rebound = rebinder.rebind(&text);
    tracing::info!(file = %file.display(), target = ?target, "Rebound document");
    write_output(output, &rebound)
}

// =============================================================================
// FEDERATION
// =============================================================================

/// List discovered endpoints.
pub async fn cmd_discover(ctx: &CommandContext) -> Result<(), CattyError> {
    let executor = ctx.federation_executor();
    let discovery = ctx.discovery();
    let endpoints = discovery.discover(&executor).await;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "bootstrap_endpoint": discovery.bootstrap_endpoint(),
            "endpoints": endpoints,
        }));
        return Ok(());
    }
    if endpoints.is_empty() {
        println!("No endpoints discovered from {}", discovery.bootstrap_endpoint());
    }
    for endpoint in &endpoints {
        println!("{}", endpoint);
    }
    Ok(())
}

/// Run a SELECT against the given (or discovered) endpoints.
pub async fn cmd_federate(
    ctx: &CommandContext,
    endpoints: Vec<String>,
    query: &str,
    timeout: Option<u64>,
) -> Result<(), CattyError> {
    let text = read_text_arg(query)?;
    let executor = Arc::new(ctx.federation_executor());
    let endpoints = if endpoints.is_empty() {
        ctx.discovery().discover(&executor).await.into_iter().collect()
    } else {
        endpoints
    };
    let timeout = timeout
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| ctx.config.federation.timeout());

    let outcomes = executor.run(&endpoints, &text, timeout).await;
    if ctx.json_mode {
        print_json(&outcomes);
    } else {
        for outcome in &outcomes {
            print_outcome(outcome);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &FederatedQueryOutcome) {
    let status = if outcome.timed_out {
        "TIMEOUT".to_string()
    } else if let Some(error) = &outcome.error {
        format!("ERROR {}", error)
    } else {
        format!("{} row(s)", outcome.rows.len())
    };
    println!("{} [{} ms] {}", outcome.endpoint, outcome.elapsed_ms, status);
    for row in &outcome.rows {
        let cells: Vec<String> = outcome
            .variables
            .iter()
            .map(|v| row.get(v).cloned().unwrap_or_default())
            .collect();
        println!("  {}", cells.join("\t"));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_name_value_pairs() {
        let params = parse_params(&["?label=a=b".to_string(), "n= x".to_string()]).unwrap();
        assert_eq!(params["?label"], "a=b");
        assert_eq!(params["n"], " x");
        assert!(parse_params(&["novalue".to_string()]).is_err());
        assert!(parse_params(&["=v".to_string()]).is_err());
    }

    #[test]
    fn text_args_read_files_with_at_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.rq");
        std::fs::write(&path, "ASK {}").unwrap();
        assert_eq!(read_text_arg(&format!("@{}", path.display())).unwrap(), "ASK {}");
        assert_eq!(read_text_arg("ASK {}").unwrap(), "ASK {}");
        assert!(read_text_arg("@/definitely/not/here.rq").is_err());
    }
}
