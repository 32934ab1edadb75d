//! # Application Configuration
//!
//! Optional TOML file with three sections; every field has a default, and
//! a missing file means all defaults.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [repository]
//! root = "."
//! registry = ".catty/iri-config.yaml"
//!
//! [federation]
//! bootstrap_endpoint = "https://query.wikidata.org/sparql"
//! min_delay_ms = 2000
//! timeout_secs = 30
//! max_concurrency = 4
//! user_agent = "CattySelectQueryFederation/1.0"
//! ```
//!
//! Security settings (API key, inbound rate limit, CORS) and the log format
//! come from `CATTY_*` environment variables read by the HTTP layer.

use crate::federation::discovery::WIKIDATA_ENDPOINT;
use crate::federation::executor::{DEFAULT_MAX_CONCURRENCY, DEFAULT_USER_AGENT};
use catty_core::CattyError;
use catty_core::primitives::REGISTRY_RELATIVE_PATH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the repository when `--config` is not given.
pub const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".catty/catty.toml";

// =============================================================================
// SECTIONS
// =============================================================================

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[repository]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Repository root; discovered upward from the working directory if unset.
    pub root: Option<PathBuf>,
    /// Registry file, relative to the root unless absolute.
    pub registry: Option<PathBuf>,
}

impl RepositoryConfig {
    /// Registry location for a resolved root.
    #[must_use]
    pub fn registry_path(&self, root: &Path) -> PathBuf {
        match &self.registry {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(REGISTRY_RELATIVE_PATH),
        }
    }
}

/// `[federation]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub bootstrap_endpoint: String,
    pub min_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    pub user_agent: String,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            bootstrap_endpoint: WIKIDATA_ENDPOINT.to_string(),
            min_delay_ms: 2000,
            timeout_secs: 30,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FederationConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub repository: RepositoryConfig,
    pub federation: FederationConfig,
}

impl AppConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, CattyError> {
        toml::from_str(text).map_err(|e| CattyError::Config(format!("Invalid config TOML: {}", e)))
    }

    /// Read a config file. An explicitly named file must exist.
    pub fn load(path: &Path) -> Result<Self, CattyError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CattyError::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded application config");
        Ok(config)
    }

    /// Load `explicit` if given, else the repository default if present,
    /// else defaults.
    pub fn load_or_default(explicit: Option<&Path>, repo_hint: Option<&Path>) -> Result<Self, CattyError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(root) = repo_hint {
            let candidate = root.join(DEFAULT_CONFIG_RELATIVE_PATH);
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }
}

// =============================================================================
// REPOSITORY ROOT
// =============================================================================

/// Search `start` and its ancestors for the registry file.
#[must_use]
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(REGISTRY_RELATIVE_PATH).is_file())
        .map(Path::to_path_buf)
}

/// Pick the repository root: CLI flag, then config, then upward search.
pub fn resolve_repo_root(cli_repo: Option<&Path>, config: &RepositoryConfig) -> Result<PathBuf, CattyError> {
    if let Some(root) = cli_repo.or(config.root.as_deref()) {
        return Ok(root.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| CattyError::Io(format!("Cannot read working directory: {}", e)))?;
    find_repo_root(&cwd).ok_or_else(|| {
        CattyError::Config(format!(
            "No {} found in {} or any parent directory; pass --repo",
            REGISTRY_RELATIVE_PATH,
            cwd.display()
        ))
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.federation.min_delay_ms, 2000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml_str(
            "[server]\nport = 9000\n\n[federation]\ntimeout_secs = 5\n",
        )
        .unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.federation.timeout(), Duration::from_secs(5));
        assert_eq!(config.federation.bootstrap_endpoint, WIKIDATA_ENDPOINT);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[server\nport = "),
            Err(CattyError::Config(_))
        ));
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load_or_default(Some(&missing), None).is_err());
        assert_eq!(
            AppConfig::load_or_default(None, Some(dir.path())).unwrap(),
            AppConfig::default()
        );
    }

    #[test]
    fn registry_path_resolution() {
        let root = Path::new("/repo");
        let mut repo = RepositoryConfig::default();
        assert_eq!(repo.registry_path(root), root.join(".catty/iri-config.yaml"));
        repo.registry = Some(PathBuf::from("conf/iri.yaml"));
        assert_eq!(repo.registry_path(root), root.join("conf/iri.yaml"));
    }

    #[test]
    fn repo_root_is_found_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".catty")).unwrap();
        std::fs::write(dir.path().join(REGISTRY_RELATIVE_PATH), "ontologies: {}\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_repo_root(&nested).as_deref(), Some(dir.path()));
    }
}
