//! # Federation Executor
//!
//! Runs SELECT queries against remote endpoints. Every call yields a
//! `FederatedQueryOutcome`; nothing here returns an error, so a run over
//! many endpoints keeps going whatever each endpoint does.
//!
//! ## Classification
//!
//! | condition | timed_out | error |
//! |---|---|---|
//! | 2xx with a SPARQL JSON body | false | none |
//! | transport timeout, HTTP 408 or 504 | true | set |
//! | HTTP 429 | false | "rate limited" |
//! | anything else | false | set |

use super::limiter::EndpointRateLimiter;
use crate::config::FederationConfig;
use catty_core::parse_json_results;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Sent with every federated request.
pub const DEFAULT_USER_AGENT: &str = "CattySelectQueryFederation/1.0";

/// Accept header for SELECT results.
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of endpoints queried at once in a run.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of one federated call.
///
/// `timed_out` implies `rows` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedQueryOutcome {
    pub endpoint: String,
    pub query: String,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub error: Option<String>,
    pub variables: Vec<String>,
    /// Rows as variable → lexical value (IRIs without brackets).
    pub rows: Vec<BTreeMap<String, String>>,
}

impl FederatedQueryOutcome {
    fn failed(endpoint: &str, query: &str, elapsed: Duration, timed_out: bool, error: String) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            query: query.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            timed_out,
            error: Some(error),
            variables: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// True for a call that returned rows without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.error.is_none()
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Rate-limited SELECT client shared by federation runs and discovery.
#[derive(Debug)]
pub struct FederationExecutor {
    http: reqwest::Client,
    limiter: EndpointRateLimiter,
    user_agent: String,
    max_concurrency: usize,
}

impl Default for FederationExecutor {
    fn default() -> Self {
        Self::new(EndpointRateLimiter::default())
    }
}

impl FederationExecutor {
    #[must_use]
    pub fn new(limiter: EndpointRateLimiter) -> Self {
        Self {
            http: reqwest::Client::new(),
            limiter,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Build from the `[federation]` section of the application config.
    #[must_use]
    pub fn from_config(config: &FederationConfig) -> Self {
        Self::new(EndpointRateLimiter::new(Duration::from_millis(config.min_delay_ms)))
            .with_user_agent(config.user_agent.clone())
            .with_max_concurrency(config.max_concurrency)
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn limiter(&self) -> &EndpointRateLimiter {
        &self.limiter
    }

    /// Run one SELECT against `endpoint` under `timeout`.
    ///
    /// The rate-limit wait happens first and is not counted in `elapsed_ms`.
    pub async fn execute_select(
        &self,
        endpoint: &str,
        query: &str,
        timeout: Duration,
    ) -> FederatedQueryOutcome {
        let url = match reqwest::Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return FederatedQueryOutcome::failed(
                    endpoint,
                    query,
                    Duration::ZERO,
                    false,
                    format!("Unsupported endpoint scheme '{}'", url.scheme()),
                );
            }
            Err(e) => {
                return FederatedQueryOutcome::failed(
                    endpoint,
                    query,
                    Duration::ZERO,
                    false,
                    format!("Invalid endpoint URL: {}", e),
                );
            }
        };

        self.limiter.acquire(endpoint).await;
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.fetch(url, query, timeout)).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Err(_) => FederatedQueryOutcome::failed(
                endpoint,
                query,
                elapsed,
                true,
                format!("Query timed out after {} s", timeout.as_secs_f64()),
            ),
            Ok(Err(failure)) => FederatedQueryOutcome::failed(
                endpoint,
                query,
                elapsed,
                failure.timed_out,
                failure.message,
            ),
            Ok(Ok(bindings)) => FederatedQueryOutcome {
                endpoint: endpoint.to_string(),
                query: query.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
                timed_out: false,
                error: None,
                variables: bindings.variables,
                rows: bindings
                    .rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|(var, term)| (var, term.value().to_string()))
                            .collect()
                    })
                    .collect(),
            },
        };

        match &outcome.error {
            None => tracing::info!(
                endpoint,
                rows = outcome.rows.len(),
                elapsed_ms = outcome.elapsed_ms,
                "Federated query completed"
            ),
            Some(error) => tracing::warn!(
                endpoint,
                timed_out = outcome.timed_out,
                error = %error,
                "Federated query failed"
            ),
        }
        outcome
    }

    async fn fetch(
        &self,
        mut url: reqwest::Url,
        query: &str,
        timeout: Duration,
    ) -> Result<catty_core::Bindings, FetchFailure> {
        url.query_pairs_mut().append_pair("query", query);
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .timeout(timeout)
            .send()
            .await
            .map_err(FetchFailure::transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT || status == reqwest::StatusCode::GATEWAY_TIMEOUT {
            return Err(FetchFailure {
                timed_out: true,
                message: format!("Endpoint timed out (HTTP {})", status.as_u16()),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchFailure::other("Endpoint rate limited the request (HTTP 429)".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(FetchFailure::other(format!("HTTP {}: {}", status.as_u16(), snippet)));
        }

        let body = response.text().await.map_err(FetchFailure::transport)?;
        parse_json_results(&body).map_err(|e| FetchFailure::other(e.to_string()))
    }

    /// Query every endpoint, at most `max_concurrency` at a time.
    ///
    /// Returns one outcome per endpoint, in input order.
    pub async fn run(
        self: &Arc<Self>,
        endpoints: &[String],
        query: &str,
        timeout: Duration,
    ) -> Vec<FederatedQueryOutcome> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (index, endpoint) in endpoints.iter().enumerate() {
            let executor = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let endpoint = endpoint.clone();
            let query = query.to_string();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, executor.execute_select(&endpoint, &query, timeout).await)
            });
        }

        let mut outcomes: Vec<Option<FederatedQueryOutcome>> = vec![None; endpoints.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "Federation task failed"),
            }
        }

        let succeeded = outcomes.iter().flatten().filter(|o| o.is_success()).count();
        tracing::info!(endpoints = endpoints.len(), succeeded, "Federation run finished");

        outcomes
            .into_iter()
            .zip(endpoints)
            .map(|(outcome, endpoint)| {
                outcome.unwrap_or_else(|| {
                    FederatedQueryOutcome::failed(
                        endpoint,
                        query,
                        Duration::ZERO,
                        false,
                        "Federation task did not complete".to_string(),
                    )
                })
            })
            .collect()
    }
}

struct FetchFailure {
    timed_out: bool,
    message: String,
}

impl FetchFailure {
    fn other(message: String) -> Self {
        Self {
            timed_out: false,
            message,
        }
    }

    fn transport(e: reqwest::Error) -> Self {
        Self {
            timed_out: e.is_timeout(),
            message: format!("Request failed: {}", e),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_endpoint_is_an_outcome() {
        let executor = FederationExecutor::default();
        let outcome = executor
            .execute_select("not a url", "SELECT * WHERE { ?s ?p ?o }", Duration::from_secs(1))
            .await;
        assert!(!outcome.timed_out);
        assert!(outcome.error.unwrap().starts_with("Invalid endpoint URL"));
        assert_eq!(executor.limiter().tracked_endpoints(), 0);
    }

    #[tokio::test]
    async fn non_http_scheme_is_refused() {
        let executor = FederationExecutor::default();
        let outcome = executor
            .execute_select("ftp://example.net/sparql", "ASK {}", Duration::from_secs(1))
            .await;
        assert!(outcome.error.unwrap().contains("ftp"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_outcome() {
        let executor = FederationExecutor::new(EndpointRateLimiter::new(Duration::ZERO));
        let outcome = executor
            .execute_select("http://127.0.0.1:9/sparql", "ASK {}", Duration::from_secs(2))
            .await;
        assert!(outcome.error.is_some());
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let executor = FederationExecutor::default().with_max_concurrency(0);
        assert_eq!(executor.max_concurrency, 1);
    }
}
