//! # Endpoint Discovery
//!
//! Bootstraps a list of remote query endpoints from a public index. The
//! default index is the Wikidata query service, asked for every value of
//! the "SPARQL endpoint URL" property (P5305).
//!
//! Discovery never fails: an unreachable or erroring index gives an empty
//! set, which callers read as "no endpoints known this run".

use super::executor::FederationExecutor;
use std::collections::BTreeSet;
use std::time::Duration;

/// Default bootstrap endpoint.
pub const WIKIDATA_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// Wikidata property whose values are SPARQL endpoint URLs.
pub const ENDPOINT_PROPERTY: &str = "P5305";

/// Timeout for the bootstrap query.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result variable holding the endpoint URL.
const ENDPOINT_VAR: &str = "endpoint";

/// Internal vocabulary, never a real endpoint.
const EXCLUDED_PREFIXES: &[&str] = &["http://wikiba.se/ontology#"];

/// Skolemized blank nodes.
const EXCLUDED_FRAGMENTS: &[&str] = &["/.well-known/genid/"];

/// Placeholder hosts.
const PLACEHOLDER_HOSTS: &[&str] = &["example.org", "example.com", "example.net"];

/// The bootstrap SELECT for a given endpoint property.
#[must_use]
pub fn discovery_query(property: &str) -> String {
    format!(
        "PREFIX wdt: <http://www.wikidata.org/prop/direct/>\n\
         SELECT (SAMPLE(?item) AS ?representative) ?{var}\n\
         WHERE {{\n\
         \x20 ?item wdt:{property} ?{var} .\n\
         \x20 FILTER(STRSTARTS(STR(?{var}), \"http\"))\n\
         }}\n\
         GROUP BY ?{var}\n\
         ORDER BY ?{var}",
        var = ENDPOINT_VAR,
        property = property,
    )
}

/// True if `value` looks like a usable http(s) endpoint.
#[must_use]
pub fn is_endpoint_candidate(value: &str) -> bool {
    let value = value.trim();
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return false;
    }
    if EXCLUDED_PREFIXES.iter().any(|p| value.starts_with(p))
        || EXCLUDED_FRAGMENTS.iter().any(|f| value.contains(f))
    {
        return false;
    }
    match reqwest::Url::parse(value) {
        Ok(url) => match url.host_str() {
            Some(host) => !PLACEHOLDER_HOSTS
                .iter()
                .any(|p| host == *p || host.ends_with(&format!(".{}", p))),
            None => false,
        },
        Err(_) => false,
    }
}

/// Keep only endpoint candidates, ordered and deduplicated.
pub fn filter_endpoints<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .filter(|v| is_endpoint_candidate(v.as_ref()))
        .map(|v| v.as_ref().trim().to_string())
        .collect()
}

/// Where and how to look for endpoints.
#[derive(Debug, Clone)]
pub struct EndpointDiscovery {
    bootstrap_endpoint: String,
    property: String,
    timeout: Duration,
}

impl Default for EndpointDiscovery {
    fn default() -> Self {
        Self::new(WIKIDATA_ENDPOINT)
    }
}

impl EndpointDiscovery {
    #[must_use]
    pub fn new(bootstrap_endpoint: impl Into<String>) -> Self {
        Self {
            bootstrap_endpoint: bootstrap_endpoint.into(),
            property: ENDPOINT_PROPERTY.to_string(),
            timeout: DISCOVERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn bootstrap_endpoint(&self) -> &str {
        &self.bootstrap_endpoint
    }

    /// Ask the bootstrap endpoint for candidates.
    pub async fn discover(&self, executor: &FederationExecutor) -> BTreeSet<String> {
        let query = discovery_query(&self.property);
        let outcome = executor
            .execute_select(&self.bootstrap_endpoint, &query, self.timeout)
            .await;
        if let Some(error) = &outcome.error {
            tracing::warn!(
                endpoint = %self.bootstrap_endpoint,
                error = %error,
                "Endpoint discovery failed; continuing with no endpoints"
            );
            return BTreeSet::new();
        }
        let endpoints = filter_endpoints(outcome.rows.iter().filter_map(|row| row.get(ENDPOINT_VAR)));
        tracing::info!(
            candidates = outcome.rows.len(),
            endpoints = endpoints.len(),
            "Discovered endpoints"
        );
        endpoints
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_placeholders_and_internal_vocabulary() {
        let found = filter_endpoints([
            "https://query.wikidata.org/sparql",
            "http://wikiba.se/ontology#Item",
            "https://www.wikidata.org/.well-known/genid/abc",
            "https://example.org/sparql",
            "http://sub.example.com/sparql",
            "ftp://data.example.net/sparql",
            "urn:isbn:123",
            "  https://dbpedia.org/sparql ",
            "https://dbpedia.org/sparql",
        ]);
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec![
                "https://dbpedia.org/sparql".to_string(),
                "https://query.wikidata.org/sparql".to_string(),
            ]
        );
    }

    #[test]
    fn query_names_the_property() {
        let query = discovery_query(ENDPOINT_PROPERTY);
        assert!(query.contains("wdt:P5305 ?endpoint"));
        assert!(query.contains("GROUP BY ?endpoint"));
    }
}
