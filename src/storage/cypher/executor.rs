//! Transport seam for Cypher statements.
//!
//! [`CypherExecutor`] is the narrow interface between generated query text
//! and whatever actually runs it: an HTTP endpoint in production, a
//! recording fake in tests. The executor receives complete statements (all
//! values already rendered by [`super::params`]) and returns rows as JSON
//! objects keyed by the `AS` aliases in the `RETURN` clause.

use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// One result row, keyed by return alias.
pub type CypherRow = serde_json::Map<String, serde_json::Value>;

/// Executes complete Cypher statements.
pub trait CypherExecutor: Send + Sync {
    /// Executes one statement and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the transport is unreachable and
    /// [`Error::Backend`] for execution failures.
    fn execute(&self, statement: &str) -> Result<Vec<CypherRow>>;

    /// Cheap liveness probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe statement fails.
    fn ping(&self) -> Result<()> {
        self.execute("RETURN 1 AS ok").map(|_| ())
    }
}

/// Wire response shape of the HTTP Cypher endpoint.
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    rows: Vec<CypherRow>,
    #[serde(default)]
    error: Option<String>,
}

/// Executes statements against an HTTP endpoint.
///
/// The endpoint accepts `POST {"statement": "<cypher>"}` and answers
/// `{"rows": [...]}` on success or `{"error": "..."}` on failure. Request
/// timeouts are bounded so a hung server turns into an unhealthy report
/// instead of a stuck caller; a timed-out call is not retried.
pub struct HttpCypherExecutor {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpCypherExecutor {
    /// Builds an executor for the given endpoint with a bounded timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CypherExecutor for HttpCypherExecutor {
    fn execute(&self, statement: &str) -> Result<Vec<CypherRow>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "statement": statement }))
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::Connection(format!("cypher endpoint unreachable: {e}"))
                } else {
                    Error::backend("cypher_execute", e)
                }
            })?;

        let status = response.status();
        let body: WireResponse = response
            .json()
            .map_err(|e| Error::backend("cypher_execute", format!("malformed response: {e}")))?;

        if let Some(error) = body.error {
            return Err(Error::backend("cypher_execute", error));
        }
        if !status.is_success() {
            return Err(Error::backend(
                "cypher_execute",
                format!("endpoint returned HTTP {status}"),
            ));
        }

        Ok(body.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal fake returning canned rows.
    struct FixedExecutor {
        rows: Mutex<Vec<Vec<CypherRow>>>,
    }

    impl CypherExecutor for FixedExecutor {
        fn execute(&self, _statement: &str) -> Result<Vec<CypherRow>> {
            let mut rows = self.rows.lock().unwrap();
            Ok(if rows.is_empty() { Vec::new() } else { rows.remove(0) })
        }
    }

    #[test]
    fn test_default_ping_uses_execute() {
        let executor = FixedExecutor {
            rows: Mutex::new(vec![Vec::new()]),
        };
        assert!(executor.ping().is_ok());
    }

    #[test]
    fn test_http_executor_construction() {
        let executor =
            HttpCypherExecutor::new("http://localhost:7474/query", Duration::from_secs(2)).unwrap();
        assert_eq!(executor.endpoint(), "http://localhost:7474/query");
    }
}
