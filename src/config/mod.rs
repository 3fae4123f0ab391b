//! Configuration management.
//!
//! All configuration is an explicit struct passed at construction time.
//! Nothing in this crate reads process environment variables; the embedding
//! application decides where values come from and hands over a
//! [`MemoryGraphConfig`].

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default bounded timeout for health checks and Cypher HTTP requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Main configuration for memorygraph.
#[derive(Debug, Clone)]
pub struct MemoryGraphConfig {
    /// Which storage backend to construct.
    pub backend: BackendConfig,
    /// Tenancy behavior.
    pub tenancy: TenancyMode,
    /// Request timeout for network-backed operations and health checks.
    pub request_timeout: Duration,
}

impl MemoryGraphConfig {
    /// Creates a configuration with default values (in-memory `SQLite`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for an on-disk `SQLite` store.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sqlite {
                path: Some(path.into()),
            },
            ..Self::default()
        }
    }

    /// Configuration for a Cypher-speaking graph database endpoint.
    #[must_use]
    pub fn cypher(endpoint: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig::Cypher {
                endpoint: endpoint.into(),
            },
            ..Self::default()
        }
    }

    /// Sets the tenancy mode.
    #[must_use]
    pub fn with_tenancy(mut self, tenancy: TenancyMode) -> Self {
        self.tenancy = tenancy;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for MemoryGraphConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Sqlite { path: None },
            tenancy: TenancyMode::SingleTenant,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Which storage engine to construct, as a closed set.
///
/// Backend selection is decided exactly once, here; there is no runtime
/// probing of connection objects to guess which query dialect to speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Embedded `SQLite` store. `None` means in-memory.
    Sqlite {
        /// Database file path; `None` opens an in-memory database.
        path: Option<PathBuf>,
    },
    /// A Cypher-speaking graph database reached over HTTP.
    Cypher {
        /// Endpoint URL accepting Cypher statements.
        endpoint: String,
    },
}

impl BackendConfig {
    /// Returns the backend kind as a short name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::Cypher { .. } => "cypher",
        }
    }
}

/// How tenant fields are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenancyMode {
    /// Tenant fields are ignored on writes and reads.
    #[default]
    SingleTenant,
    /// Tenant fields are honored and filterable.
    MultiTenant,
}

impl TenancyMode {
    /// Parses a tenancy mode from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "single" | "single_tenant" => Some(Self::SingleTenant),
            "multi" | "multi_tenant" => Some(Self::MultiTenant),
            _ => None,
        }
    }
}

/// Configuration file structure (for TOML/JSON parsing by the embedder).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Backend kind: "sqlite" or "cypher".
    pub backend: Option<String>,
    /// SQLite database path.
    pub sqlite_path: Option<String>,
    /// Cypher endpoint URL.
    pub cypher_endpoint: Option<String>,
    /// Tenancy mode: "single" or "multi".
    pub tenancy: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Resolves the file form into a full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for an unknown backend kind, a
    /// Cypher backend without an endpoint, or an unknown tenancy mode.
    pub fn resolve(self) -> crate::Result<MemoryGraphConfig> {
        let backend = match self.backend.as_deref() {
            None | Some("sqlite") => BackendConfig::Sqlite {
                path: self.sqlite_path.map(PathBuf::from),
            },
            Some("cypher") => {
                let endpoint = self.cypher_endpoint.ok_or_else(|| {
                    crate::Error::Validation(
                        "cypher backend requires cypher_endpoint".to_string(),
                    )
                })?;
                BackendConfig::Cypher { endpoint }
            },
            Some(other) => {
                return Err(crate::Error::Validation(format!(
                    "unknown backend kind: {other} (valid: sqlite, cypher)"
                )));
            },
        };

        let tenancy = match self.tenancy.as_deref() {
            None => TenancyMode::default(),
            Some(s) => TenancyMode::parse(s).ok_or_else(|| {
                crate::Error::Validation(format!(
                    "unknown tenancy mode: {s} (valid: single, multi)"
                ))
            })?,
        };

        Ok(MemoryGraphConfig {
            backend,
            tenancy,
            request_timeout: self
                .request_timeout_secs
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_in_memory_sqlite() {
        let config = MemoryGraphConfig::default();
        assert_eq!(config.backend, BackendConfig::Sqlite { path: None });
        assert_eq!(config.tenancy, TenancyMode::SingleTenant);
    }

    #[test]
    fn test_builders() {
        let config = MemoryGraphConfig::sqlite("/tmp/mg.db").with_tenancy(TenancyMode::MultiTenant);
        assert_eq!(config.backend.kind(), "sqlite");
        assert_eq!(config.tenancy, TenancyMode::MultiTenant);

        let config = MemoryGraphConfig::cypher("http://localhost:7474/query");
        assert_eq!(config.backend.kind(), "cypher");
    }

    #[test]
    fn test_config_file_resolution() {
        let file = ConfigFile {
            backend: Some("cypher".to_string()),
            cypher_endpoint: Some("http://graph:7474/query".to_string()),
            tenancy: Some("multi".to_string()),
            ..ConfigFile::default()
        };
        let config = file.resolve().unwrap();
        assert_eq!(config.backend.kind(), "cypher");
        assert_eq!(config.tenancy, TenancyMode::MultiTenant);
    }

    #[test]
    fn test_config_file_rejects_unknown_backend() {
        let file = ConfigFile {
            backend: Some("mongodb".to_string()),
            ..ConfigFile::default()
        };
        assert!(file.resolve().is_err());
    }

    #[test]
    fn test_cypher_requires_endpoint() {
        let file = ConfigFile {
            backend: Some("cypher".to_string()),
            ..ConfigFile::default()
        };
        assert!(file.resolve().is_err());
    }
}
