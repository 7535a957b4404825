//! Error taxonomy for detection
//!
//! Per-record and per-query failures stay local ([`ParseError`] during a
//! version comparison, a single [`QueryFailure`] in a fetch batch). Per-host
//! failures abort the pipeline of that host only. [`DetectionError::is_batch_fatal`]
//! marks the errors that abort the whole batch.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Network or HTTP level failure talking to a remote source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} responded with HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("invalid request URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl TransportError {
    pub fn network(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. } | Self::Http { url, .. } | Self::InvalidUrl { url, .. } => {
                url
            }
        }
    }
}

/// Malformed input: version strings, response bodies, patterns
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("malformed {grammar} version {version:?}: {reason}")]
    MalformedVersion {
        grammar: &'static str,
        version: String,
        reason: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Payload { url: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Document { path: String, message: String },
}

impl ParseError {
    pub fn malformed_version(
        grammar: &'static str,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedVersion {
            grammar,
            version: version.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of one unit of remote work
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The worker handling the query stopped before sending a result
    #[error("no result received: {reason}")]
    Incomplete { reason: String },
}

/// A failed per-package query inside a fetch batch
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFailure {
    pub package: String,
    pub error: FetchError,
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.package, self.error)
    }
}

/// Top-level detection error
#[derive(Error, Debug)]
pub enum DetectionError {
    /// Missing or invalid configuration or database for a required family.
    #[error("{message}")]
    Configuration {
        message: String,
        /// True when the whole batch cannot proceed (e.g. a database that was never fetched)
        batch_wide: bool,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("timed out after {seconds}s while {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("{family} is not supported: {reason}")]
    UnsupportedFamily { family: String, reason: String },

    #[error("failed to fetch OVAL definitions for {family} {release}: {}", join_failures(.failures))]
    FetchFailed {
        family: String,
        release: String,
        failures: Vec<QueryFailure>,
    },

    #[error("{source_name} lookup failed for {context}: {message}")]
    Source {
        source_name: &'static str,
        context: String,
        message: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize or deserialize {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

fn join_failures(failures: &[QueryFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DetectionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            batch_wide: false,
        }
    }

    /// A configuration error about a missing database prerequisite
    pub fn missing_database(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            batch_wide: true,
        }
    }

    pub fn lookup(
        source_name: &'static str,
        context: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Source {
            source_name,
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            what: what.into(),
            source,
        }
    }

    /// Whether this error aborts every remaining host in the batch
    pub fn is_batch_fatal(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Configuration { batch_wide, .. } => *batch_wide,
            _ => false,
        }
    }
}

impl From<FetchError> for DetectionError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Transport(e) => Self::Transport(e),
            FetchError::Parse(e) => Self::Parse(e),
            FetchError::Incomplete { reason } => Self::lookup("fetch", "worker pool", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_fatal_classification() {
        assert!(
            DetectionError::Timeout {
                operation: "fetching OVAL".to_string(),
                seconds: 120
            }
            .is_batch_fatal()
        );
        assert!(DetectionError::missing_database("fetch OVAL first").is_batch_fatal());
        assert!(!DetectionError::configuration("release is empty").is_batch_fatal());
        assert!(
            !DetectionError::UnsupportedFamily {
                family: "gentoo".to_string(),
                reason: "not implemented yet".to_string()
            }
            .is_batch_fatal()
        );
    }

    #[test]
    fn test_fetch_failed_lists_every_query() {
        let err = DetectionError::FetchFailed {
            family: "debian".to_string(),
            release: "10".to_string(),
            failures: vec![
                QueryFailure {
                    package: "openssl".to_string(),
                    error: FetchError::Transport(TransportError::Http {
                        url: "http://oval/packs/debian/10/openssl".to_string(),
                        status: 503,
                    }),
                },
                QueryFailure {
                    package: "bash".to_string(),
                    error: FetchError::Parse(ParseError::Payload {
                        url: "http://oval/packs/debian/10/bash".to_string(),
                        message: "expected value".to_string(),
                    }),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("debian 10"));
        assert!(message.contains("openssl: http://oval/packs/debian/10/openssl responded with HTTP 503"));
        assert!(message.contains("bash: failed to decode"));
    }
}
