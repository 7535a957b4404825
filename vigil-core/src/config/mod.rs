//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry configuration (serializable version)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigSerializable {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay between retries (in milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfigSerializable {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfigSerializable {
    /// Convert to the runtime RetryConfig
    pub fn to_retry_config(&self) -> crate::infrastructure::resilience::RetryConfig {
        crate::infrastructure::resilience::RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub oval: OvalConfig,
    pub databases: DatabasesConfig,
    pub github: GitHubConfig,
    pub wpscan: WpScanConfig,
    pub filters: FiltersConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
    pub servers: HashMap<String, ServerConfig>,
}

/// Where OVAL definitions are read from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OvalMode {
    /// Local snapshot database
    #[default]
    Offline,
    /// Remote OVAL dictionary server
    Http,
}

/// OVAL source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OvalConfig {
    pub mode: OvalMode,
    /// Base URL of the OVAL dictionary server, used in http mode
    pub url: String,
    /// Number of concurrent request workers
    pub concurrency: usize,
    /// Deadline for one whole fetch batch (in seconds)
    pub timeout_seconds: u64,
    /// Timeout for one HTTP request (in seconds)
    pub request_timeout_seconds: u64,
    /// Age after which the local database is reported as stale (in days)
    pub stale_after_days: i64,
    pub retry: RetryConfigSerializable,
}

impl Default for OvalConfig {
    fn default() -> Self {
        Self {
            mode: OvalMode::Offline,
            url: "http://127.0.0.1:1324".to_string(),
            concurrency: 10,
            timeout_seconds: 120,
            request_timeout_seconds: 10,
            stale_after_days: 3,
            retry: RetryConfigSerializable::default(),
        }
    }
}

impl OvalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Local vulnerability databases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasesConfig {
    /// JSON snapshot holding OVAL, security tracker, CVE, exploit and CWE data
    pub snapshot_path: PathBuf,
}

impl Default for DatabasesConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("vigil-db.json"),
        }
    }
}

/// GitHub security alerts configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub graphql_url: String,
    /// Skip alerts that were dismissed in the repository
    pub ignore_dismissed: bool,
    pub timeout_seconds: u64,
    /// Alerts requested per GraphQL page
    pub page_size: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            graphql_url: "https://api.github.com/graphql".to_string(),
            ignore_dismissed: false,
            timeout_seconds: 30,
            page_size: 100,
        }
    }
}

/// WPScan vulnerability database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WpScanConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// Report vulnerabilities of inactive plugins and themes
    pub detect_inactive: bool,
    pub timeout_seconds: u64,
}

impl Default for WpScanConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wpscan.com".to_string(),
            token: None,
            detect_inactive: false,
            timeout_seconds: 30,
        }
    }
}

/// Report filters applied after detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Keep only vulnerabilities scoring at or above this CVSS score
    pub cvss_score_over: f64,
    pub ignore_unfixed: bool,
    pub ignore_unscored_cves: bool,
}

/// Report run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub results_dir: PathBuf,
    /// Detect again even when results already carry vulnerability content
    pub refresh_cve: bool,
    pub diff_plus: bool,
    pub diff_minus: bool,
    /// `en` or `ja`
    pub lang: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            refresh_cve: false,
            diff_plus: false,
            diff_minus: false,
            lang: "en".to_string(),
        }
    }
}

impl ReportConfig {
    pub fn diff_enabled(&self) -> bool {
        self.diff_plus || self.diff_minus
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Per-server detection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub cpe_names: Vec<String>,
    /// OWASP Dependency-Check XML report whose CPE identifiers are detected too
    pub owasp_dc_xml_path: Option<PathBuf>,
    /// GitHub repositories (`owner/repo`) whose security alerts are collected
    pub github_repos: HashMap<String, GitHubRepoConfig>,
    pub ignore_cves: Vec<String>,
    pub ignore_pkgs_regexp: Vec<String>,
    /// Top-level keys of the result JSON left out when the result is written back
    pub ignored_json_keys: Vec<String>,
    pub containers: HashMap<String, ContainerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubRepoConfig {
    pub token: String,
}

/// Per-container detection settings, overriding the server ones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub cpe_names: Vec<String>,
    pub owasp_dc_xml_path: Option<PathBuf>,
    pub ignore_cves: Vec<String>,
    pub ignore_pkgs_regexp: Vec<String>,
}

/// Detection inputs resolved for one host or container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSettings {
    pub cpe_names: Vec<String>,
    pub owasp_dc_xml_path: Option<PathBuf>,
    pub ignore_cves: Vec<String>,
    pub ignore_pkgs_regexp: Vec<String>,
}

impl Config {
    /// Load configuration from an optional file and environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // Environment variables last (highest priority)
        builder = builder.add_source(config::Environment::with_prefix("VIGIL").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Settings for a server, or for one of its containers when `container` is set
    ///
    /// Unknown servers resolve to empty settings.
    pub fn target(&self, server_name: &str, container: Option<&str>) -> TargetSettings {
        let Some(server) = self.servers.get(server_name) else {
            return TargetSettings::default();
        };

        match container.and_then(|name| server.containers.get(name)) {
            Some(c) => TargetSettings {
                cpe_names: c.cpe_names.clone(),
                owasp_dc_xml_path: c.owasp_dc_xml_path.clone(),
                ignore_cves: c.ignore_cves.clone(),
                ignore_pkgs_regexp: c.ignore_pkgs_regexp.clone(),
            },
            None if container.is_some() => TargetSettings::default(),
            None => TargetSettings {
                cpe_names: server.cpe_names.clone(),
                owasp_dc_xml_path: server.owasp_dc_xml_path.clone(),
                ignore_cves: server.ignore_cves.clone(),
                ignore_pkgs_regexp: server.ignore_pkgs_regexp.clone(),
            },
        }
    }

    /// Result JSON keys cleared before a result of `server_name` is persisted
    pub fn ignored_json_keys(&self, server_name: &str) -> &[String] {
        self.servers
            .get(server_name)
            .map(|server| server.ignored_json_keys.as_slice())
            .unwrap_or_default()
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_fetch_limits() {
        let config = Config::default();
        assert_eq!(config.oval.concurrency, 10);
        assert_eq!(config.oval.timeout(), Duration::from_secs(120));
        assert_eq!(config.oval.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.oval.retry.to_retry_config().max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[oval]
mode = "http"
url = "http://oval.internal:1324"

[servers.web01]
cpe_names = ["cpe:/a:apache:http_server:2.4.6"]
ignore_cves = ["CVE-2014-0160"]
ignored_json_keys = ["packages", "optional"]

[servers.web01.containers.nginx]
cpe_names = ["cpe:/a:nginx:nginx:1.18.0"]

[servers.web01.github_repos."acme/shop"]
token = "ghp_x"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.oval.mode, OvalMode::Http);
        assert_eq!(config.oval.url, "http://oval.internal:1324");

        let host = config.target("web01", None);
        assert_eq!(host.cpe_names, vec!["cpe:/a:apache:http_server:2.4.6"]);
        assert_eq!(host.ignore_cves, vec!["CVE-2014-0160"]);

        let container = config.target("web01", Some("nginx"));
        assert_eq!(container.cpe_names, vec!["cpe:/a:nginx:nginx:1.18.0"]);
        assert!(container.ignore_cves.is_empty());

        assert_eq!(config.target("web01", Some("redis")), TargetSettings::default());
        assert_eq!(config.target("db01", None), TargetSettings::default());
        assert_eq!(config.servers["web01"].github_repos["acme/shop"].token, "ghp_x");
        assert_eq!(config.ignored_json_keys("web01"), ["packages", "optional"]);
        assert!(config.ignored_json_keys("db01").is_empty());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[oval]\nconcurrency = 0").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Validation(_)));
    }
}
