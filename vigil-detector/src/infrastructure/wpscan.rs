//! WPScan vulnerability database REST client

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use vigil_core::config::WpScanConfig;
use vigil_core::domain::{WordPressPackage, WordPressPackageType};
use vigil_core::infrastructure::{RetryConfig, retry_with_backoff};
use vigil_core::{DetectionError, FetchError, ParseError, TransportError};

/// Vulnerability entry of a WordPress core release, plugin or theme
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WpVulnerability {
    pub id: String,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_date: Option<DateTime<Utc>>,
    pub vuln_type: String,
    pub references: WpReferences,
    pub fixed_in: Option<String>,
}

impl WpVulnerability {
    /// `CVE-` prefixed identifiers, `WPVDBID-{id}` when no CVE was assigned
    pub fn cve_ids(&self) -> Vec<String> {
        if self.references.cve.is_empty() {
            return vec![format!("WPVDBID-{}", self.id)];
        }
        self.references
            .cve
            .iter()
            .map(|id| format!("CVE-{}", id))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WpReferences {
    pub url: Vec<String>,
    pub cve: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WpEntry {
    vulnerabilities: Vec<WpVulnerability>,
}

/// Client for `GET {base}/api/v3/{wordpresses|plugins|themes}/{slug}`
pub struct WpScanClient {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl WpScanClient {
    pub fn new(
        config: &WpScanConfig,
        token: impl Into<String>,
        retry: RetryConfig,
    ) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DetectionError::configuration(format!("failed to build WPScan client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: token.into(),
            retry,
        })
    }

    pub fn package_url(&self, package: &WordPressPackage) -> String {
        let (kind, slug) = match package.package_type {
            WordPressPackageType::Core => ("wordpresses", package.version.replace('.', "")),
            WordPressPackageType::Plugin => ("plugins", package.name.clone()),
            WordPressPackageType::Theme => ("themes", package.name.clone()),
        };
        format!(
            "{}/api/v3/{}/{}",
            self.base_url.trim_end_matches('/'),
            kind,
            slug
        )
    }

    /// Known vulnerabilities of the package, empty when WPScan does not know it
    pub async fn fetch_vulnerabilities(
        &self,
        package: &WordPressPackage,
    ) -> Result<Vec<WpVulnerability>, DetectionError> {
        let url = self.package_url(package);
        debug!(url = %url, package = %package.name, "HTTP request to WPScan");

        let Some(body) = retry_with_backoff(&self.retry, || self.get_body(&url)).await? else {
            return Ok(Vec::new());
        };

        let entries: HashMap<String, Option<WpEntry>> =
            serde_json::from_str(&body).map_err(|e| {
                FetchError::Parse(ParseError::Payload {
                    url: url.clone(),
                    message: e.to_string(),
                })
            })?;
        Ok(entries
            .into_values()
            .flatten()
            .flat_map(|entry| entry.vulnerabilities)
            .collect())
    }

    async fn get_body(&self, url: &str) -> Result<Option<String>, TransportError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token token={}", self.token))
            .send()
            .await
            .map_err(|e| TransportError::network(url, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .text()
                .await
                .map(Some)
                .map_err(|e| TransportError::network(url, e)),
            status => Err(TransportError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}
