//! GitHub security alerts (Dependabot) GraphQL client

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vigil_core::config::GitHubConfig;
use vigil_core::{DetectionError, ParseError, TransportError};

const ALERTS_QUERY: &str = r#"query VulnerabilityAlerts($owner: String!, $repo: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    url
    vulnerabilityAlerts(first: $first, after: $after) {
      pageInfo { endCursor hasNextPage }
      edges {
        node {
          id
          dismissReason
          dismissedAt
          vulnerableManifestPath
          securityVulnerability {
            package { name ecosystem }
            severity
            vulnerableVersionRange
            firstPatchedVersion { identifier }
          }
          securityAdvisory {
            description
            ghsaId
            permalink
            publishedAt
            summary
            updatedAt
            identifiers { type value }
            references { url }
          }
        }
      }
    }
  }
}"#;

#[derive(Debug, Serialize)]
struct GraphQLRequest {
    query: &'static str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryData {
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    #[serde(default)]
    url: String,
    vulnerability_alerts: AlertConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertConnection {
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<AlertEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct AlertEdge {
    node: VulnerabilityAlert,
}

/// One alert raised on a repository's dependency manifest
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VulnerabilityAlert {
    pub id: String,
    pub dismiss_reason: Option<String>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub vulnerable_manifest_path: String,
    pub security_vulnerability: SecurityVulnerability,
    pub security_advisory: SecurityAdvisory,
}

impl VulnerabilityAlert {
    pub fn is_dismissed(&self) -> bool {
        self.dismissed_at.is_some()
    }

    /// CVE identifiers of the advisory, the GHSA id when it has none
    pub fn cve_ids(&self) -> Vec<String> {
        let ids: Vec<String> = self
            .security_advisory
            .identifiers
            .iter()
            .filter(|i| i.identifier_type == "CVE")
            .map(|i| i.value.clone())
            .collect();
        if ids.is_empty() && !self.security_advisory.ghsa_id.is_empty() {
            return vec![self.security_advisory.ghsa_id.clone()];
        }
        ids
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityVulnerability {
    pub package: AlertPackage,
    pub severity: String,
    pub vulnerable_version_range: String,
    pub first_patched_version: Option<PatchedVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertPackage {
    pub name: String,
    pub ecosystem: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PatchedVersion {
    pub identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityAdvisory {
    pub description: String,
    pub ghsa_id: String,
    pub permalink: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub identifiers: Vec<AdvisoryIdentifier>,
    pub references: Vec<AdvisoryReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdvisoryIdentifier {
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdvisoryReference {
    pub url: String,
}

/// Client for the GitHub GraphQL API
pub struct GitHubAlertsClient {
    client: Client,
    graphql_url: String,
    page_size: u32,
}

impl GitHubAlertsClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DetectionError::configuration(format!("failed to build GitHub client: {}", e))
            })?;

        Ok(Self {
            client,
            graphql_url: config.graphql_url.clone(),
            page_size: config.page_size,
        })
    }

    /// Every alert of `owner/repo`, following pagination
    pub async fn fetch_alerts(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> Result<Vec<VulnerabilityAlert>, DetectionError> {
        let mut alerts = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let variables = serde_json::json!({
                "owner": owner,
                "repo": repo,
                "first": self.page_size,
                "after": after,
            });
            let data: RepositoryData = self.execute_query(variables, token).await?;
            let repository = data.repository.ok_or_else(|| {
                DetectionError::lookup(
                    "GitHub",
                    format!("{}/{}", owner, repo),
                    "repository not found or not accessible with the configured token",
                )
            })?;

            let connection = repository.vulnerability_alerts;
            debug!(
                repository = %repository.url,
                page_alerts = connection.edges.len(),
                has_next_page = connection.page_info.has_next_page,
                "Fetched GitHub security alerts page"
            );
            alerts.extend(connection.edges.into_iter().map(|edge| edge.node));

            match connection.page_info.end_cursor {
                Some(cursor) if connection.page_info.has_next_page => after = Some(cursor),
                _ => break,
            }
        }
        Ok(alerts)
    }

    async fn execute_query<T>(
        &self,
        variables: serde_json::Value,
        token: &str,
    ) -> Result<T, DetectionError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request_body = GraphQLRequest {
            query: ALERTS_QUERY,
            variables,
        };

        let response = self
            .client
            .post(&self.graphql_url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| TransportError::network(&self.graphql_url, e))?;

        if !response.status().is_success() {
            return Err(TransportError::Http {
                url: self.graphql_url.clone(),
                status: response.status().as_u16(),
            }
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(&self.graphql_url, e))?;
        let graphql_response: GraphQLResponse<T> =
            serde_json::from_str(&body).map_err(|e| ParseError::Payload {
                url: self.graphql_url.clone(),
                message: e.to_string(),
            })?;

        if let Some(errors) = graphql_response.errors
            && !errors.is_empty()
        {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(DetectionError::lookup(
                "GitHub",
                &self.graphql_url,
                messages.join(" | "),
            ));
        }

        graphql_response.data.ok_or_else(|| {
            DetectionError::lookup("GitHub", &self.graphql_url, "no data in GraphQL response")
        })
    }
}
