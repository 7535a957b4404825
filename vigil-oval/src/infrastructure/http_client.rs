//! OVAL dictionary HTTP client

use std::time::Duration;

use reqwest::Client;

use vigil_core::domain::Family;
use vigil_core::infrastructure::{RetryConfig, retry_with_backoff};
use vigil_core::{DetectionError, FetchError, ParseError, TransportError};

use crate::domain::AdvisoryDefinition;

/// Client for `GET {base}/packs/{family}/{release}/{package}`
pub struct OvalHttpClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl OvalHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DetectionError::configuration(format!("failed to build OVAL HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            retry,
        })
    }

    pub fn packs_url(&self, family: Family, release: &str, package: &str) -> String {
        format!(
            "{}/packs/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            family,
            release,
            package
        )
    }

    /// Fetch definitions listing `package`, retrying transport failures
    ///
    /// A body that does not decode fails the query without retry.
    pub async fn get_by_pack_name(
        &self,
        family: Family,
        release: &str,
        package: &str,
    ) -> Result<Vec<AdvisoryDefinition>, FetchError> {
        let url = self.packs_url(family, release, package);
        tracing::debug!(url = %url, "HTTP request to OVAL dictionary");

        let body = retry_with_backoff(&self.retry, || self.get_body(&url)).await?;

        serde_json::from_str(&body).map_err(|e| {
            FetchError::Parse(ParseError::Payload {
                url: url.clone(),
                message: e.to_string(),
            })
        })
    }

    async fn get_body(&self, url: &str) -> Result<String, TransportError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                TransportError::InvalidUrl {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            } else {
                TransportError::network(url, e)
            }
        })?;

        if !response.status().is_success() {
            return Err(TransportError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| TransportError::network(url, e))
    }
}
