//! Client for the [metadata server](https://cloud.google.com/compute/docs/metadata/overview)
//! available to workloads running on Google Cloud.

use std::time::Duration;

use reqwest::Client;

use super::errors::{GAuthError, Result};
use super::jwt::Token;

/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_VAR: &str = "GCE_METADATA_HOST";

/// Documented metadata server IP address.
pub const METADATA_IP: &str = "169.254.169.254";

const METADATA_FLAVOR: &str = "Metadata-Flavor";
const GOOGLE: &str = "Google";

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct MetadataClient {
    host: String,
    http_client: Client,
}

impl MetadataClient {
    /// Uses `host` if given, else `GCE_METADATA_HOST`, else the documented IP.
    pub fn new(host: Option<&str>) -> Self {
        let host = match host {
            Some(host) => host.to_owned(),
            None => std::env::var(METADATA_HOST_VAR).unwrap_or_else(|_| METADATA_IP.to_owned()),
        };

        Self {
            host,
            http_client: Client::new(),
        }
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, suffix: &str) -> String {
        format!("http://{}/computeMetadata/v1/{}", self.host, suffix)
    }

    /// Returns `true` if a Google metadata server answers on the configured host.
    pub async fn on_gce(&self) -> bool {
        let response = self
            .http_client
            .get(format!("http://{}/", self.host))
            .header(METADATA_FLAVOR, GOOGLE)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) => response
                .headers()
                .get(METADATA_FLAVOR)
                .is_some_and(|flavor| flavor == GOOGLE),
            Err(err) => {
                tracing::debug!("Metadata server probe at {} failed: {err}", self.host);
                false
            }
        }
    }

    /// Project the instance runs in, trimmed of surrounding whitespace.
    pub async fn project_id(&self) -> Result<String> {
        let response = self
            .http_client
            .get(self.url("project/project-id"))
            .header(METADATA_FLAVOR, GOOGLE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GAuthError::MetadataStatus(response.status()));
        }

        Ok(response.text().await?.trim().to_owned())
    }

    /// Access token of the instance's default service account.
    pub async fn access_token(&self) -> Result<Token> {
        let response = self
            .http_client
            .get(self.url("instance/service-accounts/default/token"))
            .header(METADATA_FLAVOR, GOOGLE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GAuthError::MetadataStatus(response.status()));
        }

        Ok(response.json::<Token>().await?)
    }
}
