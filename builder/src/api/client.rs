//! Region API client

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};
use url::Url;

use crate::api::{DeploymentTrigger, RollingUpgradeRequest};
use crate::errors::BuilderError;

/// Deployment trigger backed by the region API
pub struct HttpDeploymentTrigger {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpDeploymentTrigger {
    /// Create a new trigger for the API at `base_url`
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, BuilderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        // Stored with a trailing slash so the base reads as a directory.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| BuilderError::ConfigError(format!("invalid region api url: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint that upgrades `service_alias` of `tenant_name`.
    ///
    /// Both names are percent-encoded as single path segments.
    pub fn upgrade_url(&self, tenant_name: &str, service_alias: &str) -> Result<Url, BuilderError> {
        for name in [tenant_name, service_alias] {
            if matches!(name, "" | "." | "..") {
                return Err(BuilderError::DeploymentTriggerFailed(format!(
                    "invalid path segment {:?}",
                    name
                )));
            }
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BuilderError::ConfigError("region api url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v2", "tenants", tenant_name, "services", service_alias, "upgrade"]);
        Ok(url)
    }
}

#[async_trait]
impl DeploymentTrigger for HttpDeploymentTrigger {
    async fn upgrade_service(
        &self,
        tenant_name: &str,
        service_alias: &str,
        request: &RollingUpgradeRequest,
    ) -> Result<(), BuilderError> {
        let url = self.upgrade_url(tenant_name, service_alias)?;
        debug!("POST {}", url);

        let mut builder = self.client.post(url.clone()).json(request);
        if let Some(token) = &self.token {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Rolling upgrade request failed: {} - {}", status, body);
            return Err(BuilderError::DeploymentTriggerFailed(format!(
                "{}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
