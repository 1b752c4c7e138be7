//! Hand-off to the deployment subsystem

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BuilderError;

pub use client::HttpDeploymentTrigger;

/// Asks the orchestration layer to roll a service to a new deploy version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingUpgradeRequest {
    pub tenant_id: String,
    pub service_id: String,
    pub current_deploy_version: String,
    pub new_deploy_version: String,
    pub event_id: String,
}

/// Accepts rolling-upgrade requests for a tenant's service
#[async_trait]
pub trait DeploymentTrigger: Send + Sync {
    async fn upgrade_service(
        &self,
        tenant_name: &str,
        service_alias: &str,
        request: &RollingUpgradeRequest,
    ) -> Result<(), BuilderError>;
}
