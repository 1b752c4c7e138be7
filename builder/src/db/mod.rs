//! Version record persistence

pub mod json_store;
pub mod model;

use async_trait::async_trait;

use crate::errors::BuilderError;

pub use json_store::JsonVersionStore;
pub use model::{VersionRecord, VersionUpdate};

/// Storage for [`VersionRecord`]s.
///
/// Implementations serialize concurrent writers to the same record.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Record for `deploy_version` of `service_id`
    async fn get_version_by_deploy_version(
        &self,
        deploy_version: &str,
        service_id: &str,
    ) -> Result<VersionRecord, BuilderError>;

    /// Persist `record`, replacing the stored copy
    async fn update_model(&self, record: &VersionRecord) -> Result<(), BuilderError>;
}
