//! Version records kept as one JSON file each

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::model::VersionRecord;
use crate::db::VersionStore;
use crate::errors::BuilderError;
use crate::filesys::file::File;
use crate::storage::layout::is_path_component;

/// Stores `{root}/{service_id}/{deploy_version}.json`
pub struct JsonVersionStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonVersionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn record_file(&self, service_id: &str, deploy_version: &str) -> Result<File, BuilderError> {
        if !is_path_component(service_id) || !is_path_component(deploy_version) {
            return Err(BuilderError::NotFound(format!(
                "version {:?} of service {:?}",
                deploy_version, service_id
            )));
        }
        Ok(File::new(
            self.root
                .join(service_id)
                .join(format!("{}.json", deploy_version)),
        ))
    }

    /// Store a new record, as the build registration step does
    pub async fn insert(&self, record: &VersionRecord) -> Result<(), BuilderError> {
        let _guard = self.write_lock.lock().await;
        self.record_file(&record.service_id, &record.deploy_version)?
            .write_json_atomic(record)
            .await
    }
}

#[async_trait]
impl VersionStore for JsonVersionStore {
    async fn get_version_by_deploy_version(
        &self,
        deploy_version: &str,
        service_id: &str,
    ) -> Result<VersionRecord, BuilderError> {
        let file = self.record_file(service_id, deploy_version)?;
        if !file.exists().await {
            return Err(BuilderError::NotFound(format!(
                "version {} of service {}",
                deploy_version, service_id
            )));
        }
        file.read_json().await
    }

    async fn update_model(&self, record: &VersionRecord) -> Result<(), BuilderError> {
        let _guard = self.write_lock.lock().await;
        let file = self.record_file(&record.service_id, &record.deploy_version)?;
        if !file.exists().await {
            return Err(BuilderError::NotFound(format!(
                "version {} of service {}",
                record.deploy_version, record.service_id
            )));
        }
        debug!("Updating version record {}", file.path().display());
        file.write_json_atomic(record).await
    }
}
