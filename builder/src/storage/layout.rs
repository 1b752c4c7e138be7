//! Data volume layout

use std::path::PathBuf;

use crate::filesys::file::File;

/// Default mount point of the shared data volume
pub const DEFAULT_SHARE_DATA_PATH: &str = "/grdata";

/// Default mount point of the node-local data volume
pub const DEFAULT_LOCAL_DATA_PATH: &str = "/grlocaldata";

/// Paths on the shared and node-local data volumes
#[derive(Debug, Clone)]
pub struct DataLayout {
    /// Root of the volume shared by every node in the cluster
    pub share_root: PathBuf,

    /// Root of the node-local volume
    pub local_root: PathBuf,
}

impl DataLayout {
    /// Create a new data layout
    pub fn new(share_root: impl Into<PathBuf>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            share_root: share_root.into(),
            local_root: local_root.into(),
        }
    }

    /// Destination of a slug archive.
    ///
    /// Depends only on the tenant, service and deploy version so that every
    /// task for the same build lands on the same file.
    pub fn slug_file(&self, tenant_id: &str, service_id: &str, deploy_version: &str) -> File {
        File::new(
            self.share_root
                .join("build")
                .join("tenant")
                .join(tenant_id)
                .join("slug")
                .join(service_id)
                .join(format!("{}.tgz", deploy_version)),
        )
    }

    /// Directory holding the version records of the JSON store
    pub fn versions_dir(&self) -> PathBuf {
        self.local_root.join("versions")
    }
}

/// Whether `value` stays a single component when joined onto a data root
pub fn is_path_component(value: &str) -> bool {
    !matches!(value, "." | "..") && !value.contains(['/', '\\', '\0'])
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(DEFAULT_SHARE_DATA_PATH, DEFAULT_LOCAL_DATA_PATH)
    }
}
