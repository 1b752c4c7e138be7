//! Version record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata describing one deploy version of one service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default)]
    pub build_version: String,

    pub deploy_version: String,

    pub service_id: String,

    /// Last event that touched this record
    #[serde(default)]
    pub event_id: String,

    /// How the artifact is packaged, e.g. `slug` or `image`
    #[serde(default)]
    pub delivered_type: String,

    /// Where the artifact lives
    #[serde(default)]
    pub delivered_path: String,

    /// `success` or `failure`
    #[serde(default)]
    pub final_status: String,

    #[serde(default)]
    pub repo_url: String,

    #[serde(default)]
    pub commit_msg: String,

    #[serde(default)]
    pub author: String,

    #[serde(default = "Utc::now")]
    pub create_time: DateTime<Utc>,
}

/// Fields to change on a [`VersionRecord`]; empty fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionUpdate {
    #[serde(default)]
    pub delivered_type: String,
    #[serde(default)]
    pub delivered_path: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub final_status: String,
}

impl VersionRecord {
    /// Apply every non-empty field of `update`
    pub fn apply(&mut self, update: &VersionUpdate) {
        if !update.delivered_type.is_empty() {
            self.delivered_type = update.delivered_type.clone();
        }
        if !update.delivered_path.is_empty() {
            self.delivered_path = update.delivered_path.clone();
        }
        if !update.event_id.is_empty() {
            self.event_id = update.event_id.clone();
        }
        if !update.final_status.is_empty() {
            self.final_status = update.final_status.clone();
        }
    }
}
