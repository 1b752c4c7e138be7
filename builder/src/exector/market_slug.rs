//! Install a service from a pre-built market slug

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::api::{DeploymentTrigger, RollingUpgradeRequest};
use crate::db::{VersionStore, VersionUpdate};
use crate::errors::BuilderError;
use crate::event::{step, EventLogger, EventReporter, StepTags};
use crate::exector::{StepOutcome, TaskDeps, TaskItem};
use crate::filesys::file::File;
use crate::filesys::owner::OwnershipFixer;
use crate::sources::{copy_file_with_progress, RemoteConnector, RemoteCredentials};
use crate::storage::layout::is_path_component;
use crate::storage::settings::ArtifactOwner;

/// Task type tag of [`MarketSlugItem`]
pub const TASK_TYPE: &str = "build_from_market_slug";

/// Wire body of a market slug task
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketSlugPayload {
    #[serde(default)]
    pub tenant_name: String,
    #[serde(default)]
    pub service_alias: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub deploy_version: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub slug_info: SlugInfo,
}

/// Where the slug comes from
#[derive(Debug, Clone, Deserialize)]
pub struct SlugInfo {
    #[serde(default)]
    pub slug_path: String,
    #[serde(default)]
    pub ftp_host: String,
    #[serde(default)]
    pub ftp_port: String,
    #[serde(default, rename = "ftp_username")]
    pub ftp_user: String,
    #[serde(default = "empty_secret")]
    pub ftp_password: SecretString,
}

fn empty_secret() -> SecretString {
    SecretString::from("".to_string())
}

impl Default for SlugInfo {
    fn default() -> Self {
        Self {
            slug_path: String::new(),
            ftp_host: String::new(),
            ftp_port: String::new(),
            ftp_user: String::new(),
            ftp_password: empty_secret(),
        }
    }
}

/// How the slug is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Local,
    Remote,
}

impl SlugInfo {
    /// Remote only when both host and port are given
    pub fn transfer_mode(&self) -> TransferMode {
        if !self.ftp_host.is_empty() && !self.ftp_port.is_empty() {
            TransferMode::Remote
        } else {
            TransferMode::Local
        }
    }

    fn credentials(&self) -> RemoteCredentials {
        RemoteCredentials {
            host: self.ftp_host.clone(),
            port: self.ftp_port.clone(),
            username: self.ftp_user.clone(),
            password: self.ftp_password.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlugStep {
    AcquireArtifact,
    FixOwnership,
    ReportBuilt,
    UpdateVersion,
    TriggerUpgrade,
    ReportStarted,
}

impl SlugStep {
    const ALL: [SlugStep; 6] = [
        SlugStep::AcquireArtifact,
        SlugStep::FixOwnership,
        SlugStep::ReportBuilt,
        SlugStep::UpdateVersion,
        SlugStep::TriggerUpgrade,
        SlugStep::ReportStarted,
    ];
}

/// Fetches a slug onto the shared volume, marks the version delivered and
/// asks for a rolling upgrade
pub struct MarketSlugItem {
    payload: MarketSlugPayload,
    tgz_file: File,
    logger: EventLogger,
    versions: Arc<dyn VersionStore>,
    trigger: Arc<dyn DeploymentTrigger>,
    remote: Arc<dyn RemoteConnector>,
    ownership: Arc<dyn OwnershipFixer>,
    owner: ArtifactOwner,
}

impl MarketSlugItem {
    /// Decode `payload` and bind the task's collaborators. Performs no I/O.
    pub fn new(payload: &[u8], deps: &TaskDeps) -> Result<Self, BuilderError> {
        let payload: MarketSlugPayload = serde_json::from_slice(payload)
            .map_err(|e| BuilderError::MalformedPayload(e.to_string()))?;
        for (field, value) in [
            ("tenant_id", &payload.tenant_id),
            ("service_id", &payload.service_id),
            ("deploy_version", &payload.deploy_version),
        ] {
            if !is_path_component(value) {
                return Err(BuilderError::MalformedPayload(format!(
                    "{} {:?} is not a single path component",
                    field, value
                )));
            }
        }

        let logger = deps.events.get_logger(&payload.event_id);
        let tgz_file = deps.layout.slug_file(
            &payload.tenant_id,
            &payload.service_id,
            &payload.deploy_version,
        );

        Ok(Self {
            payload,
            tgz_file,
            logger,
            versions: deps.versions.clone(),
            trigger: deps.trigger.clone(),
            remote: deps.remote.clone(),
            ownership: deps.ownership.clone(),
            owner: deps.artifact_owner,
        })
    }

    /// Registry entry point
    pub fn factory(payload: &[u8], deps: &TaskDeps) -> Result<Box<dyn TaskItem>, BuilderError> {
        Ok(Box::new(Self::new(payload, deps)?))
    }

    pub fn payload(&self) -> &MarketSlugPayload {
        &self.payload
    }

    /// Destination of the fetched slug
    pub fn tgz_path(&self) -> &Path {
        self.tgz_file.path()
    }

    pub fn transfer_mode(&self) -> TransferMode {
        self.payload.slug_info.transfer_mode()
    }

    /// Rolling upgrade body sent once the slug is in place
    pub fn create_upgrade_task_body(&self) -> RollingUpgradeRequest {
        RollingUpgradeRequest {
            tenant_id: self.payload.tenant_id.clone(),
            service_id: self.payload.service_id.clone(),
            // TODO: pass the running version as current once the task body carries it
            current_deploy_version: self.payload.deploy_version.clone(),
            new_deploy_version: self.payload.deploy_version.clone(),
            event_id: self.payload.event_id.clone(),
        }
    }

    /// Load this task's version record, apply `update` and store it
    pub async fn update_version_info(&self, update: &VersionUpdate) -> Result<(), BuilderError> {
        let mut version = self
            .versions
            .get_version_by_deploy_version(&self.payload.deploy_version, &self.payload.service_id)
            .await?;
        version.apply(update);
        self.versions.update_model(&version).await
    }

    /// Run every step and return the outcome that ended the task
    pub async fn execute(&self) -> StepOutcome {
        for slug_step in SlugStep::ALL {
            debug!("Market slug task {}: {:?}", self.payload.event_id, slug_step);
            let outcome = match slug_step {
                SlugStep::AcquireArtifact => self.acquire_artifact().await,
                SlugStep::FixOwnership => self.fix_ownership().await,
                SlugStep::ReportBuilt => {
                    self.logger
                        .info("Application build finished", StepTags::success(step::BUILD_CODE));
                    StepOutcome::Completed
                }
                SlugStep::UpdateVersion => self.mark_delivered().await,
                SlugStep::TriggerUpgrade => self.trigger_upgrade().await,
                SlugStep::ReportStarted => {
                    self.logger
                        .info("Application started", StepTags::step(step::BUILD_EXECTOR));
                    StepOutcome::Completed
                }
            };
            if !outcome.is_completed() {
                return outcome;
            }
        }
        StepOutcome::Completed
    }

    async fn acquire_artifact(&self) -> StepOutcome {
        let slug_info = &self.payload.slug_info;
        match slug_info.transfer_mode() {
            TransferMode::Remote => {
                let session = match self.remote.connect(&slug_info.credentials()).await {
                    Ok(session) => session,
                    Err(e) => {
                        // Suppressed like any other acquisition failure, not
                        // returned to the caller. The slug-share failure event
                        // is the only trace of it.
                        self.logger.error(
                            "Failed to create the remote transfer client",
                            StepTags::failure(step::SLUG_SHARE),
                        );
                        error!("create remote transfer client error: {}", e);
                        return StepOutcome::Suppressed(BuilderError::ArtifactUnavailable(
                            e.to_string(),
                        ));
                    }
                };

                let result = session
                    .download_file(&slug_info.slug_path, self.tgz_file.path(), &self.logger)
                    .await;
                if let Err(e) = session.close().await {
                    warn!("close remote transfer session error: {}", e);
                }

                if let Err(e) = result {
                    self.logger.error(
                        "Failed to fetch the slug from the remote server, install failed",
                        StepTags::failure(step::CALLBACK),
                    );
                    error!("copy slug file error when build service, {}", e);
                    return StepOutcome::Suppressed(BuilderError::ArtifactUnavailable(
                        e.to_string(),
                    ));
                }
            }
            TransferMode::Local => {
                if let Err(e) = copy_file_with_progress(
                    Path::new(&slug_info.slug_path),
                    self.tgz_file.path(),
                    &self.logger,
                )
                .await
                {
                    self.logger.error(
                        "Failed to fetch the local slug, install failed",
                        StepTags::failure(step::CALLBACK),
                    );
                    error!("copy slug file error when build service, {}", e);
                    return StepOutcome::Suppressed(BuilderError::ArtifactUnavailable(
                        e.to_string(),
                    ));
                }
            }
        }
        StepOutcome::Completed
    }

    async fn fix_ownership(&self) -> StepOutcome {
        if let Err(e) = self.ownership.set_owner(&self.tgz_file, self.owner).await {
            if let Err(remove_err) = self.tgz_file.delete().await {
                warn!("remove slug file error: {}", remove_err);
            }
            self.logger.error(
                "Failed to fetch the local slug, install failed",
                StepTags::failure(step::CALLBACK),
            );
            error!("chown slug file error when build service, {}", e);
            return StepOutcome::Suppressed(BuilderError::PermissionFixupFailed(e.to_string()));
        }
        StepOutcome::Completed
    }

    async fn mark_delivered(&self) -> StepOutcome {
        let update = VersionUpdate {
            delivered_type: "slug".to_string(),
            delivered_path: self.tgz_file.path().display().to_string(),
            event_id: self.payload.event_id.clone(),
            final_status: "success".to_string(),
        };
        if let Err(e) = self.update_version_info(&update).await {
            error!("update version info error: {}", e);
            self.logger.error(
                "Failed to update the application version info",
                StepTags::failure(step::CALLBACK),
            );
            return StepOutcome::Propagated(BuilderError::VersionPersistenceFailed(e.to_string()));
        }
        StepOutcome::Completed
    }

    async fn trigger_upgrade(&self) -> StepOutcome {
        self.logger.info(
            "Application synced, starting the application",
            StepTags::step(step::BUILD_EXECTOR),
        );
        let body = self.create_upgrade_task_body();
        if let Err(e) = self
            .trigger
            .upgrade_service(&self.payload.tenant_name, &self.payload.service_alias, &body)
            .await
        {
            self.logger.error(
                "Failed to start the application, please start it manually",
                StepTags::failure(step::CALLBACK),
            );
            error!("rolling update service error, {}", e);
            let e = match e {
                BuilderError::DeploymentTriggerFailed(_) => e,
                other => BuilderError::DeploymentTriggerFailed(other.to_string()),
            };
            return StepOutcome::Propagated(e);
        }
        info!(
            "Rolling upgrade requested for {}/{} at {}",
            self.payload.tenant_name, self.payload.service_alias, self.payload.deploy_version
        );
        StepOutcome::Completed
    }
}

#[async_trait]
impl TaskItem for MarketSlugItem {
    fn task_type(&self) -> &'static str {
        TASK_TYPE
    }

    fn event_id(&self) -> Option<&str> {
        Some(&self.payload.event_id)
    }

    async fn run(&self) -> Result<(), BuilderError> {
        self.execute().await.into_result()
    }
}
