//! Error types for the builder engine

use thiserror::Error;

/// Main error type for the builder engine
#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Malformed task payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("Permission fixup failed: {0}")]
    PermissionFixupFailed(String),

    #[error("Version persistence failed: {0}")]
    VersionPersistenceFailed(String),

    #[error("Deployment trigger failed: {0}")]
    DeploymentTriggerFailed(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
