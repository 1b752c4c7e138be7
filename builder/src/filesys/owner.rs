//! Artifact ownership

use async_trait::async_trait;

use crate::errors::BuilderError;
use crate::filesys::file::File;
use crate::storage::settings::ArtifactOwner;

/// Hands fetched artifacts over to the identity that runs them
#[async_trait]
pub trait OwnershipFixer: Send + Sync {
    async fn set_owner(&self, file: &File, owner: ArtifactOwner) -> Result<(), BuilderError>;
}

/// Changes ownership with chown(2)
#[derive(Debug, Clone, Copy, Default)]
pub struct ChownFixer;

#[async_trait]
impl OwnershipFixer for ChownFixer {
    async fn set_owner(&self, file: &File, owner: ArtifactOwner) -> Result<(), BuilderError> {
        file.chown(owner.uid, owner.gid).await
    }
}
