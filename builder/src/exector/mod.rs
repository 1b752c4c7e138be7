//! Build task execution
//!
//! A task arrives as a type tag plus a JSON body. The [`TaskDispatcher`]
//! looks the tag up in a [`TaskRegistry`], builds the matching [`TaskItem`]
//! and runs it once.
//!
//! Steps of a task end in a [`StepOutcome`]. Some failures are *suppressed*:
//! they are written to the task's event log, but `run` still returns `Ok`.
//! Others are *propagated* back to the dispatcher. Steps that already
//! completed are never rolled back.

pub mod dispatcher;
pub mod market_slug;

use std::sync::Arc;

use async_trait::async_trait;

use crate::api::DeploymentTrigger;
use crate::db::VersionStore;
use crate::errors::BuilderError;
use crate::event::EventManager;
use crate::filesys::owner::OwnershipFixer;
use crate::sources::RemoteConnector;
use crate::storage::layout::DataLayout;
use crate::storage::settings::ArtifactOwner;

pub use dispatcher::{TaskDispatcher, TaskFactory, TaskRegistry};
pub use market_slug::{MarketSlugItem, MarketSlugPayload, TransferMode};

/// A unit of build/deploy work, constructed per execution and run once
#[async_trait]
pub trait TaskItem: Send + Sync {
    /// Task type tag this item was registered under
    fn task_type(&self) -> &'static str;

    /// Event id whose log the dispatcher releases once the task has finished
    fn event_id(&self) -> Option<&str> {
        None
    }

    /// Execute every step in order
    async fn run(&self) -> Result<(), BuilderError>;
}

/// How a step ended
#[derive(Debug)]
pub enum StepOutcome {
    /// Continue with the next step
    Completed,

    /// Stop; the failure is only visible in the event log
    Suppressed(BuilderError),

    /// Stop and return the error to the caller
    Propagated(BuilderError),
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed)
    }

    /// Result seen by the dispatcher
    pub fn into_result(self) -> Result<(), BuilderError> {
        match self {
            StepOutcome::Completed | StepOutcome::Suppressed(_) => Ok(()),
            StepOutcome::Propagated(e) => Err(e),
        }
    }
}

/// Collaborators handed to every task item
#[derive(Clone)]
pub struct TaskDeps {
    pub events: EventManager,
    pub versions: Arc<dyn VersionStore>,
    pub trigger: Arc<dyn DeploymentTrigger>,
    pub remote: Arc<dyn RemoteConnector>,
    pub ownership: Arc<dyn OwnershipFixer>,
    pub layout: DataLayout,
    pub artifact_owner: ArtifactOwner,
}
