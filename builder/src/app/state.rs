//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::api::HttpDeploymentTrigger;
use crate::db::JsonVersionStore;
use crate::errors::BuilderError;
use crate::event::EventManager;
use crate::exector::{TaskDeps, TaskDispatcher, TaskRegistry};
use crate::filesys::owner::ChownFixer;
use crate::sources::CurlSftpConnector;
use crate::storage::settings::Settings;

/// Main application state
pub struct AppState {
    /// Event logs of every task run by this process
    pub events: EventManager,

    /// Dispatcher shared by all workers
    pub dispatcher: Arc<TaskDispatcher>,
}

impl AppState {
    /// Wire the production collaborators described by `settings`
    pub fn init(settings: &Settings) -> Result<Self, BuilderError> {
        info!("Initializing application state...");

        let layout = settings.layout();
        let events = EventManager::new();
        let trigger = HttpDeploymentTrigger::new(
            &settings.region_api.base_url,
            settings.region_api.token.clone(),
        )?;

        let deps = TaskDeps {
            events: events.clone(),
            versions: Arc::new(JsonVersionStore::new(layout.versions_dir())),
            trigger: Arc::new(trigger),
            remote: Arc::new(CurlSftpConnector::new()),
            ownership: Arc::new(ChownFixer),
            layout,
            artifact_owner: settings.artifact_owner,
        };

        let dispatcher = Arc::new(TaskDispatcher::new(TaskRegistry::with_defaults(), deps));
        info!(
            "Registered task types: {}",
            dispatcher.registry().task_types().join(", ")
        );

        Ok(Self { events, dispatcher })
    }
}
