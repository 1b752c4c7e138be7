//! Task type registry and dispatcher

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info};

use crate::errors::BuilderError;
use crate::exector::market_slug::{self, MarketSlugItem};
use crate::exector::{TaskDeps, TaskItem};

/// Builds a task item from its wire body
pub type TaskFactory = fn(&[u8], &TaskDeps) -> Result<Box<dyn TaskItem>, BuilderError>;

/// Task type tags and the factories that build them
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in task type
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(market_slug::TASK_TYPE, MarketSlugItem::factory);
        registry
    }

    /// Add or replace the factory for `task_type`
    pub fn register(&mut self, task_type: &str, factory: TaskFactory) -> &mut Self {
        self.factories.insert(task_type.to_string(), factory);
        self
    }

    pub fn get(&self, task_type: &str) -> Option<TaskFactory> {
        self.factories.get(task_type).copied()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.factories.contains_key(task_type)
    }

    /// Registered tags, sorted
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Builds and runs one task per call
#[derive(Clone)]
pub struct TaskDispatcher {
    registry: Arc<TaskRegistry>,
    deps: TaskDeps,
}

impl TaskDispatcher {
    pub fn new(registry: TaskRegistry, deps: TaskDeps) -> Self {
        Self {
            registry: Arc::new(registry),
            deps,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn deps(&self) -> &TaskDeps {
        &self.deps
    }

    /// Construct the item registered for `task_type` and run it to completion.
    ///
    /// A panic inside the task is caught and returned as
    /// [`BuilderError::TaskPanicked`]. Nothing is retried. The task's event
    /// log is released afterwards; its entries were already mirrored to
    /// tracing.
    pub async fn dispatch(&self, task_type: &str, payload: &[u8]) -> Result<(), BuilderError> {
        let factory = self
            .registry
            .get(task_type)
            .ok_or_else(|| BuilderError::UnknownTaskType(task_type.to_string()))?;

        let item = factory(payload, &self.deps)?;
        debug!("Dispatching {} task", item.task_type());

        let result = AssertUnwindSafe(item.run()).catch_unwind().await;
        if let Some(event_id) = item.event_id() {
            let released = self.deps.events.release_logger(event_id);
            debug!("Released {} event entries of {}", released.len(), event_id);
        }

        match result {
            Ok(Ok(())) => {
                info!("Task {} finished", task_type);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Task {} failed: {}", task_type, e);
                Err(e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Task {} panicked: {}", task_type, message);
                Err(BuilderError::TaskPanicked(message))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
