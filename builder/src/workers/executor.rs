//! Task execution worker

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::errors::BuilderError;
use crate::exector::TaskDispatcher;

/// Executor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum tasks running at once
    pub max_concurrent_tasks: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
        }
    }
}

/// A task as delivered to the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_type: String,
    pub task_body: serde_json::Value,
}

impl TaskMessage {
    /// Run this message through `dispatcher`
    pub async fn dispatch(&self, dispatcher: &TaskDispatcher) -> Result<(), BuilderError> {
        let payload = serde_json::to_vec(&self.task_body)?;
        dispatcher.dispatch(&self.task_type, &payload).await
    }
}

/// Counts of finished tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Run the executor worker.
///
/// Every message is dispatched on its own tokio task. The worker stops
/// taking messages when the channel closes or `shutdown_signal` fires, then
/// waits for the tasks already running.
pub async fn run(
    options: &Options,
    dispatcher: Arc<TaskDispatcher>,
    mut receiver: mpsc::Receiver<TaskMessage>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> WorkerSummary {
    info!(
        "Executor worker starting with {} slots...",
        options.max_concurrent_tasks
    );

    let semaphore = Arc::new(Semaphore::new(options.max_concurrent_tasks.max(1)));
    let mut running: JoinSet<Result<(), BuilderError>> = JoinSet::new();
    let mut summary = WorkerSummary::default();

    loop {
        // A free slot first, so a shutdown is seen even while every slot is busy.
        let permit = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Executor worker shutting down...");
                break;
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                record(&mut summary, joined);
                continue;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Executor semaphore closed: {}", e);
                    break;
                }
            },
        };

        let message = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Executor worker shutting down...");
                break;
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                record(&mut summary, joined);
                continue;
            }
            message = receiver.recv() => match message {
                Some(message) => message,
                None => {
                    debug!("Task channel closed");
                    break;
                }
            },
        };

        info!("Received {} task", message.task_type);
        let dispatcher = dispatcher.clone();
        running.spawn(async move {
            let _permit = permit;
            message.dispatch(&dispatcher).await
        });
    }

    while let Some(joined) = running.join_next().await {
        record(&mut summary, joined);
    }

    info!(
        "Executor worker stopped: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    summary
}

fn record(
    summary: &mut WorkerSummary,
    joined: Result<Result<(), BuilderError>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Ok(())) => summary.succeeded += 1,
        Ok(Err(e)) => {
            warn!("Task failed: {}", e);
            summary.failed += 1;
        }
        Err(e) => {
            error!("Task aborted: {}", e);
            summary.failed += 1;
        }
    }
}
