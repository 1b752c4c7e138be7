//! Main application run loop

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::app::state::AppState;
use crate::errors::BuilderError;
use crate::filesys::file::File;
use crate::storage::settings::Settings;
use crate::workers::executor::{self, TaskMessage, WorkerSummary};

/// Feed newline-delimited task messages from `input` to the executor worker
/// until the input ends or `shutdown_signal` fires.
pub async fn run<R>(
    settings: &Settings,
    input: R,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<WorkerSummary, BuilderError>
where
    R: AsyncBufRead + Unpin,
{
    let state = AppState::init(settings)?;
    let options = executor::Options {
        max_concurrent_tasks: settings.max_concurrent_tasks,
    };

    let (task_tx, task_rx) = mpsc::channel::<TaskMessage>(options.max_concurrent_tasks.max(1));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let dispatcher = state.dispatcher.clone();
    let worker = tokio::spawn(async move {
        let signal = Box::pin(async move {
            let _ = stop_rx.await;
        });
        executor::run(&options, dispatcher, task_rx, signal).await
    });

    tokio::pin!(shutdown_signal);
    let read_result = read_messages(input, &task_tx, shutdown_signal.as_mut()).await;

    // Queued and running tasks are drained on every exit path, read errors
    // included. Only a shutdown stops the worker from taking queued messages.
    if matches!(read_result, Ok(InputEnd::Shutdown)) {
        let _ = stop_tx.send(());
    }
    drop(task_tx);
    let summary = worker
        .await
        .map_err(|e| BuilderError::Internal(format!("executor worker failed: {}", e)))?;

    read_result.map(|_| summary)
}

enum InputEnd {
    Closed,
    Shutdown,
}

/// Forward decodable lines to `task_tx` until the input ends, the worker goes
/// away or `shutdown_signal` fires
async fn read_messages<R, S>(
    mut input: R,
    task_tx: &mpsc::Sender<TaskMessage>,
    mut shutdown_signal: Pin<&mut S>,
) -> Result<InputEnd, BuilderError>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown_signal.as_mut() => {
                info!("Shutdown signal received, stop reading tasks...");
                return Ok(InputEnd::Shutdown);
            }
            read = input.read_until(b'\n', &mut line) => read?,
        };

        if read == 0 {
            info!("Task input closed");
            return Ok(InputEnd::Closed);
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<TaskMessage>(&line) {
            Ok(message) => {
                if task_tx.send(message).await.is_err() {
                    error!("Executor worker is gone, stop reading tasks");
                    return Ok(InputEnd::Closed);
                }
            }
            Err(e) => warn!("Skipping undecodable task message: {}", e),
        }
    }
}

/// Run the single task message stored in `file`
pub async fn run_task_file(settings: &Settings, file: &File) -> Result<(), BuilderError> {
    let state = AppState::init(settings)?;
    let message: TaskMessage = file.read_json().await?;
    info!(
        "Running {} task from {}",
        message.task_type,
        file.path().display()
    );
    message.dispatch(&state.dispatcher).await
}
