//! Per-task progress reporting
//!
//! Every task execution writes its progress to an append-only log keyed by
//! the task's event id. The log is what operators and the UI watch, so every
//! step outcome lands here whether or not the task returns an error.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Step names written to the event log
pub mod step {
    pub const SLUG_SHARE: &str = "slug-share";
    pub const CALLBACK: &str = "callback";
    pub const BUILD_CODE: &str = "build-code";
    pub const BUILD_EXECTOR: &str = "build-exector";
}

/// Entry severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Error,
}

/// Step and status tags attached to an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTags {
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl StepTags {
    pub fn step(step: &str) -> Self {
        Self {
            step: step.to_string(),
            status: None,
        }
    }

    pub fn success(step: &str) -> Self {
        Self {
            step: step.to_string(),
            status: Some("success".to_string()),
        }
    }

    pub fn failure(step: &str) -> Self {
        Self {
            step: step.to_string(),
            status: Some("failure".to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status.as_deref() == Some("failure")
    }
}

/// One line of a task's event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    pub event_id: String,
    pub level: EventLevel,
    pub message: String,
    #[serde(flatten)]
    pub tags: StepTags,
    pub time: DateTime<Utc>,
}

/// Sink for one task's progress messages
pub trait EventReporter: Send + Sync {
    /// Event id this reporter writes under
    fn event_id(&self) -> &str;

    fn info(&self, message: &str, tags: StepTags);

    fn error(&self, message: &str, tags: StepTags);
}

type EventLog = Arc<RwLock<HashMap<String, Vec<EventEntry>>>>;

/// Hands out reporters and keeps their entries in memory.
///
/// Entries are mirrored to `tracing` as they are written.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    logs: EventLog,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter bound to `event_id`
    pub fn get_logger(&self, event_id: &str) -> EventLogger {
        EventLogger {
            event_id: event_id.to_string(),
            logs: self.logs.clone(),
        }
    }

    /// Snapshot of everything written under `event_id`
    pub fn entries(&self, event_id: &str) -> Vec<EventEntry> {
        match self.logs.read() {
            Ok(logs) => logs.get(event_id).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned
                .into_inner()
                .get(event_id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Drop the log of a finished task, returning what it held
    pub fn release_logger(&self, event_id: &str) -> Vec<EventEntry> {
        let mut logs = match self.logs.write() {
            Ok(logs) => logs,
            Err(poisoned) => poisoned.into_inner(),
        };
        logs.remove(event_id).unwrap_or_default()
    }
}

/// Reporter handle for a single event id
#[derive(Debug, Clone)]
pub struct EventLogger {
    event_id: String,
    logs: EventLog,
}

impl EventLogger {
    fn append(&self, level: EventLevel, message: &str, tags: StepTags) {
        let entry = EventEntry {
            event_id: self.event_id.clone(),
            level,
            message: message.to_string(),
            tags,
            time: Utc::now(),
        };
        // A panic in another task must not silence this one.
        let mut logs = match self.logs.write() {
            Ok(logs) => logs,
            Err(poisoned) => poisoned.into_inner(),
        };
        logs.entry(self.event_id.clone()).or_default().push(entry);
    }
}

impl EventReporter for EventLogger {
    fn event_id(&self) -> &str {
        &self.event_id
    }

    fn info(&self, message: &str, tags: StepTags) {
        info!(
            event_id = %self.event_id,
            step = %tags.step,
            status = tags.status.as_deref().unwrap_or(""),
            "{}",
            message
        );
        self.append(EventLevel::Info, message, tags);
    }

    fn error(&self, message: &str, tags: StepTags) {
        error!(
            event_id = %self.event_id,
            step = %tags.step,
            status = tags.status.as_deref().unwrap_or(""),
            "{}",
            message
        );
        self.append(EventLevel::Error, message, tags);
    }
}
