//! Dispatcher tests

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use paas_builder::errors::BuilderError;
use paas_builder::exector::{TaskDeps, TaskDispatcher, TaskItem, TaskRegistry};

use crate::common::{slug_body, to_bytes, Harness};

/// Panics halfway through its run
struct PanickingItem;

#[async_trait]
impl TaskItem for PanickingItem {
    fn task_type(&self) -> &'static str {
        "panicking"
    }

    async fn run(&self) -> Result<(), BuilderError> {
        panic!("slug volume vanished");
    }
}

fn panicking_factory(_: &[u8], _: &TaskDeps) -> Result<Box<dyn TaskItem>, BuilderError> {
    Ok(Box::new(PanickingItem))
}

/// Echoes its payload into the event log of event id "echo"
struct EchoItem {
    deps: TaskDeps,
    body: String,
}

#[async_trait]
impl TaskItem for EchoItem {
    fn task_type(&self) -> &'static str {
        "echo"
    }

    async fn run(&self) -> Result<(), BuilderError> {
        use paas_builder::event::{EventReporter, StepTags};
        self.deps
            .events
            .get_logger("echo")
            .info(&self.body, StepTags::step("echo"));
        Ok(())
    }
}

fn echo_factory(payload: &[u8], deps: &TaskDeps) -> Result<Box<dyn TaskItem>, BuilderError> {
    Ok(Box::new(EchoItem {
        deps: deps.clone(),
        body: String::from_utf8_lossy(payload).to_string(),
    }))
}

#[tokio::test]
async fn test_unknown_task_type() {
    let h = Harness::new();
    let dispatcher = TaskDispatcher::new(TaskRegistry::with_defaults(), h.deps());

    let err = assert_err!(dispatcher.dispatch("build_from_image", b"{}").await);
    assert!(matches!(err, BuilderError::UnknownTaskType(ref t) if t == "build_from_image"));
}

#[tokio::test]
async fn test_malformed_payload_is_returned() {
    let h = Harness::new();
    let dispatcher = TaskDispatcher::new(TaskRegistry::with_defaults(), h.deps());

    let err = assert_err!(
        dispatcher
            .dispatch("build_from_market_slug", b"not json")
            .await
    );
    assert!(matches!(err, BuilderError::MalformedPayload(_)));
    assert!(h.trigger.calls().is_empty());
}

#[tokio::test]
async fn test_dispatch_market_slug() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    let src = h.write_source("a.tgz", b"slug-bytes");
    let dispatcher = TaskDispatcher::new(TaskRegistry::with_defaults(), h.deps());

    assert_ok!(
        dispatcher
            .dispatch(
                "build_from_market_slug",
                &to_bytes(&slug_body("ev-d", src.to_str().unwrap()))
            )
            .await
    );
    assert_eq!(h.trigger.calls().len(), 1);
    assert!(h.slug_path("t1", "s1", "v1").exists());
}

#[tokio::test]
async fn test_event_log_released_after_dispatch() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    let src = h.write_source("a.tgz", b"slug-bytes");
    let dispatcher = TaskDispatcher::new(TaskRegistry::with_defaults(), h.deps());

    for n in 0..5 {
        let event_id = format!("ev-{}", n);
        assert_ok!(
            dispatcher
                .dispatch(
                    "build_from_market_slug",
                    &to_bytes(&slug_body(&event_id, src.to_str().unwrap()))
                )
                .await
        );
        assert!(h.events.entries(&event_id).is_empty());
    }

    // failed tasks are released too
    h.trigger.fail_calls();
    assert_err!(
        dispatcher
            .dispatch(
                "build_from_market_slug",
                &to_bytes(&slug_body("ev-failed", src.to_str().unwrap()))
            )
            .await
    );
    assert!(h.events.entries("ev-failed").is_empty());
}

#[tokio::test]
async fn test_registered_variant_is_dispatched() {
    let h = Harness::new();
    let mut registry = TaskRegistry::with_defaults();
    registry.register("echo", echo_factory);
    let dispatcher = TaskDispatcher::new(registry, h.deps());

    assert_ok!(dispatcher.dispatch("echo", b"hello").await);

    let entries = h.events.entries("echo");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "hello");
}

#[tokio::test]
async fn test_panic_is_isolated() {
    let h = Harness::new();
    let mut registry = TaskRegistry::with_defaults();
    registry
        .register("panicking", panicking_factory)
        .register("echo", echo_factory);
    let dispatcher = TaskDispatcher::new(registry, h.deps());

    let err = assert_err!(dispatcher.dispatch("panicking", b"{}").await);
    assert!(matches!(err, BuilderError::TaskPanicked(ref m) if m.contains("slug volume vanished")));

    // the dispatcher keeps working afterwards
    assert_ok!(dispatcher.dispatch("echo", b"still alive").await);
    assert_eq!(h.events.entries("echo")[0].message, "still alive");
}
