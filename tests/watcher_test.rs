//! Step watch: catch-up, live changes and stream termination

mod helpers;

use helpers::*;
use pipeline_controller::core::{Resource, Step, StepStatus, StepType};
use pipeline_controller::persistence::{CheckpointStore, InMemoryCheckpointStore, STEP_WATCH};
use pipeline_controller::store::WatchEvent;
use pipeline_controller::{Controller, ControllerError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_catch_up_dispatches_existing_steps() {
    let h = Harness::new();
    h.seed("p", &[("s1", &["a", "b"][..])], true).await;

    let ctl = h.controller.clone();
    let watch = tokio::spawn(async move { ctl.watch_steps().await });

    let h = &h;
    assert!(wait_until(|| async move { h.engine.submission_count() == 2 }).await);
    assert!(
        wait_until(|| async move {
            h.step("a").await.status() == StepStatus::Sending
                && h.step("b").await.status() == StepStatus::Sending
        })
        .await
    );

    // The Sending updates come back through the watch without a resubmit
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.engine.submission_count(), 2);

    watch.abort();
}

#[tokio::test]
async fn test_new_steps_are_picked_up_live() {
    let h = Harness::new();
    h.seed("p", &[("s1", &["a"][..])], false).await;

    let ctl = h.controller.clone();
    let watch = tokio::spawn(async move { ctl.watch_steps().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.engine.submission_count(), 0);

    // Triggering the waiting step is a change like any other
    let mut step = h.step("a").await;
    step.spec.trigger = true;
    h.resources().apply(&step).await.unwrap();

    let h = &h;
    assert!(wait_until(|| async move { h.engine.submission_count() == 1 }).await);
    assert_eq!(h.engine.submissions()[0].steps[0].name, "CI_a");

    watch.abort();
}

#[tokio::test]
async fn test_heartbeats_and_garbage_are_skipped() {
    let h = Harness::new();

    assert_eq!(h.controller.handle_watch_event(WatchEvent::heartbeat()), None);

    let garbage = WatchEvent {
        uuid: "x".to_string(),
        object: serde_json::json!({"metadata": {"uuid": "x"}, "spec": "nope"}),
    };
    assert_eq!(h.controller.handle_watch_event(garbage), None);

    let step = h
        .resources()
        .apply(&Step::new("y", "s", StepType::Ci))
        .await
        .unwrap();
    let event = WatchEvent {
        uuid: "y".to_string(),
        object: serde_json::to_value(&step).unwrap(),
    };
    assert_eq!(h.controller.handle_watch_event(event), Some(step.version()));
}

#[tokio::test]
async fn test_closed_watch_ends_the_loop() {
    let h = Harness::new();
    h.seed("p", &[("s1", &["a"][..])], false).await;

    let ctl = h.controller.clone();
    let watch = tokio::spawn(async move { ctl.watch_steps().await });

    // Keep closing until the subscription has been made and dropped
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while !watch.is_finished() {
            h.store.close_watches().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(closed.is_ok());

    let result = watch.await.unwrap();
    assert!(matches!(result, Err(ControllerError::StreamClosed("step watch"))));
}

#[tokio::test]
async fn test_restart_does_not_resubmit_or_rewrite() {
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let mut h = Harness::new();
    h.controller = h.controller.clone().with_checkpoints(checkpoints.clone());
    h.seed("p", &[("s1", &["a", "b"][..])], true).await;

    let ctl = h.controller.clone();
    let first = tokio::spawn(async move { ctl.watch_steps().await });
    {
        let h = &h;
        assert!(
            wait_until(|| async move {
                h.step("a").await.status() == StepStatus::Sending
                    && h.step("b").await.status() == StepStatus::Sending
            })
            .await
        );
    }
    h.set_status("a", StepStatus::Finish).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.abort();
    let _ = first.await;

    // A checkpoint ahead of every stored version: the store was rewound
    checkpoints.save(STEP_WATCH, 10_000).await.unwrap();
    let submitted = h.engine.submission_count();
    let revision = h.store.revision().await;

    let restarted = Controller::new(test_config(), h.store.clone(), h.engine.clone())
        .with_checkpoints(checkpoints.clone());
    let second = tokio::spawn(async move { restarted.watch_steps().await });

    // The resume point falls back to the newest stored step
    let cp = &checkpoints;
    assert!(
        wait_until(|| async move { cp.load(STEP_WATCH).await.unwrap() == Some(revision) }).await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.engine.submission_count(), submitted);
    assert_eq!(h.store.revision().await, revision);
    assert_status(&h.step("a").await, StepStatus::Finish);
    assert_status(&h.step("b").await, StepStatus::Sending);

    second.abort();
}
