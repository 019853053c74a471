//! Integration tests for the controller facade.
//!
//! Lifecycle, deployment and dispatch are exercised through [`Controller`]
//! with the wasm executor where guest behavior matters, and with a scripted
//! executor where the test needs deferred, panicking or hanging functions.

mod common;

use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use emulator_common::EmulatorError;
use emulator_controller::{
    Controller, EmulatorState, FailureKind, InvocationOutcome, TriggerSpec,
    UNCAUGHT_EXCEPTION_MARKER,
};

use common::{scripted_controller, wasm_controller, write_guest};

async fn running_wasm() -> (Controller, TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = write_guest(&dir);
    let controller = wasm_controller();
    controller.start("demo", false, true).await.unwrap();
    (controller, dir, path)
}

fn result(outcome: InvocationOutcome) -> Value {
    match outcome {
        InvocationOutcome::Success(value) => value,
        InvocationOutcome::Failure(failure) => panic!("invocation failed: {failure}"),
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_lifecycle_transitions() {
    let controller = scripted_controller();
    assert_eq!(controller.status().await, EmulatorState::Stopped);

    assert_ok!(controller.start("demo", false, true).await);
    assert_eq!(controller.status().await, EmulatorState::Running);

    let err = controller.start("demo", false, true).await.unwrap_err();
    assert!(matches!(err, EmulatorError::AlreadyRunning));
    assert_eq!(controller.status().await, EmulatorState::Running);

    assert_ok!(controller.restart().await);
    assert_eq!(controller.status().await, EmulatorState::Running);

    assert_ok!(controller.stop().await);
    assert_eq!(controller.status().await, EmulatorState::Stopped);

    let err = controller.stop().await.unwrap_err();
    assert!(matches!(err, EmulatorError::NotRunning));
}

#[tokio::test]
async fn test_restart_from_stopped_starts() {
    let controller = scripted_controller();
    assert_ok!(controller.restart().await);
    assert_eq!(controller.status().await, EmulatorState::Running);
    assert_ok!(controller.stop().await);
}

#[tokio::test]
async fn test_cold_start_resets_registry_but_restart_keeps_it() {
    let controller = scripted_controller();
    controller.start("demo", false, true).await.unwrap();
    controller
        .deploy("/fn/echo.js", "echo", &TriggerSpec::http())
        .await
        .unwrap();
    let url_before = controller.list().await.unwrap()["echo"]
        .endpoint()
        .cloned();

    controller.restart().await.unwrap();
    let listed = controller.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed["echo"].endpoint().cloned(), url_before);

    controller.stop().await.unwrap();
    controller.start("demo", false, true).await.unwrap();
    assert!(controller.list().await.unwrap().is_empty());
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_operations_require_running() {
    let controller = scripted_controller();

    let err = controller
        .deploy("/fn/echo.js", "echo", &TriggerSpec::http())
        .await
        .unwrap_err();
    assert!(matches!(err, EmulatorError::NotRunning));
    assert!(matches!(
        controller.call("echo", json!({})).await,
        Err(EmulatorError::NotRunning)
    ));
    assert!(matches!(
        controller.undeploy("echo").await,
        Err(EmulatorError::NotRunning)
    ));
    assert!(matches!(
        controller.list().await,
        Err(EmulatorError::NotRunning)
    ));

    // Clearing is valid in any state.
    assert_ok!(controller.clear().await);
}

#[tokio::test]
async fn test_stopped_registry_is_inert_until_restart() {
    let controller = scripted_controller();
    controller.start("demo", false, true).await.unwrap();
    controller
        .deploy("/fn/echo.js", "echo", &TriggerSpec::http())
        .await
        .unwrap();
    controller.stop().await.unwrap();

    assert_err!(controller.call("echo", json!(1)).await);

    controller.restart().await.unwrap();
    let outcome = controller.call("echo", json!(1)).await.unwrap();
    assert_eq!(result(outcome), json!(1));
    controller.stop().await.unwrap();
}

// ============================================================================
// Deployment
// ============================================================================

#[tokio::test]
async fn test_deploy_and_list() {
    let (controller, _dir, path) = running_wasm().await;

    controller
        .deploy(&path, "echo", &TriggerSpec::http())
        .await
        .unwrap();
    controller
        .deploy(&path, "ping", &TriggerSpec::background())
        .await
        .unwrap();
    controller
        .deploy(&path, "greet", &TriggerSpec::storage("uploads"))
        .await
        .unwrap();

    let listed = controller.list().await.unwrap();
    assert_eq!(listed.len(), 3);

    let addr = controller.local_addr().unwrap();
    let echo = serde_json::to_value(&listed["echo"]).unwrap();
    assert_eq!(echo["name"], "echo");
    assert_eq!(echo["type"], "http");
    assert_eq!(echo["path"], path.display().to_string());
    assert_eq!(
        echo["url"],
        format!("http://{addr}/demo/us-central1/echo")
    );

    let ping = serde_json::to_value(&listed["ping"]).unwrap();
    assert_eq!(ping["type"], "background");
    assert_eq!(ping["url"], Value::Null);

    let greet = serde_json::to_value(&listed["greet"]).unwrap();
    assert_eq!(greet["type"], "storage");
    assert_eq!(greet["url"], Value::Null);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_redeploy_replaces() {
    let (controller, _dir, path) = running_wasm().await;

    controller
        .deploy(&path, "echo", &TriggerSpec::http())
        .await
        .unwrap();
    controller
        .deploy(&path, "echo", &TriggerSpec::pubsub("topic"))
        .await
        .unwrap();

    let listed = controller.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed["echo"].endpoint().is_none());

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_deploy_failures_leave_registry_untouched() {
    let (controller, dir, path) = running_wasm().await;
    controller
        .deploy(&path, "echo", &TriggerSpec::http())
        .await
        .unwrap();

    let missing = dir.path().join("missing.wasm");
    let err = controller
        .deploy(&missing, "echo", &TriggerSpec::http())
        .await
        .unwrap_err();
    assert!(matches!(err, EmulatorError::ModuleNotFound { .. }));

    let err = controller
        .deploy(&path, "nope", &TriggerSpec::http())
        .await
        .unwrap_err();
    assert!(matches!(err, EmulatorError::FunctionNotFound { ref name } if name == "nope"));

    let err = controller
        .deploy(&path, "alloc", &TriggerSpec::http())
        .await
        .unwrap_err();
    assert!(matches!(err, EmulatorError::InvalidFunction { .. }));

    let err = controller
        .deploy(&path, "echo", &TriggerSpec::tagged("carrier-pigeon"))
        .await
        .unwrap_err();
    assert!(matches!(err, EmulatorError::InvalidTrigger { .. }));

    let listed = controller.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed["echo"].trigger().is_http());

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_undeploy_and_clear() {
    let (controller, _dir, path) = running_wasm().await;

    controller
        .deploy(&path, "echo", &TriggerSpec::http())
        .await
        .unwrap();
    assert_ok!(controller.undeploy("echo").await);
    assert!(controller.list().await.unwrap().is_empty());
    // Idempotent.
    assert_ok!(controller.undeploy("echo").await);

    controller
        .deploy(&path, "echo", &TriggerSpec::http())
        .await
        .unwrap();
    controller
        .deploy(&path, "greet", &TriggerSpec::http())
        .await
        .unwrap();
    assert_ok!(controller.clear().await);
    assert!(controller.list().await.unwrap().is_empty());
    assert_eq!(controller.status().await, EmulatorState::Running);
    assert_ok!(controller.clear().await);

    controller.stop().await.unwrap();
}

// ============================================================================
// Invocation
// ============================================================================

#[tokio::test]
async fn test_call_returns_function_result() {
    let (controller, _dir, path) = running_wasm().await;
    controller
        .deploy(&path, "echo", &TriggerSpec::http())
        .await
        .unwrap();
    controller
        .deploy(&path, "greet", &TriggerSpec::http())
        .await
        .unwrap();
    controller
        .deploy(&path, "ping", &TriggerSpec::background())
        .await
        .unwrap();

    let data = json!({"message": "hi", "n": 3});
    let outcome = controller.call("echo", data.clone()).await.unwrap();
    assert_eq!(result(outcome), data);

    let outcome = controller.call("greet", Value::Null).await.unwrap();
    assert_eq!(result(outcome), json!("hello"));

    let outcome = controller.call("ping", json!({})).await.unwrap();
    assert_eq!(result(outcome), Value::Null);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_encoded_string_payload_matches_structured() {
    let (controller, _dir, path) = running_wasm().await;
    controller
        .deploy(&path, "echo", &TriggerSpec::http())
        .await
        .unwrap();

    let structured = controller
        .call("echo", json!({"message": "hi"}))
        .await
        .unwrap();
    let encoded = controller
        .call("echo", json!(r#"{"message": "hi"}"#))
        .await
        .unwrap();
    assert_eq!(structured, encoded);

    // Malformed text is passed through, not rejected.
    let outcome = controller.call("echo", json!("{not json")).await.unwrap();
    assert_eq!(result(outcome), json!("{not json"));

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_storage_event_fields_nested_under_data() {
    let (controller, _dir, path) = running_wasm().await;
    controller
        .deploy(&path, "echo", &TriggerSpec::storage("uploads"))
        .await
        .unwrap();

    let outcome = controller
        .call("echo", json!({"event": true, "name": "cat.png"}))
        .await
        .unwrap();
    let event = result(outcome);

    assert_eq!(event["eventType"], "google.storage.object.finalize");
    assert_eq!(event["resource"], "uploads");
    assert_eq!(
        event["data"],
        json!({"name": "cat.png", "resourceState": "exists"})
    );

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_trapping_function_does_not_stop_emulator() {
    let (controller, _dir, path) = running_wasm().await;
    controller
        .deploy(&path, "boom", &TriggerSpec::http())
        .await
        .unwrap();

    let outcome = controller.call("boom", json!({})).await.unwrap();
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Exception);
    assert!(failure.message.contains(UNCAUGHT_EXCEPTION_MARKER));
    assert_eq!(controller.status().await, EmulatorState::Running);

    let err = controller.call("absent", json!({})).await.unwrap_err();
    assert!(matches!(err, EmulatorError::FunctionNotFound { .. }));

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_scripted_failures_are_outcomes() {
    let controller = scripted_controller();
    controller.start("demo", false, true).await.unwrap();

    for name in ["throw", "reject", "panic", "hang"] {
        controller
            .deploy("/fn/index.js", name, &TriggerSpec::http())
            .await
            .unwrap();
    }

    for name in ["throw", "reject"] {
        let outcome = controller.call(name, json!({})).await.unwrap();
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Exception, "{name}");
        assert!(failure.is_uncaught_exception(), "{name}");
    }

    let outcome = controller.call("panic", json!({})).await.unwrap();
    assert_eq!(outcome.failure().unwrap().kind, FailureKind::Panicked);

    let outcome = controller.call("hang", json!({})).await.unwrap();
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(!failure.is_uncaught_exception());

    assert_eq!(controller.status().await, EmulatorState::Running);
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_deferred_result_is_awaited() {
    let controller = scripted_controller();
    controller.start("demo", false, true).await.unwrap();
    controller
        .deploy("/fn/index.js", "slow", &TriggerSpec::background())
        .await
        .unwrap();

    let outcome = controller.call("slow", json!([1, 2])).await.unwrap();
    assert_eq!(result(outcome), json!([1, 2]));

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_call_discarded_on_stop() {
    let controller = scripted_controller();
    controller.start("demo", false, true).await.unwrap();
    controller
        .deploy("/fn/index.js", "slow", &TriggerSpec::http())
        .await
        .unwrap();

    let caller = controller.clone();
    let call = tokio::spawn(async move { caller.call("slow", json!(1)).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.stop().await.unwrap();
    // A new session started while the call is in flight does not revive it.
    controller.restart().await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, EmulatorError::NotRunning));
    assert_eq!(controller.status().await, EmulatorState::Running);
    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deploy_and_call() {
    let controller = scripted_controller();
    controller.start("demo", false, true).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let controller = controller.clone();
        tasks.push(tokio::spawn(async move {
            controller
                .deploy(Path::new("/fn/index.js"), "echo", &TriggerSpec::http())
                .await
                .unwrap();
            controller.call("echo", json!(i)).await.unwrap()
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let outcome = task.await.unwrap();
        assert_eq!(result(outcome), json!(i));
    }

    assert_eq!(controller.list().await.unwrap().len(), 1);
    controller.stop().await.unwrap();
}
