#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use appforge::exec::{BuildLog, CancelFlag, ExecError, Orchestrator};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(BuildLog::new(), CancelFlag::new())
}

#[tokio::test]
async fn captures_combined_output_and_exit_code() {
    let orchestrator = orchestrator();
    let result = orchestrator
        .run(
            Path::new("."),
            &HashMap::new(),
            &sh("echo out-line; echo err-line >&2"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(result.success());
    assert!(result.output.contains("out-line"));
    assert!(result.output.contains("err-line"));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn nonzero_exit_is_a_result_not_an_error() {
    let orchestrator = orchestrator();
    let result = orchestrator
        .run(Path::new("."), &HashMap::new(), &sh("exit 3"), None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 3);
    assert!(!result.success());
}

#[tokio::test]
async fn watchdog_kills_overrunning_process() {
    let orchestrator = orchestrator();
    let started = Instant::now();
    let result = orchestrator
        .run(
            Path::new("."),
            &HashMap::new(),
            &sh("sleep 30"),
            Some(Duration::from_millis(400)),
        )
        .await
        .unwrap();
    assert!(result.timed_out);
    assert!(!result.success());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn spawn_failure_is_distinct_from_nonzero_exit() {
    let orchestrator = orchestrator();
    let result = orchestrator
        .run(
            Path::new("."),
            &HashMap::new(),
            &["definitely-not-a-real-binary-7b3f".to_string()],
            None,
        )
        .await;
    assert!(matches!(result, Err(ExecError::Spawn { .. })));
}

#[tokio::test]
async fn pre_cancelled_flag_blocks_subprocess_launch() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let orchestrator = Orchestrator::new(BuildLog::new(), cancel);
    let result = orchestrator
        .run(Path::new("."), &HashMap::new(), &sh("echo hi"), None)
        .await;
    assert!(matches!(result, Err(ExecError::Cancelled { .. })));
}

#[tokio::test]
async fn caller_env_overrides_defaults() {
    let mut orchestrator = orchestrator();
    orchestrator.set_default_env("APPFORGE_TEST_VALUE", "base");
    let mut env = HashMap::new();
    env.insert("APPFORGE_TEST_VALUE".to_string(), "override".to_string());
    let output = orchestrator
        .run_capturing_output(
            Path::new("."),
            &env,
            &sh("echo value=$APPFORGE_TEST_VALUE"),
            None,
        )
        .await
        .unwrap();
    assert!(output.contains("value=override"));
}

#[tokio::test]
async fn output_lands_in_the_shared_build_log() {
    let log = BuildLog::new();
    let orchestrator = Orchestrator::new(log.clone(), CancelFlag::new());
    orchestrator
        .run(
            Path::new("."),
            &HashMap::new(),
            &sh("echo logged-line"),
            None,
        )
        .await
        .unwrap();
    assert!(log.contents().contains("logged-line"));
}
