//! E2E tests for the subprocess executor.
//!
//! Each test writes a small shell script and runs it through
//! `ProcessExecutor`. They are serialized so a script is never exec'd while
//! another test still holds a file open for writing.

use crate::common::write_script;
use modem_testbench::device::ResolvedDevice;
use modem_testbench::reconcile::Reconciliation;
use modem_testbench::runner::{Invocation, Orchestrator, ProcessExecutor, TestExecutor};
use serial_test::serial;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn device() -> ResolvedDevice {
    ResolvedDevice {
        name: "lte".into(),
        connection: "/dev/ttyUSB2".into(),
        speed: "115200".into(),
        credential: "0000".into(),
    }
}

fn executor(timeout: Duration) -> ProcessExecutor {
    ProcessExecutor::new(timeout, Duration::from_millis(500))
}

#[tokio::test]
#[serial]
async fn test_passing_program_receives_device_arguments() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "args.sh", "echo \"$@\"\nexit 0\n");

    let outcome = executor(Duration::from_secs(10))
        .execute(&Invocation::new(script, device()))
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(
        outcome.output_lossy(),
        "--device /dev/ttyUSB2 --baudrate 115200 --pin 0000\n"
    );
}

#[tokio::test]
#[serial]
async fn test_nonzero_exit_is_a_failure() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "fail.sh", "echo failing\nexit 2\n");

    let outcome = executor(Duration::from_secs(10))
        .execute(&Invocation::new(script, device()))
        .await
        .unwrap();

    assert!(!outcome.succeeded());
    assert!(!outcome.timed_out);
    assert_eq!(outcome.exit_code, Some(2));
    assert_eq!(outcome.output_lossy(), "failing\n");
}

#[tokio::test]
#[serial]
async fn test_stderr_is_merged_into_output() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "streams.sh",
        "echo to-stdout\nsleep 0.2\necho to-stderr >&2\n",
    );

    let outcome = executor(Duration::from_secs(10))
        .execute(&Invocation::new(script, device()))
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.output_lossy(), "to-stdout\nto-stderr\n");
}

#[tokio::test]
#[serial]
async fn test_timeout_kills_program_and_keeps_partial_output() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "hang.sh", "echo partial\nsleep 30\n");

    let started = Instant::now();
    let outcome = executor(Duration::from_secs(1))
        .execute(&Invocation::new(script, device()))
        .await
        .unwrap();

    assert!(outcome.timed_out);
    assert!(!outcome.succeeded());
    assert_eq!(outcome.output_lossy(), "partial\n");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
#[serial]
async fn test_timeout_reaches_background_children() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("child.pid");
    let body = format!("sleep 30 &\necho $! > {}\nsleep 30\n", pid_file.display());
    let script = write_script(dir.path(), "spawner.sh", &body);

    let started = Instant::now();
    let outcome = executor(Duration::from_secs(1))
        .execute(&Invocation::new(script, device()))
        .await
        .unwrap();

    assert!(outcome.timed_out);
    assert!(started.elapsed() < Duration::from_secs(10));

    let child: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    // Reparenting and reaping happen outside our control, so allow a moment.
    let settle = Instant::now();
    while process_alive(child) && settle.elapsed() < Duration::from_secs(3) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!process_alive(child), "background child {child} survived the timeout");
}

/// True while `pid` exists and is not a zombie.
fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

#[tokio::test]
#[serial]
async fn test_orchestrated_run_with_real_programs() {
    let dir = TempDir::new().unwrap();
    let pass = write_script(dir.path(), "pass.sh", "exit 0\n");
    let fail = write_script(dir.path(), "fail.sh", "exit 2\n");
    let missing = dir.path().join("absent.sh").to_string_lossy().into_owned();

    let reconciliation = Reconciliation {
        resolved: vec![device()],
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(executor(Duration::from_secs(10)));
    let summary = orchestrator
        .run(&[pass, fail, missing], &reconciliation, &mut ())
        .await;

    let exit_codes: Vec<_> = summary.outcomes.iter().map(|o| o.exit_code).collect();
    assert_eq!(exit_codes, vec![Some(0), Some(2), None]);
    assert!(summary.outcomes[2].launch_error.is_some());
    assert_eq!(summary.exit_code(), 1);
}
