//! Test orchestration.
//!
//! Every test program runs against every resolved device, test-major and
//! device-minor, one invocation at a time:
//!
//! ```text
//! for program in programs
//!     for device in resolved (declaration order)
//!         <program> --device <connection> --baudrate <speed> --pin <credential>
//! ```
//!
//! Failures are recorded and the run carries on; only the final
//! [`RunSummary`] decides whether the suite passed.

pub mod process;

pub use process::ProcessExecutor;

use crate::device::{MissingDevice, ResolvedDevice};
use crate::reconcile::Reconciliation;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// One test program run against one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub device: ResolvedDevice,
}

impl Invocation {
    pub fn new(program: impl Into<String>, device: ResolvedDevice) -> Self {
        Self {
            program: program.into(),
            device,
        }
    }

    /// Arguments passed after the program path.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--device".to_string(),
            self.device.connection.clone(),
            "--baudrate".to_string(),
            self.device.speed.clone(),
            "--pin".to_string(),
            self.device.credential.clone(),
        ]
    }

    /// The full command line, for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What happened when an invocation ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub program: String,
    /// Declared name of the device under test.
    pub device: String,
    pub command: String,
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    /// stdout and stderr, interleaved in arrival order.
    pub output: Vec<u8>,
    pub timed_out: bool,
    /// Set when the program could not be started at all.
    pub launch_error: Option<String>,
    pub duration: Duration,
}

impl TestOutcome {
    /// Outcome for a program that could not be started.
    pub fn launch_failed(invocation: &Invocation, error: &RunnerError, duration: Duration) -> Self {
        Self {
            program: invocation.program.clone(),
            device: invocation.device.name.clone(),
            command: invocation.command_line(),
            exit_code: None,
            output: Vec::new(),
            timed_out: false,
            launch_error: Some(error.to_string()),
            duration,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.launch_error.is_none() && self.exit_code == Some(0)
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Runs a single invocation to completion.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<TestOutcome, RunnerError>;
}

/// Progress callbacks, e.g. for printing a live transcript.
pub trait RunObserver {
    fn on_start(&mut self, _invocation: &Invocation) {}

    fn on_finish(&mut self, _outcome: &TestOutcome) {}
}

impl RunObserver for () {}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<TestOutcome>,
    pub missing: Vec<MissingDevice>,
}

impl RunSummary {
    /// True only if every invocation passed and no declared device is missing.
    pub fn success(&self) -> bool {
        self.missing.is_empty() && self.outcomes.iter().all(TestOutcome::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.succeeded())
    }

    /// Process exit code for this run: 0 on full success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

/// Drives the test × device cross product through an executor.
pub struct Orchestrator<E> {
    executor: E,
}

impl<E: TestExecutor> Orchestrator<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Invocations in execution order.
    pub fn plan(programs: &[String], devices: &[ResolvedDevice]) -> Vec<Invocation> {
        programs
            .iter()
            .flat_map(|program| {
                devices
                    .iter()
                    .map(move |device| Invocation::new(program.clone(), device.clone()))
            })
            .collect()
    }

    /// Run every program against every resolved device.
    pub async fn run(
        &self,
        programs: &[String],
        reconciliation: &Reconciliation,
        observer: &mut dyn RunObserver,
    ) -> RunSummary {
        let plan = Self::plan(programs, &reconciliation.resolved);
        info!(
            programs = programs.len(),
            devices = reconciliation.resolved.len(),
            invocations = plan.len(),
            "Starting test run"
        );

        let mut outcomes = Vec::with_capacity(plan.len());
        for invocation in &plan {
            observer.on_start(invocation);

            let started = Instant::now();
            let outcome = match self.executor.execute(invocation).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(command = %invocation.command_line(), "{e}");
                    TestOutcome::launch_failed(invocation, &e, started.elapsed())
                }
            };

            if !outcome.succeeded() {
                warn!(
                    program = %outcome.program,
                    device = %outcome.device,
                    exit_code = ?outcome.exit_code,
                    timed_out = outcome.timed_out,
                    "Test failed"
                );
            }

            observer.on_finish(&outcome);
            outcomes.push(outcome);
        }

        RunSummary {
            outcomes,
            missing: reconciliation.missing.clone(),
        }
    }
}
