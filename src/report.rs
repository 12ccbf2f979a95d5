//! Run transcript and machine-readable report.
//!
//! The transcript goes to stdout; probe diagnostics go through `tracing`
//! to stderr so the two never interleave in a CI log capture.

use crate::device::{DiscoveredDevice, MissingDevice};
use crate::reconcile::Reconciliation;
use crate::runner::{Invocation, RunObserver, RunSummary, TestOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

/// Prints the banner transcript of a run.
pub struct ConsoleObserver<W> {
    out: W,
}

impl ConsoleObserver<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print the bindings chosen by the reconciler.
    pub fn print_bindings(&mut self, reconciliation: &Reconciliation) -> io::Result<()> {
        writeln!(self.out, "===== Devices =====")?;
        for device in &reconciliation.resolved {
            writeln!(
                self.out,
                " * {} -> {} (baudrate {})",
                device.name, device.connection, device.speed
            )?;
        }
        self.print_missing(&reconciliation.missing)
    }

    /// Print missing devices and the final verdict.
    pub fn print_summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        self.print_missing(&summary.missing)?;
        if summary.success() {
            writeln!(self.out, "\n===== Test suite succeeded =====")
        } else {
            writeln!(self.out, "\n===== Test suite failed =====")
        }
    }

    fn print_missing(&mut self, missing: &[MissingDevice]) -> io::Result<()> {
        if missing.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "\n===== Could not find the following modems =====")?;
        for device in missing {
            writeln!(self.out, " * {device}")?;
        }
        Ok(())
    }

    fn write_start(&mut self, invocation: &Invocation) -> io::Result<()> {
        writeln!(
            self.out,
            "\n\n===== Running test {} for {} =====",
            invocation.program, invocation.device.name
        )?;
        writeln!(self.out, "===== Command line: {} =====", invocation.command_line())?;
        self.out.flush()
    }

    fn write_finish(&mut self, outcome: &TestOutcome) -> io::Result<()> {
        if outcome.timed_out {
            writeln!(self.out, "===== Test timed out =====")?;
        }
        if let Some(error) = &outcome.launch_error {
            writeln!(self.out, "===== Could not start test: {error} =====")?;
        }
        writeln!(self.out, "===== Output =====")?;
        writeln!(self.out, "{}", outcome.output_lossy())?;

        if outcome.succeeded() {
            writeln!(self.out, "===== Test above succeeded =====")?;
        } else {
            match outcome.exit_code {
                Some(code) => writeln!(
                    self.out,
                    "===== Test above failed with exit code {code} ====="
                )?,
                None => writeln!(self.out, "===== Test above failed =====")?,
            }
        }
        self.out.flush()
    }
}

impl<W: Write> RunObserver for ConsoleObserver<W> {
    fn on_start(&mut self, invocation: &Invocation) {
        if let Err(e) = self.write_start(invocation) {
            tracing::warn!(error = %e, "Failed to write transcript");
        }
    }

    fn on_finish(&mut self, outcome: &TestOutcome) {
        if let Err(e) = self.write_finish(outcome) {
            tracing::warn!(error = %e, "Failed to write transcript");
        }
    }
}

/// One invocation as stored in the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationRecord {
    pub program: String,
    pub device: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub launch_error: Option<String>,
    pub duration_ms: u64,
    pub passed: bool,
    pub output: String,
}

impl From<&TestOutcome> for InvocationRecord {
    fn from(outcome: &TestOutcome) -> Self {
        Self {
            program: outcome.program.clone(),
            device: outcome.device.clone(),
            command: outcome.command.clone(),
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            launch_error: outcome.launch_error.clone(),
            duration_ms: outcome.duration.as_millis() as u64,
            passed: outcome.succeeded(),
            output: outcome.output_lossy(),
        }
    }
}

/// Machine-readable result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub invocations: Vec<InvocationRecord>,
    pub missing: Vec<MissingDevice>,
    pub unclaimed: Vec<DiscoveredDevice>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        summary: &RunSummary,
        unclaimed: &[DiscoveredDevice],
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            success: summary.success(),
            invocations: summary.outcomes.iter().map(InvocationRecord::from).collect(),
            missing: summary.missing.clone(),
            unclaimed: unclaimed.to_vec(),
        }
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}
