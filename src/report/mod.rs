//! Pass/fail bookkeeping and the printed report.
//!
//! A scenario is wholly pass or wholly fail; the only thing that crosses
//! the process boundary is the exit status and the printed lines.


use std::io;
use std::io::Write;
use std::time::Duration;

use tracing::error;
use tracing::info;

use crate::Error;
use crate::Phase;
use crate::TeardownSummary;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub check: String,
    pub passed: bool,
    pub detail: String,
}

/// Why a scenario stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort {
    /// `None` when the scenario was rejected before it started
    pub phase: Option<Phase>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub run_id: String,
    pub scenario: String,
    pub outcomes: Vec<CheckOutcome>,
    pub events: Vec<String>,
    pub abort: Option<Abort>,
    pub phases: Vec<Phase>,
    pub teardown: TeardownSummary,
    pub elapsed: Duration,
}

impl ScenarioReport {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            run_id: nanoid::nanoid!(8),
            scenario: scenario.into(),
            outcomes: Vec::new(),
            events: Vec::new(),
            abort: None,
            phases: Vec::new(),
            teardown: TeardownSummary::default(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn pass(
        &mut self,
        check: &str,
        detail: impl Into<String>,
    ) {
        let detail = detail.into();
        info!("[{}] PASS {}: {}", self.scenario, check, detail);
        self.outcomes.push(CheckOutcome {
            check: check.to_string(),
            passed: true,
            detail,
        });
    }

    pub fn event(
        &mut self,
        event: impl Into<String>,
    ) {
        let event = event.into();
        info!("[{}] {}", self.scenario, event);
        self.events.push(event);
    }

    /// Records the error that ended the scenario. A failed assertion also
    /// shows up as a failed check.
    pub fn abort(
        &mut self,
        phase: Option<Phase>,
        err: &Error,
    ) {
        error!("[{}] aborted in {:?}: {}", self.scenario, phase, err);
        if let Error::Assertion(failure) = err {
            self.outcomes.push(CheckOutcome {
                check: failure.check.to_string(),
                passed: false,
                detail: failure.to_string(),
            });
        }
        self.abort = Some(Abort {
            phase,
            error: err.to_string(),
        });
    }

    pub fn finish(
        &mut self,
        phases: &[Phase],
        teardown: TeardownSummary,
        elapsed: Duration,
    ) {
        self.phases = phases.to_vec();
        self.teardown = teardown;
        self.elapsed = elapsed;
    }

    pub fn passed(&self) -> bool {
        self.abort.is_none() && self.outcomes.iter().all(|o| o.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }
}

/// Prints one block per scenario report.
pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn print(
        &mut self,
        report: &ScenarioReport,
    ) -> io::Result<()> {
        writeln!(self.out, "== {} (run {})", report.scenario, report.run_id)?;
        for outcome in &report.outcomes {
            let verdict = if outcome.passed { "PASS" } else { "FAIL" };
            writeln!(self.out, "  {} {}: {}", verdict, outcome.check, outcome.detail)?;
        }
        for warning in &report.teardown.warnings {
            writeln!(self.out, "  warning: {warning}")?;
        }
        match &report.abort {
            None if report.passed() => writeln!(self.out, "Test successful.")?,
            None => writeln!(self.out, "Test failed.")?,
            Some(abort) => match abort.phase {
                Some(phase) => writeln!(self.out, "Test failed in {:?}: {}", phase, abort.error)?,
                None => writeln!(self.out, "Test failed before start: {}", abort.error)?,
            },
        }
        writeln!(
            self.out,
            "  {} checks, {} nodes terminated, {:.1}s",
            report.outcomes.len(),
            report.teardown.terminated,
            report.elapsed.as_secs_f64()
        )?;
        self.out.flush()
    }
}

/// 0 when every report passed, 1 otherwise (also for no reports)
pub fn suite_exit_code(reports: &[ScenarioReport]) -> i32 {
    if !reports.is_empty() && reports.iter().all(ScenarioReport::passed) {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
