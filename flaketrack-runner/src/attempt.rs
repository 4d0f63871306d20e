// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The attempt model: per-phase results and the ordered history of attempts
//! for each test.

use crate::test_id::TestCaseId;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A phase of one test execution.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    /// Fixture/resource setup.
    Setup,

    /// The test body itself.
    Call,

    /// Fixture/resource teardown.
    Teardown,
}

impl TestPhase {
    /// Returns the phase name as used in report output.
    pub fn as_str(self) -> &'static str {
        match self {
            TestPhase::Setup => "setup",
            TestPhase::Call => "call",
            TestPhase::Teardown => "teardown",
        }
    }
}

/// The outcome of a single phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// The phase completed successfully.
    Passed,

    /// The phase raised a failure.
    Failed,

    /// The phase was skipped.
    Skipped,
}

/// The result of one phase of one attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// The phase outcome.
    pub outcome: PhaseOutcome,

    /// When the phase started.
    pub start_time: DateTime<Utc>,

    /// When the phase ended.
    pub end_time: DateTime<Utc>,
}

impl PhaseResult {
    /// Wall-clock duration of the phase, in microseconds.
    pub fn duration_micros(&self) -> i64 {
        (self.end_time - self.start_time)
            .num_microseconds()
            .unwrap_or(i64::MAX)
    }
}

/// A phase result as delivered by the host runner, including the phase it
/// belongs to.
///
/// `expected_failure` marks a skipped call phase that stands for an expected
/// failure (the host's `xfail`-style mechanism); a recovery through such a
/// phase counts toward flakiness the same way a plain pass does.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseExecution {
    /// Which phase this result is for.
    pub phase: TestPhase,

    /// The phase outcome.
    pub outcome: PhaseOutcome,

    /// True if a skipped outcome stands for an expected failure.
    pub expected_failure: bool,

    /// When the phase started.
    pub start_time: DateTime<Utc>,

    /// When the phase ended.
    pub end_time: DateTime<Utc>,
}

impl PhaseExecution {
    /// The stored form of this phase result.
    pub fn result(&self) -> PhaseResult {
        PhaseResult {
            outcome: self.outcome,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// One full execution of a test: at most one result per phase.
///
/// An attempt opens when a setup phase result arrives and accumulates call
/// and teardown results as they complete.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    setup: Option<PhaseResult>,
    call: Option<PhaseResult>,
    teardown: Option<PhaseResult>,
}

impl Attempt {
    /// Returns the result recorded for `phase`, if any.
    pub fn phase(&self, phase: TestPhase) -> Option<&PhaseResult> {
        match phase {
            TestPhase::Setup => self.setup.as_ref(),
            TestPhase::Call => self.call.as_ref(),
            TestPhase::Teardown => self.teardown.as_ref(),
        }
    }

    fn set_phase(&mut self, phase: TestPhase, result: PhaseResult) {
        match phase {
            TestPhase::Setup => self.setup = Some(result),
            TestPhase::Call => self.call = Some(result),
            TestPhase::Teardown => self.teardown = Some(result),
        }
    }

    /// Iterates over the phases present in this attempt, in phase order.
    pub fn phases(&self) -> impl Iterator<Item = (TestPhase, &PhaseResult)> {
        [
            (TestPhase::Setup, self.setup.as_ref()),
            (TestPhase::Call, self.call.as_ref()),
            (TestPhase::Teardown, self.teardown.as_ref()),
        ]
        .into_iter()
        .filter_map(|(phase, result)| result.map(|result| (phase, result)))
    }

    /// True if any present phase failed.
    pub fn has_failure(&self) -> bool {
        self.phases()
            .any(|(_, result)| result.outcome == PhaseOutcome::Failed)
    }

    /// True if every present phase was skipped.
    pub fn all_skipped(&self) -> bool {
        let mut any = false;
        for (_, result) in self.phases() {
            if result.outcome != PhaseOutcome::Skipped {
                return false;
            }
            any = true;
        }
        any
    }

    /// True if the setup or call phase actually ran to a pass. Attempts where
    /// nothing beyond teardown bookkeeping succeeded are not reportable.
    pub fn executed_to_pass(&self) -> bool {
        self.setup
            .is_some_and(|result| result.outcome == PhaseOutcome::Passed)
            || self
                .call
                .is_some_and(|result| result.outcome == PhaseOutcome::Passed)
    }

    /// The attempt's start time: setup, or the first phase present.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.phases().next().map(|(_, result)| result.start_time)
    }

    /// The attempt's end time: teardown, else call, else setup.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.phases().last().map(|(_, result)| result.end_time)
    }

    /// Total time spent in the attempt's phases, in microseconds.
    pub fn duration_micros(&self) -> i64 {
        self.phases()
            .map(|(_, result)| result.duration_micros())
            .sum()
    }
}

/// Per-test, insertion-ordered attempt histories for a run.
///
/// Each process owns exactly one history map for its lifetime; cross-process
/// merging happens by replaying phase results through the controller's
/// tracker, never by sharing state.
#[derive(Clone, Debug, Default)]
pub struct AttemptHistory {
    entries: IndexMap<TestCaseId, Vec<Attempt>>,
}

impl AttemptHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a phase result for `test`, returning the 0-based index of the
    /// attempt it landed in.
    ///
    /// A setup result opens a new attempt. Call and teardown results land in
    /// the test's latest attempt; they are dropped (returning `None`) if no
    /// attempt is open, which can happen when the host reports phases for
    /// tests the tracker never saw a setup for.
    pub fn record(&mut self, test: &TestCaseId, execution: &PhaseExecution) -> Option<usize> {
        match execution.phase {
            TestPhase::Setup => {
                let attempts = self.entries.entry(test.clone()).or_default();
                let mut attempt = Attempt::default();
                attempt.set_phase(TestPhase::Setup, execution.result());
                attempts.push(attempt);
                Some(attempts.len() - 1)
            }
            phase => match self.entries.get_mut(test).filter(|a| !a.is_empty()) {
                Some(attempts) => {
                    let index = attempts.len() - 1;
                    attempts[index].set_phase(phase, execution.result());
                    Some(index)
                }
                None => {
                    debug!(
                        test = %test,
                        phase = phase.as_str(),
                        "dropping phase result with no open attempt"
                    );
                    None
                }
            },
        }
    }

    /// Returns all attempts recorded for `test`.
    pub fn attempts(&self, test: &TestCaseId) -> Option<&[Attempt]> {
        self.entries.get(test).map(Vec::as_slice)
    }

    /// Iterates over all tests and their attempts, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&TestCaseId, &[Attempt])> {
        self.entries
            .iter()
            .map(|(test, attempts)| (test, attempts.as_slice()))
    }

    /// The number of tests with at least one recorded attempt.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no attempts have been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
