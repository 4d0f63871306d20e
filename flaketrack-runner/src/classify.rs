// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The outcome classifier: maps phase-level results plus quarantine and retry
//! context to a display category.
//!
//! Classification is incremental. A failing attempt that still has retries
//! left is *deferred*: the test might yet recover, so no category is counted
//! for it until its outcome is final. The companion shadow-notification
//! mechanism (see [`Notification`]) keeps host-level failure logging intact
//! while the counted category says something other than "failed".

use crate::{
    attempt::{PhaseOutcome, TestPhase},
    test_id::TestCaseId,
};

/// The counted category for one phase result.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptCategory {
    /// The test passed.
    Pass,

    /// The test failed in its call phase.
    Fail,

    /// The test failed in setup or teardown.
    Error,

    /// The test failed on an earlier attempt and passed on a later one.
    Flaky,

    /// The test failed but is quarantined; the failure is suppressed.
    Quarantined,

    /// The outcome is not yet final; nothing is counted.
    ///
    /// Used for failing attempts with retries remaining, and for retries of
    /// already-counted quarantined tests so they are not double counted.
    Deferred,
}

impl AttemptCategory {
    /// The category as a summary string. `Deferred` is the empty string.
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptCategory::Pass => "passed",
            AttemptCategory::Fail => "failed",
            AttemptCategory::Error => "error",
            AttemptCategory::Flaky => "flaky",
            AttemptCategory::Quarantined => "quarantined",
            AttemptCategory::Deferred => "",
        }
    }
}

/// Classification of a single phase result: the counted category plus labels
/// for the host's progress and summary rendering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhaseStatus {
    /// The counted category.
    pub category: AttemptCategory,

    /// One-character progress label, e.g. `F`, `R`, `Q`. Empty when the
    /// status should not produce progress output.
    pub short_label: &'static str,

    /// Summary line label, e.g. `FAILED (retry, quarantined)`.
    pub display_label: &'static str,
}

/// Everything the classifier needs to know about one phase result.
#[derive(Copy, Clone, Debug)]
pub struct ClassifyInput {
    /// Which phase completed.
    pub phase: TestPhase,

    /// The phase outcome.
    pub outcome: PhaseOutcome,

    /// True if a skipped outcome stands for an expected failure.
    pub expected_failure: bool,

    /// 0-based index of the attempt this result belongs to.
    pub attempt_index: usize,

    /// Index of the last permitted attempt (the configured retry ceiling).
    pub last_attempt_index: usize,

    /// True if the test is in the quarantine manifest *and* the run's mode
    /// suppresses quarantined failures.
    pub quarantine_suppressed: bool,

    /// True if any earlier phase result for this test failed in a
    /// non-teardown phase.
    pub prior_non_teardown_failure: bool,

    /// True when classifying the logging-only shadow of a failing result.
    /// Shadow statuses carry the raw fail/error category with no labels.
    pub for_logging_only: bool,
}

/// Classifies one phase result.
///
/// Returns `None` for results that need no tracker-specific status (passing
/// setup phases, ordinary skips, first-attempt teardown passes).
pub fn classify_phase(input: &ClassifyInput) -> Option<PhaseStatus> {
    let error_phase = matches!(input.phase, TestPhase::Setup | TestPhase::Teardown);
    let first_attempt = input.attempt_index == 0;

    if input.outcome == PhaseOutcome::Failed {
        if input.quarantine_suppressed {
            if input.for_logging_only {
                return Some(raw_failure_status(error_phase));
            }
            return Some(PhaseStatus {
                // Count `quarantined` only on the first attempt; retries of
                // the same test report an empty category so run-level stats
                // don't double-count it.
                category: if first_attempt {
                    AttemptCategory::Quarantined
                } else {
                    AttemptCategory::Deferred
                },
                short_label: "Q",
                display_label: match (error_phase, first_attempt) {
                    (true, true) => "ERROR (quarantined)",
                    (true, false) => "ERROR (retry, quarantined)",
                    (false, true) => "FAILED (quarantined)",
                    (false, false) => "FAILED (retry, quarantined)",
                },
            });
        }

        if input.for_logging_only {
            return Some(raw_failure_status(error_phase));
        }

        // Until the last permitted attempt we don't know whether the final
        // outcome is failed or flaky, so defer the category.
        let last_attempt = input.attempt_index == input.last_attempt_index;
        let category = match (last_attempt, error_phase) {
            (false, _) => AttemptCategory::Deferred,
            (true, true) => AttemptCategory::Error,
            (true, false) => AttemptCategory::Fail,
        };
        return Some(PhaseStatus {
            category,
            short_label: match (first_attempt, error_phase) {
                (true, true) => "E",
                (true, false) => "F",
                (false, _) => "R",
            },
            display_label: match (first_attempt, error_phase) {
                (true, true) => "ERROR",
                (true, false) => "FAILED",
                (false, true) => "ERROR (retry)",
                (false, false) => "FAILED (retry)",
            },
        });
    }

    // A recovery is a pass, or an expected failure that resolved (the host's
    // xfail-style mechanism reports those as skips).
    let recovered = input.outcome == PhaseOutcome::Passed
        || (input.outcome == PhaseOutcome::Skipped && input.expected_failure);

    if recovered && input.phase == TestPhase::Call && !first_attempt {
        return Some(PhaseStatus {
            // Quarantined tests already counted `quarantined` on their first
            // failure, and a test whose only failures were in teardown isn't
            // flaky just because its call phase passed.
            category: if input.quarantine_suppressed || !input.prior_non_teardown_failure {
                AttemptCategory::Deferred
            } else {
                AttemptCategory::Flaky
            },
            short_label: "R",
            display_label: if input.outcome == PhaseOutcome::Passed {
                "PASSED (retry)"
            } else {
                "XFAIL (retry)"
            },
        });
    }

    // Teardown-only flake: we only learn the flake resolved when a teardown
    // passes on retry with no non-teardown failure on record.
    if input.outcome == PhaseOutcome::Passed
        && input.phase == TestPhase::Teardown
        && !first_attempt
        && !input.quarantine_suppressed
        && !input.prior_non_teardown_failure
    {
        return Some(PhaseStatus {
            category: AttemptCategory::Flaky,
            short_label: "",
            display_label: "",
        });
    }

    if input.outcome == PhaseOutcome::Passed
        && input.phase == TestPhase::Call
        && first_attempt
        && !input.for_logging_only
    {
        return Some(PhaseStatus {
            category: AttemptCategory::Pass,
            short_label: ".",
            display_label: "PASSED",
        });
    }

    None
}

fn raw_failure_status(error_phase: bool) -> PhaseStatus {
    PhaseStatus {
        category: if error_phase {
            AttemptCategory::Error
        } else {
            AttemptCategory::Fail
        },
        short_label: "",
        display_label: "",
    }
}

/// A classification event emitted to the host.
///
/// For each failing phase result that is quarantine-suppressed or not yet
/// final, the tracker emits two notifications: the counted one carrying the
/// classifier's category, and a logging-only shadow (`counted == false`)
/// carrying the raw fail/error category so the host still surfaces the error
/// text without it contributing to summary stats.
#[derive(Clone, Debug)]
pub struct Notification {
    /// The test the notification is about.
    pub test: TestCaseId,

    /// The phase that completed.
    pub phase: TestPhase,

    /// The classified status.
    pub status: PhaseStatus,

    /// False for logging-only shadow notifications, which must not increment
    /// summary counters.
    pub counted: bool,

    /// True if the underlying phase failed.
    pub failed: bool,

    /// True if the failure was suppressed by quarantine.
    pub quarantine_suppressed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    struct Case {
        phase: TestPhase,
        outcome: PhaseOutcome,
        expected_failure: bool,
        attempt_index: usize,
        last_attempt_index: usize,
        quarantine_suppressed: bool,
        prior_non_teardown_failure: bool,
        for_logging_only: bool,
    }

    impl Default for Case {
        fn default() -> Self {
            Self {
                phase: TestPhase::Call,
                outcome: PhaseOutcome::Failed,
                expected_failure: false,
                attempt_index: 0,
                last_attempt_index: 2,
                quarantine_suppressed: false,
                prior_non_teardown_failure: false,
                for_logging_only: false,
            }
        }
    }

    fn classify(case: Case) -> Option<PhaseStatus> {
        classify_phase(&ClassifyInput {
            phase: case.phase,
            outcome: case.outcome,
            expected_failure: case.expected_failure,
            attempt_index: case.attempt_index,
            last_attempt_index: case.last_attempt_index,
            quarantine_suppressed: case.quarantine_suppressed,
            prior_non_teardown_failure: case.prior_non_teardown_failure,
            for_logging_only: case.for_logging_only,
        })
    }

    #[test_case(
        Case::default(),
        (AttemptCategory::Deferred, "F", "FAILED")
        ; "first call failure with retries left defers")]
    #[test_case(
        Case { attempt_index: 1, ..Case::default() },
        (AttemptCategory::Deferred, "R", "FAILED (retry)")
        ; "mid-retry call failure defers")]
    #[test_case(
        Case { attempt_index: 2, ..Case::default() },
        (AttemptCategory::Fail, "R", "FAILED (retry)")
        ; "last-attempt call failure counts failed")]
    #[test_case(
        Case { last_attempt_index: 0, ..Case::default() },
        (AttemptCategory::Fail, "F", "FAILED")
        ; "zero retries counts failed immediately")]
    #[test_case(
        Case { phase: TestPhase::Setup, ..Case::default() },
        (AttemptCategory::Deferred, "E", "ERROR")
        ; "setup failure is error family")]
    #[test_case(
        Case { phase: TestPhase::Teardown, attempt_index: 2, ..Case::default() },
        (AttemptCategory::Error, "R", "ERROR (retry)")
        ; "last-attempt teardown failure counts error")]
    #[test_case(
        Case { quarantine_suppressed: true, ..Case::default() },
        (AttemptCategory::Quarantined, "Q", "FAILED (quarantined)")
        ; "quarantined first failure counts quarantined")]
    #[test_case(
        Case { quarantine_suppressed: true, attempt_index: 1, ..Case::default() },
        (AttemptCategory::Deferred, "Q", "FAILED (retry, quarantined)")
        ; "quarantined retry failure defers to avoid double counting")]
    #[test_case(
        Case { phase: TestPhase::Setup, quarantine_suppressed: true, ..Case::default() },
        (AttemptCategory::Quarantined, "Q", "ERROR (quarantined)")
        ; "quarantined setup failure uses error label")]
    #[test_case(
        Case {
            phase: TestPhase::Teardown,
            quarantine_suppressed: true,
            attempt_index: 2,
            ..Case::default()
        },
        (AttemptCategory::Deferred, "Q", "ERROR (retry, quarantined)")
        ; "quarantined last-attempt teardown failure still suppressed")]
    #[test_case(
        Case { for_logging_only: true, ..Case::default() },
        (AttemptCategory::Fail, "", "")
        ; "logging shadow of call failure is raw failed")]
    #[test_case(
        Case { phase: TestPhase::Setup, for_logging_only: true, ..Case::default() },
        (AttemptCategory::Error, "", "")
        ; "logging shadow of setup failure is raw error")]
    #[test_case(
        Case {
            quarantine_suppressed: true,
            for_logging_only: true,
            attempt_index: 1,
            ..Case::default()
        },
        (AttemptCategory::Fail, "", "")
        ; "logging shadow ignores quarantine")]
    #[test_case(
        Case {
            outcome: PhaseOutcome::Passed,
            attempt_index: 1,
            prior_non_teardown_failure: true,
            ..Case::default()
        },
        (AttemptCategory::Flaky, "R", "PASSED (retry)")
        ; "retry pass after call failure is flaky")]
    #[test_case(
        Case {
            outcome: PhaseOutcome::Skipped,
            expected_failure: true,
            attempt_index: 1,
            prior_non_teardown_failure: true,
            ..Case::default()
        },
        (AttemptCategory::Flaky, "R", "XFAIL (retry)")
        ; "resolved expected failure on retry is flaky")]
    #[test_case(
        Case {
            outcome: PhaseOutcome::Passed,
            attempt_index: 1,
            ..Case::default()
        },
        (AttemptCategory::Deferred, "R", "PASSED (retry)")
        ; "retry pass after teardown-only failure is not call-phase flaky")]
    #[test_case(
        Case {
            outcome: PhaseOutcome::Passed,
            attempt_index: 1,
            prior_non_teardown_failure: true,
            quarantine_suppressed: true,
            ..Case::default()
        },
        (AttemptCategory::Deferred, "R", "PASSED (retry)")
        ; "quarantined recovery reports quarantined-resolved not flaky")]
    #[test_case(
        Case {
            phase: TestPhase::Teardown,
            outcome: PhaseOutcome::Passed,
            attempt_index: 1,
            ..Case::default()
        },
        (AttemptCategory::Flaky, "", "")
        ; "teardown-only flake resolves on passing retry teardown")]
    #[test_case(
        Case { outcome: PhaseOutcome::Passed, ..Case::default() },
        (AttemptCategory::Pass, ".", "PASSED")
        ; "first-attempt call pass counts passed")]
    fn classification(case: Case, expected: (AttemptCategory, &'static str, &'static str)) {
        let status = classify(case).expect("case should classify");
        assert_eq!(
            (status.category, status.short_label, status.display_label),
            expected
        );
    }

    #[test_case(
        Case { phase: TestPhase::Setup, outcome: PhaseOutcome::Passed, ..Case::default() }
        ; "passing setup needs no status")]
    #[test_case(
        Case { phase: TestPhase::Teardown, outcome: PhaseOutcome::Passed, ..Case::default() }
        ; "first-attempt teardown pass needs no status")]
    #[test_case(
        Case { outcome: PhaseOutcome::Skipped, ..Case::default() }
        ; "ordinary skip needs no status")]
    #[test_case(
        Case {
            phase: TestPhase::Teardown,
            outcome: PhaseOutcome::Passed,
            attempt_index: 1,
            prior_non_teardown_failure: true,
            ..Case::default()
        }
        ; "teardown pass after call failure is not a teardown flake")]
    #[test_case(
        Case {
            phase: TestPhase::Teardown,
            outcome: PhaseOutcome::Passed,
            attempt_index: 1,
            quarantine_suppressed: true,
            ..Case::default()
        }
        ; "quarantined teardown recovery stays suppressed")]
    fn no_classification(case: Case) {
        assert_eq!(classify(case), None);
    }

    #[test]
    fn zero_failure_histories_never_classify_flaky_or_quarantined() {
        for phase in [TestPhase::Setup, TestPhase::Call, TestPhase::Teardown] {
            for attempt_index in 0..3 {
                for quarantine_suppressed in [false, true] {
                    let status = classify(Case {
                        phase,
                        outcome: PhaseOutcome::Passed,
                        attempt_index,
                        quarantine_suppressed,
                        // No failure ever happened for this test.
                        prior_non_teardown_failure: false,
                        ..Case::default()
                    });
                    if let Some(status) = status {
                        assert_ne!(status.category, AttemptCategory::Quarantined);
                        if attempt_index == 0 {
                            assert_ne!(status.category, AttemptCategory::Flaky);
                        }
                    }
                }
            }
        }
    }
}
