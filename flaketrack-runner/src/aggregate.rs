// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run aggregator: turns accumulated attempt histories into the uploaded
//! run report and computes the final exit-status override.

use crate::{
    attempt::AttemptHistory,
    classify::{AttemptCategory, Notification},
    config::QuarantineMode,
    manifest::QuarantineManifest,
};
use chrono::{DateTime, Utc};
use flaketrack_metadata::{
    CreateRunRequest, FlaketrackExitCode, TestAttemptResult, TestRunAttemptRecord, TestRunRecord,
};

/// Builds the run report from the full attempt history.
///
/// Attempts where nothing ran (fully skipped, or skip-marked tests whose only
/// activity was teardown bookkeeping) are dropped; tests with no reportable
/// attempts are omitted entirely. Output ordering follows history insertion
/// order, so repeated aggregation of the same history serializes to
/// byte-identical JSON.
pub fn build_report(
    histories: &AttemptHistory,
    manifest: &QuarantineManifest,
    mode: QuarantineMode,
    branch: Option<&str>,
    commit: Option<&str>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> CreateRunRequest {
    let mut test_runs = Vec::new();
    for (test, attempts) in histories.iter() {
        let quarantined = manifest.contains(test) && mode == QuarantineMode::IgnoreFailures;

        let records: Vec<_> = attempts
            .iter()
            .filter(|attempt| attempt.has_failure() || attempt.executed_to_pass())
            .map(|attempt| TestRunAttemptRecord {
                start_time: attempt.start_time(),
                end_time: attempt.end_time(),
                duration_ms: (attempt.duration_micros().max(0) / 1000) as u64,
                result: if attempt.has_failure() {
                    if quarantined {
                        TestAttemptResult::Quarantined
                    } else {
                        TestAttemptResult::Fail
                    }
                } else {
                    TestAttemptResult::Pass
                },
            })
            .collect();

        if !records.is_empty() {
            test_runs.push(TestRunRecord {
                filename: test.filename.clone(),
                name: test.name.clone(),
                attempts: records,
            });
        }
    }

    CreateRunRequest {
        branch: branch.map(str::to_owned),
        commit: commit.map(str::to_owned),
        start_time,
        end_time,
        test_runs,
    }
}

/// Aggregate counters for a run, fed by classification notifications.
///
/// `host_failed` mirrors what a host runner's own failure accounting sees:
/// every failing notification increments it, including logging-only shadows.
/// `suppressed_failures` counts failing results of quarantined tests once
/// each (counted notifications only).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunCounters {
    /// Tests counted as passed.
    pub passed: usize,

    /// Tests counted as failed.
    pub failed: usize,

    /// Tests counted as errored (setup/teardown failure).
    pub errors: usize,

    /// Tests counted as flaky.
    pub flaky: usize,

    /// Tests counted as quarantined.
    pub quarantined: usize,

    /// Failing notifications as the host tallies them, shadows included.
    pub host_failed: usize,

    /// Quarantine-suppressed failing results.
    pub suppressed_failures: usize,
}

impl RunCounters {
    /// Folds one notification into the counters.
    pub fn record(&mut self, notification: &Notification) {
        if notification.failed {
            self.host_failed += 1;
            if notification.counted && notification.quarantine_suppressed {
                self.suppressed_failures += 1;
            }
        }
        if notification.counted {
            match notification.status.category {
                AttemptCategory::Pass => self.passed += 1,
                AttemptCategory::Fail => self.failed += 1,
                AttemptCategory::Error => self.errors += 1,
                AttemptCategory::Flaky => self.flaky += 1,
                AttemptCategory::Quarantined => self.quarantined += 1,
                AttemptCategory::Deferred => {}
            }
        }
    }

    /// Computes the exit-status override for the run.
    ///
    /// Each quarantine-suppressed failure is seen twice by the host: once as
    /// the counted quarantined notification and once as the logging-only
    /// shadow. `host_failed == suppressed_failures * 2` therefore holds
    /// exactly when every failure the host tallied was a suppressed
    /// quarantine failure, and the run's exit status is overridden to
    /// success.
    pub fn exit_override(&self) -> Option<i32> {
        (self.host_failed > 0 && self.host_failed == self.suppressed_failures * 2)
            .then_some(FlaketrackExitCode::OK)
    }
}
