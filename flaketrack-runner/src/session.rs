// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run tracker: per-process orchestration of a tracked test run.
//!
//! A [`RunTracker`] is driven by the host runner through a small set of
//! hooks: [`on_run_start`](RunTracker::on_run_start) before the first test,
//! [`on_phase_result`](RunTracker::on_phase_result) for every completed test
//! phase, [`should_retry`](RunTracker::should_retry) after each attempt, and
//! [`on_run_end`](RunTracker::on_run_end) once the run is over. The tracker
//! owns classification, quarantine decisions, retry decisions, counting, and
//! the report upload; the host owns test execution and rendering.

use crate::{
    aggregate::{RunCounters, build_report},
    api::{ApiClient, Transport, UreqTransport, run_url},
    attempt::{AttemptHistory, PhaseExecution, PhaseOutcome, TestPhase},
    classify::{ClassifyInput, Notification, classify_phase},
    config::{ProcessRole, QuarantineMode, TrackerConfig},
    coordination::{ControllerMessage, WorkerMessage},
    errors::ConfigError,
    manifest::QuarantineManifest,
    retry::{RetryController, RetryData},
    test_id::TestCaseId,
};
use chrono::{DateTime, Utc};
use flaketrack_metadata::{RunSummary, TestSuiteManifest};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// What to do with a test about to be executed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QuarantineAction {
    /// Execute the test normally.
    Run,

    /// Skip the test without executing it.
    Skip,
}

/// The outcome of finishing a run.
#[derive(Debug)]
pub struct RunEnd {
    /// The uploaded run's summary, if an upload happened and succeeded.
    pub summary: Option<RunSummary>,

    /// Exit status override. `Some(0)` when every failure the host tallied
    /// was a suppressed quarantine failure; `None` otherwise, leaving the
    /// host's own exit status in place.
    pub exit_override: Option<i32>,
}

/// Tracks one process's view of a test run.
pub struct RunTracker<T: Transport = UreqTransport> {
    config: TrackerConfig,
    client: Option<ApiClient<T>>,
    manifest: QuarantineManifest,
    wire_manifest: Option<TestSuiteManifest>,
    histories: AttemptHistory,
    retry: RetryController,
    counters: RunCounters,
    non_teardown_failures: BTreeSet<TestCaseId>,
    start_time: Option<DateTime<Utc>>,
}

impl RunTracker<UreqTransport> {
    /// Creates the controller tracker with the production HTTP transport.
    ///
    /// The controller is the only process that talks to the service: it
    /// fetches the manifest at run start and uploads the report at run end.
    pub fn controller(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate(ProcessRole::Controller)?;
        let client = ApiClient::from_config(&config);
        Ok(Self::with_client(config, Some(client)))
    }

    /// Creates a worker tracker. Workers never make API calls; they receive
    /// the manifest from the controller via
    /// [`apply_controller_message`](RunTracker::apply_controller_message).
    pub fn worker(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate(ProcessRole::Worker)?;
        Ok(Self::with_client(config, None))
    }
}

impl<T: Transport> RunTracker<T> {
    /// Creates a controller tracker over a caller-supplied transport.
    pub fn controller_with_transport(
        config: TrackerConfig,
        transport: T,
    ) -> Result<Self, ConfigError> {
        config.validate(ProcessRole::Controller)?;
        let client = ApiClient::new(transport, &config);
        Ok(Self::with_client(config, Some(client)))
    }

    fn with_client(config: TrackerConfig, client: Option<ApiClient<T>>) -> Self {
        let retry = RetryController::new(config.failure_retries);
        Self {
            config,
            client,
            manifest: QuarantineManifest::empty(),
            wire_manifest: None,
            histories: AttemptHistory::new(),
            retry,
            counters: RunCounters::default(),
            non_teardown_failures: BTreeSet::new(),
            start_time: None,
        }
    }

    /// Called once before the first test executes.
    ///
    /// On controllers with quarantining enabled this fetches the manifest; a
    /// fetch failure degrades to an empty manifest with a warning rather
    /// than failing the run.
    pub fn on_run_start(&mut self, now: DateTime<Utc>) {
        self.start_time = Some(now);
        info!(
            suite_id = self.config.suite_id,
            quarantine_mode = %self.config.quarantine_mode,
            failure_retries = self.config.failure_retries,
            "starting tracked test run"
        );

        if self.config.quarantine_mode == QuarantineMode::NoQuarantine {
            return;
        }
        let Some(client) = &self.client else {
            if self.wire_manifest.is_none() {
                warn!("worker was not seeded with a quarantine manifest; no tests quarantined");
            }
            return;
        };
        match client.fetch_manifest(&self.config.suite_id) {
            Ok(manifest) => {
                self.manifest = QuarantineManifest::from_wire(&manifest);
                debug!(
                    quarantined_tests = self.manifest.len(),
                    "loaded quarantine manifest"
                );
                self.wire_manifest = Some(manifest);
            }
            Err(err) => {
                warn!(
                    suite_id = self.config.suite_id,
                    %err,
                    "failed to fetch quarantine manifest; continuing with no tests quarantined"
                );
            }
        }
    }

    /// The seed message a controller sends to each worker it spawns.
    pub fn seed_message(&self) -> ControllerMessage {
        ControllerMessage::SeedManifest {
            manifest: self.wire_manifest.clone().unwrap_or_default(),
        }
    }

    /// Applies a controller message on a worker.
    pub fn apply_controller_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::SeedManifest { manifest } => {
                self.manifest = QuarantineManifest::from_wire(&manifest);
                debug!(
                    quarantined_tests = self.manifest.len(),
                    "seeded quarantine manifest from controller"
                );
                self.wire_manifest = Some(manifest);
            }
        }
    }

    /// Folds a worker's phase result into the controller's state.
    ///
    /// Replaying through [`on_phase_result`](RunTracker::on_phase_result)
    /// keeps a distributed run's notifications, counters, and report
    /// identical to a local run of the same phases.
    pub fn on_worker_message(&mut self, message: WorkerMessage) -> Vec<Notification> {
        match message {
            WorkerMessage::PhaseResult(phase) => {
                let test = phase.test_id();
                self.on_phase_result(&test, phase.execution)
            }
        }
    }

    /// Records one completed test phase and returns the notifications the
    /// host should surface for it.
    ///
    /// At most two notifications are produced: the counted classification,
    /// and a logging-only shadow when a failure's counted status was
    /// rewritten away from a raw failure (quarantine suppression, or a
    /// non-final attempt). The shadow keeps the host's failure output and
    /// failure tally intact without touching the counted categories.
    pub fn on_phase_result(
        &mut self,
        test: &TestCaseId,
        execution: PhaseExecution,
    ) -> Vec<Notification> {
        let quarantine_suppressed = self.manifest.contains(test)
            && self.config.quarantine_mode == QuarantineMode::IgnoreFailures;
        // Captured before this result is recorded: "prior" means strictly
        // earlier phases.
        let prior_non_teardown_failure = self.non_teardown_failures.contains(test);
        let failed = execution.outcome == PhaseOutcome::Failed;
        if failed && execution.phase != TestPhase::Teardown {
            self.non_teardown_failures.insert(test.clone());
        }

        let Some(attempt_index) = self.histories.record(test, &execution) else {
            return Vec::new();
        };
        let last_attempt_index = self.retry.failure_retries() as usize;

        let input = ClassifyInput {
            phase: execution.phase,
            outcome: execution.outcome,
            expected_failure: execution.expected_failure,
            attempt_index,
            last_attempt_index,
            quarantine_suppressed,
            prior_non_teardown_failure,
            for_logging_only: false,
        };

        let mut notifications = Vec::new();
        if let Some(status) = classify_phase(&input) {
            notifications.push(Notification {
                test: test.clone(),
                phase: execution.phase,
                status,
                counted: true,
                failed,
                quarantine_suppressed,
            });
            if failed && (quarantine_suppressed || attempt_index < last_attempt_index) {
                if let Some(shadow) = classify_phase(&ClassifyInput {
                    for_logging_only: true,
                    ..input
                }) {
                    notifications.push(Notification {
                        test: test.clone(),
                        phase: execution.phase,
                        status: shadow,
                        counted: false,
                        failed,
                        quarantine_suppressed,
                    });
                }
            }
        }
        for notification in &notifications {
            self.counters.record(notification);
        }
        notifications
    }

    /// Whether the host should re-run `test` after its latest attempt.
    pub fn should_retry(&self, test: &TestCaseId) -> bool {
        let Some(attempts) = self.histories.attempts(test) else {
            return false;
        };
        let Some(latest) = attempts.last() else {
            return false;
        };
        self.retry.should_retry(latest, attempts.len())
    }

    /// Retry data for `test`'s latest attempt, for the host's progress
    /// rendering.
    pub fn retry_data(&self, test: &TestCaseId) -> RetryData {
        let attempts = self.histories.attempts(test).map_or(0, <[_]>::len);
        self.retry.retry_data(attempts.saturating_sub(1))
    }

    /// Decides whether `test` runs or is skipped under the quarantine mode.
    pub fn quarantine_action(&self, test: &TestCaseId) -> QuarantineAction {
        if self.config.quarantine_mode == QuarantineMode::SkipTests && self.manifest.contains(test)
        {
            info!(test = %test, "skipping quarantined test");
            QuarantineAction::Skip
        } else {
            QuarantineAction::Run
        }
    }

    /// The run counters accumulated so far.
    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// The attempt histories accumulated so far.
    pub fn histories(&self) -> &AttemptHistory {
        &self.histories
    }

    /// Called once after the last test finishes.
    ///
    /// Builds the run report and, on controllers with uploads enabled,
    /// uploads it. Upload failures are logged and swallowed; they never
    /// change the run's outcome. Also computes the exit-status override for
    /// runs whose only failures were suppressed quarantine failures.
    pub fn on_run_end(&mut self, now: DateTime<Utc>) -> RunEnd {
        let exit_override = self.counters.exit_override();
        if exit_override.is_some() {
            info!(
                suppressed_failures = self.counters.suppressed_failures,
                "all failures were quarantined; overriding exit status to success"
            );
        }

        let mut summary = None;
        if self.config.upload_results {
            if let Some(client) = &self.client {
                let report = build_report(
                    &self.histories,
                    &self.manifest,
                    self.config.quarantine_mode,
                    self.config.branch.as_deref(),
                    self.config.commit.as_deref(),
                    self.start_time.unwrap_or(now),
                    now,
                );
                if report.test_runs.is_empty() {
                    debug!("no reportable test runs; skipping upload");
                } else {
                    match client.create_run(&self.config.suite_id, &report) {
                        Ok(uploaded) => {
                            info!(
                                run_id = uploaded.run_id,
                                url = run_url(
                                    self.config.base_url.as_deref(),
                                    &self.config.suite_id,
                                    &uploaded.run_id,
                                ),
                                "uploaded test run results"
                            );
                            summary = Some(uploaded);
                        }
                        Err(err) => {
                            warn!(%err, "failed to upload test run results");
                        }
                    }
                }
            }
        }

        RunEnd {
            summary,
            exit_override,
        }
    }
}
