// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The retry controller: decides whether a failing test is re-run.

use crate::attempt::Attempt;

/// Data related to retries for a single test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryData {
    /// The current attempt. In the range `[1, total_attempts]`.
    pub attempt: usize,

    /// The total number of times this test can be run. Equal to
    /// `1 + failure_retries`.
    pub total_attempts: usize,
}

impl RetryData {
    /// Returns true if this is the last attempt the test will be given.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.total_attempts
    }
}

/// Decides, after each attempt, whether a test is re-run.
///
/// Retries are immediate re-executions; there is no delay between attempts.
#[derive(Copy, Clone, Debug)]
pub struct RetryController {
    failure_retries: u32,
}

impl RetryController {
    /// Creates a controller with the given retry ceiling.
    pub fn new(failure_retries: u32) -> Self {
        Self { failure_retries }
    }

    /// The configured retry ceiling.
    pub fn failure_retries(&self) -> u32 {
        self.failure_retries
    }

    /// Returns true if the test should be re-run: its latest attempt failed
    /// and the total attempt count is still within the ceiling.
    ///
    /// Passed and skipped attempts never retry.
    pub fn should_retry(&self, latest: &Attempt, attempts_so_far: usize) -> bool {
        latest.has_failure() && attempts_so_far < self.total_attempts()
    }

    /// Retry data for the attempt at the given 0-based index.
    pub fn retry_data(&self, attempt_index: usize) -> RetryData {
        RetryData {
            attempt: attempt_index + 1,
            total_attempts: self.total_attempts(),
        }
    }

    fn total_attempts(&self) -> usize {
        self.failure_retries as usize + 1
    }
}
