// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run-level configuration consumed from the host integration.
//!
//! Flag parsing and credential loading are host concerns; the engine only
//! consumes the resolved values and validates them before the run starts.

use crate::errors::{ConfigError, QuarantineModeParseError};
use std::{fmt, str::FromStr};

/// How quarantined tests are treated for the duration of a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum QuarantineMode {
    /// Run quarantined tests, but suppress their failures from affecting
    /// build status.
    #[default]
    IgnoreFailures,

    /// Ignore the quarantine manifest entirely.
    NoQuarantine,

    /// Skip quarantined tests without executing them.
    SkipTests,
}

impl QuarantineMode {
    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 3] {
        ["ignore_failures", "no_quarantine", "skip_tests"]
    }
}

impl FromStr for QuarantineMode {
    type Err = QuarantineModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore_failures" => Ok(QuarantineMode::IgnoreFailures),
            "no_quarantine" => Ok(QuarantineMode::NoQuarantine),
            "skip_tests" => Ok(QuarantineMode::SkipTests),
            other => Err(QuarantineModeParseError::new(other)),
        }
    }
}

impl fmt::Display for QuarantineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuarantineMode::IgnoreFailures => "ignore_failures",
            QuarantineMode::NoQuarantine => "no_quarantine",
            QuarantineMode::SkipTests => "skip_tests",
        };
        f.write_str(s)
    }
}

/// The role of this process within a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcessRole {
    /// The single process that fetches the manifest and uploads the report.
    Controller,

    /// A worker process: receives the manifest from the controller and never
    /// makes API calls itself.
    Worker,
}

/// Resolved configuration for a run.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// The test suite ID. Required.
    pub suite_id: String,

    /// The API key. Required for controllers; workers may leave it empty.
    pub api_key: String,

    /// Base URL override for the quarantine service.
    pub base_url: Option<String>,

    /// Version-control branch, if known.
    pub branch: Option<String>,

    /// Version-control commit, if known.
    pub commit: Option<String>,

    /// Maximum number of times to re-run a failing test.
    pub failure_retries: u32,

    /// How quarantined tests are treated.
    pub quarantine_mode: QuarantineMode,

    /// Whether to upload the run report at run end.
    pub upload_results: bool,

    /// Disables TLS certificate validation. For local testing only.
    pub insecure_disable_tls_validation: bool,

    /// Free-form description of the host runner (name and version), included
    /// in the client identification header.
    pub host_runner: String,
}

impl TrackerConfig {
    /// Creates a configuration with the default retry ceiling and quarantine
    /// mode.
    pub fn new(suite_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            suite_id: suite_id.into(),
            api_key: api_key.into(),
            base_url: None,
            branch: None,
            commit: None,
            failure_retries: 2,
            quarantine_mode: QuarantineMode::default(),
            upload_results: true,
            insecure_disable_tls_validation: false,
            host_runner: "unknown".to_owned(),
        }
    }

    /// Validates the configuration for the given process role.
    ///
    /// Called before any test executes; failures here abort the run.
    pub fn validate(&self, role: ProcessRole) -> Result<(), ConfigError> {
        if self.suite_id.is_empty() {
            return Err(ConfigError::MissingSuiteId);
        }
        if role == ProcessRole::Controller && self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }
}
