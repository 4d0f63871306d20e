// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire messages for distributed runs.
//!
//! When test execution is fanned out across worker processes, the controller
//! remains the single authority for classification, counting, and upload.
//! The controller seeds each worker with the quarantine manifest at startup,
//! and workers stream raw phase outcomes back as they happen. The controller
//! replays each [`PhaseMessage`] through its own tracker, so a distributed
//! run produces the same notifications, counters, and report as a local one.
//!
//! Serialization is JSON; the host runner owns the actual channel (pipes,
//! sockets, whatever its worker protocol uses).

use crate::{attempt::PhaseExecution, test_id::TestCaseId};
use camino::Utf8PathBuf;
use flaketrack_metadata::TestSuiteManifest;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Message sent from the controller to a worker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ControllerMessage {
    /// Seeds the worker with the quarantine manifest fetched by the
    /// controller. Workers never talk to the service themselves.
    SeedManifest {
        /// The manifest as fetched, or empty if the fetch was skipped or
        /// failed.
        manifest: TestSuiteManifest,
    },
}

/// Message sent from a worker to the controller.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkerMessage {
    /// One completed test phase.
    PhaseResult(PhaseMessage),
}

/// A single phase outcome, addressed by test identity.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseMessage {
    /// Path of the file containing the test.
    pub filename: Utf8PathBuf,

    /// Hierarchical name components of the test.
    pub name: Vec<SmolStr>,

    /// The phase outcome, timestamps included.
    pub execution: PhaseExecution,
}

impl PhaseMessage {
    /// Creates a message for one phase of `test`.
    pub fn new(test: &TestCaseId, execution: PhaseExecution) -> Self {
        Self {
            filename: test.filename.clone(),
            name: test.name.clone(),
            execution,
        }
    }

    /// The test identity this message refers to.
    pub fn test_id(&self) -> TestCaseId {
        TestCaseId::new(self.filename.clone(), self.name.iter().map(SmolStr::clone))
    }
}
