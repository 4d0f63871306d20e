// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The quarantine manifest: the set of quarantined test identities for a run.

use crate::test_id::TestCaseId;
use flaketrack_metadata::TestSuiteManifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An immutable set of quarantined test identities.
///
/// Built once per logical run, either from a manifest fetch (controller) or
/// from the controller's serialized copy (workers). Read-only thereafter, so
/// every process in a run applies identical quarantine decisions.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct QuarantineManifest {
    tests: BTreeSet<TestCaseId>,
}

impl QuarantineManifest {
    /// Creates an empty manifest. Quarantining degrades to a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the manifest from the service's wire form.
    pub fn from_wire(manifest: &TestSuiteManifest) -> Self {
        Self {
            tests: manifest
                .quarantined_tests
                .iter()
                .map(|test| TestCaseId::new(test.filename.clone(), test.name.iter().cloned()))
                .collect(),
        }
    }

    /// Returns true if `test` is quarantined.
    pub fn contains(&self, test: &TestCaseId) -> bool {
        self.tests.contains(test)
    }

    /// The number of quarantined tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// True if no tests are quarantined.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
