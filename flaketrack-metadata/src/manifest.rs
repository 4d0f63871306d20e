// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A reference to a single test, as the quarantine service identifies it.
///
/// `name` is the hierarchical name path of the test within its file, e.g.
/// `["TestClass", "test_method"]`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestRef {
    /// Opaque server-side identifier for the test.
    pub test_id: String,

    /// The file the test lives in, relative to the repository root.
    pub filename: Utf8PathBuf,

    /// The hierarchical name of the test within `filename`.
    pub name: Vec<SmolStr>,
}

/// The manifest returned by `GET /api/v1/test-suites/{suite_id}/manifest`.
///
/// Fetched once per logical run by the controller process and shared verbatim
/// with any workers.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteManifest {
    /// Tests currently quarantined for this suite.
    pub quarantined_tests: Vec<TestRef>,
}
