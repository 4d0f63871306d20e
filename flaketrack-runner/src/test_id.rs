// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test identity.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Uniquely identifies a test within a run.
///
/// `name` is the hierarchical name path of the test within its file (class,
/// nested class, method). Framework-internal pass-through nodes contribute
/// nothing to a test's identity and are filtered out by [`TestCaseId::new`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TestCaseId {
    /// The file the test lives in, relative to the repository root.
    pub filename: Utf8PathBuf,

    /// The hierarchical name of the test within `filename`.
    pub name: Vec<SmolStr>,
}

impl TestCaseId {
    /// Creates a test ID, dropping framework-internal pass-through name
    /// segments (empty segments and `"()"` nodes).
    pub fn new(
        filename: impl Into<Utf8PathBuf>,
        name: impl IntoIterator<Item = impl Into<SmolStr>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            name: name
                .into_iter()
                .map(Into::into)
                .filter(|segment| !segment.is_empty() && segment != "()")
                .collect(),
        }
    }

    /// The dotted form of the name path, e.g. `TestLogin.test_expired_session`.
    pub fn dotted_name(&self) -> String {
        self.name
            .iter()
            .map(SmolStr::as_str)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.filename, self.dotted_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_segments_are_filtered() {
        let id = TestCaseId::new("tests/test_login.py", ["TestLogin", "()", "test_ok"]);
        assert_eq!(id.name, vec!["TestLogin", "test_ok"]);

        let id = TestCaseId::new("tests/test_login.py", ["", "test_ok"]);
        assert_eq!(id.name, vec!["test_ok"]);
    }

    #[test]
    fn equality_is_structural() {
        let a = TestCaseId::new("tests/a.py", ["T", "()", "m"]);
        let b = TestCaseId::new("tests/a.py", ["T", "m"]);
        assert_eq!(a, b);

        let c = TestCaseId::new("tests/b.py", ["T", "m"]);
        assert_ne!(a, c);
    }

    #[test]
    fn display_uses_dotted_name() {
        let id = TestCaseId::new("tests/a.py", ["T", "m"]);
        assert_eq!(id.to_string(), "tests/a.py::T.m");
        assert_eq!(id.dotted_name(), "T.m");
    }
}
