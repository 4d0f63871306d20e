// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes produced by flaketrack-aware test runs.
///
/// Hosts that let flaketrack override their exit status can cross-reference
/// the override value against these constants.
pub enum FlaketrackExitCode {}

impl FlaketrackExitCode {
    /// The run is considered successful. Also produced when every failure the
    /// host observed was a quarantine-suppressed one.
    pub const OK: i32 = 0;

    /// A configuration problem (missing suite ID, unrecognized quarantine
    /// mode) was detected before any test executed.
    pub const SETUP_ERROR: i32 = 96;
}
