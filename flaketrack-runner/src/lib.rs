// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core engine for flaketrack: attempt tracking, flaky-test classification,
//! quarantine, and run reporting.
//!
//! Host test runners drive the engine through a [`RunTracker`](session::RunTracker):
//! once per test per phase they call
//! [`on_phase_result`](session::RunTracker::on_phase_result), consult
//! [`should_retry`](session::RunTracker::should_retry) after each attempt, and
//! call [`on_run_end`](session::RunTracker::on_run_end) when the run is over.
//! The engine classifies outcomes across retries, suppresses failures of
//! quarantined tests, and uploads a consolidated report to the quarantine
//! service.

pub mod aggregate;
pub mod api;
pub mod attempt;
pub mod classify;
pub mod config;
pub mod coordination;
pub mod errors;
pub mod manifest;
pub mod retry;
pub mod session;
pub mod test_id;
