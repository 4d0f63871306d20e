// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by flaketrack.

use crate::config::QuarantineMode;
use flaketrack_metadata::FlaketrackExitCode;
use thiserror::Error;

/// Error returned while parsing a [`QuarantineMode`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized quarantine mode: {input}\n(known values: {})",
    QuarantineMode::variants().join(", "),
)]
pub struct QuarantineModeParseError {
    input: String,
}

impl QuarantineModeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// A configuration problem detected before any test executes.
///
/// These errors are fatal at startup: the host must abort the run rather than
/// proceed with a misconfigured tracker.
#[derive(Clone, Debug, Error)]
pub enum ConfigError {
    /// No test suite ID was provided.
    #[error("missing required test suite ID")]
    MissingSuiteId,

    /// No API key was provided for a controller process.
    ///
    /// Workers never make API calls and may omit the key.
    #[error("missing required API key")]
    MissingApiKey,

    /// The quarantine mode string didn't parse.
    #[error(transparent)]
    QuarantineMode(#[from] QuarantineModeParseError),
}

impl ConfigError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::MissingSuiteId | Self::MissingApiKey | Self::QuarantineMode(_) => {
                FlaketrackExitCode::SETUP_ERROR
            }
        }
    }
}

/// A transport-level failure: the request never produced an HTTP status.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// Establishing or using the connection failed.
    #[error("connection failed: {message}")]
    Connect {
        /// Human-readable description of the underlying failure.
        message: String,
    },
}

/// An error returned by the quarantine service API client.
///
/// Transient errors ([`is_transient`](Self::is_transient)) have already been
/// retried per the client's retry policy by the time they surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The connection failed on every permitted attempt.
    #[error("connection to {url} failed: {message}")]
    Connect {
        /// The request URL.
        url: String,
        /// Human-readable description of the underlying failure.
        message: String,
    },

    /// The request timed out on every permitted attempt.
    #[error("request to {url} timed out")]
    Timeout {
        /// The request URL.
        url: String,
    },

    /// A retryable HTTP status was still being returned after the last
    /// permitted attempt.
    #[error("{url} returned HTTP {status} after {attempts} attempts")]
    RetriesExhausted {
        /// The request URL.
        url: String,
        /// The HTTP status of the final attempt.
        status: u16,
        /// The number of attempts made.
        attempts: usize,
    },

    /// The server returned a non-retryable, non-success status.
    #[error("{url} returned HTTP {status}")]
    FatalStatus {
        /// The request URL.
        url: String,
        /// The HTTP status.
        status: u16,
    },

    /// The upload-slot response did not carry the pre-signed URL.
    #[error("{url} response is missing the Location header")]
    MissingLocation {
        /// The request URL.
        url: String,
    },

    /// The response body didn't match the expected schema.
    #[error("failed to deserialize response from {url}")]
    InvalidResponse {
        /// The request URL.
        url: String,
        /// The deserialization failure.
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the run report failed.
    #[error("failed to serialize run report")]
    ReportSerialize {
        /// The serialization failure.
        #[source]
        source: serde_json::Error,
    },

    /// Gzip-compressing the run report failed.
    #[error("failed to compress run report")]
    Compress {
        /// The I/O failure reported by the encoder.
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Returns true if this error is from the transient family: connection
    /// failures, timeouts, and retryable HTTP statuses.
    ///
    /// Transient errors degrade gracefully: a transient manifest-fetch
    /// failure leaves the run with an empty manifest, and a transient upload
    /// failure is reported as a warning.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Connect { .. } | ApiError::Timeout { .. } | ApiError::RetriesExhausted { .. }
        )
    }
}
