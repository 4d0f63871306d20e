// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The final result recorded for one attempt of a test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestAttemptResult {
    /// The attempt passed.
    Pass,

    /// The attempt failed in at least one phase.
    Fail,

    /// The attempt failed, but the test is quarantined and the failure was
    /// suppressed from affecting build status.
    Quarantined,
}

/// One attempt of a test within the uploaded run report.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestRunAttemptRecord {
    /// When the attempt's setup phase began.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rfc3339_micros_opt"
    )]
    pub start_time: Option<DateTime<Utc>>,

    /// When the attempt's last phase ended.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rfc3339_micros_opt"
    )]
    pub end_time: Option<DateTime<Utc>>,

    /// Total wall-clock time spent in the attempt's phases, in milliseconds,
    /// rounded down.
    pub duration_ms: u64,

    /// The attempt's result.
    pub result: TestAttemptResult,
}

/// All attempts of a single test within a run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestRunRecord {
    /// The file the test lives in.
    pub filename: Utf8PathBuf,

    /// The hierarchical name of the test within `filename`.
    pub name: Vec<SmolStr>,

    /// The attempts, in execution order. Never empty: tests with no
    /// reportable attempts are omitted from the report entirely.
    pub attempts: Vec<TestRunAttemptRecord>,
}

/// The run report uploaded at the end of a run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CreateRunRequest {
    /// Version-control branch, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Version-control commit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    /// When the run started.
    #[serde(with = "rfc3339_micros")]
    pub start_time: DateTime<Utc>,

    /// When the run ended.
    #[serde(with = "rfc3339_micros")]
    pub end_time: DateTime<Utc>,

    /// Per-test attempt records.
    pub test_runs: Vec<TestRunRecord>,
}

/// Response body for the upload-slot request: the first step of the two-phase
/// upload protocol.
///
/// The pre-signed URL itself arrives in the `Location` response header.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UploadSlotResponse {
    /// Identifier tying the uploaded payload to the finalize request.
    pub upload_id: String,
}

/// Request body for the run-finalize call: the last step of the two-phase
/// upload protocol.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRunRequest {
    /// The `upload_id` returned by the upload-slot request.
    pub upload_id: String,
}

/// Summary of a created run, returned by the finalize call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Server-side identifier for the run.
    pub run_id: String,

    /// The suite the run belongs to.
    pub suite_id: String,

    /// Branch recorded for the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Commit recorded for the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Serializes timestamps as RFC 3339 with exactly six fractional digits.
///
/// Report JSON must be byte-identical across repeated serializations of the
/// same data, so the precision is fixed rather than left to chrono's
/// shortest-representation default.
pub mod rfc3339_micros {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

    /// Serializes a timestamp with fixed microsecond precision.
    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    /// Deserializes any valid RFC 3339 timestamp.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|time| time.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

/// [`rfc3339_micros`] lifted over `Option`.
pub mod rfc3339_micros_opt {
    use super::rfc3339_micros;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes an optional timestamp with fixed microsecond precision.
    pub fn serialize<S>(time: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(time) => rfc3339_micros::serialize(time, serializer),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes an optional RFC 3339 timestamp.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "rfc3339_micros")] DateTime<Utc>);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(time)| time))
    }
}
