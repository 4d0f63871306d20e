// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The quarantine service API client: manifest fetches and the two-phase run
//! upload, with shared retry/backoff handling.
//!
//! Network calls are synchronous and happen only at well-defined points (run
//! start for the manifest fetch, run end for the upload), never interleaved
//! with test-phase classification.

use crate::{
    config::TrackerConfig,
    errors::{ApiError, TransportError},
};
use flate2::{Compression, write::GzEncoder};
use flaketrack_metadata::{
    CreateRunRequest, FinalizeRunRequest, RunSummary, TestSuiteManifest, UploadSlotResponse,
};
use serde::de::DeserializeOwned;
use std::{
    io::{Read, Write},
    time::Duration,
};
use tracing::{debug, warn};
use ureq::Agent;

/// The default service base URL.
pub const DEFAULT_BASE_URL: &str = "https://app.flaketrack.dev";

/// Total attempts permitted per request, including the first.
const MAX_ATTEMPTS: usize = 3;

/// HTTP statuses that are worth retrying. Anything else non-2xx is fatal
/// immediately.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The HTTP methods the client uses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
}

/// A request as handed to the transport.
#[derive(Clone, Debug)]
pub struct ApiRequest<'a> {
    /// The HTTP method.
    pub method: Method,

    /// The absolute request URL.
    pub url: &'a str,

    /// Request headers.
    pub headers: Vec<(&'static str, String)>,

    /// Request body, if any.
    pub body: Option<&'a [u8]>,
}

/// A response as returned by the transport.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    /// The HTTP status code.
    pub status: u16,

    /// The `Location` response header, when present. The only response
    /// header the protocol consumes.
    pub location: Option<String>,

    /// The response body.
    pub body: Vec<u8>,
}

/// The HTTP transport seam.
///
/// Production code uses [`UreqTransport`]; tests substitute a scripted
/// transport to exercise the retry policy and upload protocol without a
/// network.
pub trait Transport {
    /// Executes one request. Non-2xx statuses are returned as responses, not
    /// errors; errors mean the request produced no HTTP status at all.
    fn execute(&self, request: &ApiRequest<'_>) -> Result<ApiResponse, TransportError>;

    /// Sleeps between retry attempts.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// [`Transport`] implementation backed by a blocking ureq agent.
#[derive(Debug)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// Creates a transport. `insecure_disable_tls_validation` is for local
    /// testing against self-signed endpoints only.
    pub fn new(insecure_disable_tls_validation: bool) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(insecure_disable_tls_validation)
                    .build(),
            )
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &ApiRequest<'_>) -> Result<ApiResponse, TransportError> {
        let result = match request.method {
            Method::Get => {
                let mut call = self.agent.get(request.url);
                for (name, value) in &request.headers {
                    call = call.header(*name, value.as_str());
                }
                call.call()
            }
            Method::Post => {
                let mut call = self.agent.post(request.url);
                for (name, value) in &request.headers {
                    call = call.header(*name, value.as_str());
                }
                call.send(request.body.unwrap_or_default())
            }
            Method::Put => {
                let mut call = self.agent.put(request.url);
                for (name, value) in &request.headers {
                    call = call.header(*name, value.as_str());
                }
                call.send(request.body.unwrap_or_default())
            }
        };

        let mut response = result.map_err(|err| match err {
            ureq::Error::Timeout(_) => TransportError::Timeout,
            other => TransportError::Connect {
                message: other.to_string(),
            },
        })?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let mut body = Vec::new();
        response
            .body_mut()
            .as_reader()
            .read_to_end(&mut body)
            .map_err(|err| TransportError::Connect {
                message: err.to_string(),
            })?;

        Ok(ApiResponse {
            status,
            location,
            body,
        })
    }
}

/// Client for the quarantine service.
#[derive(Debug)]
pub struct ApiClient<T = UreqTransport> {
    transport: T,
    base_url: String,
    api_key: String,
    client_id: String,
}

impl ApiClient<UreqTransport> {
    /// Creates a client with the production transport.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            UreqTransport::new(config.insecure_disable_tls_validation),
            config,
        )
    }
}

impl<T: Transport> ApiClient<T> {
    /// Creates a client over the given transport.
    pub fn new(transport: T, config: &TrackerConfig) -> Self {
        Self {
            transport,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            api_key: config.api_key.clone(),
            client_id: client_string(&config.host_runner),
        }
    }

    /// Fetches the quarantine manifest for a suite.
    pub fn fetch_manifest(&self, suite_id: &str) -> Result<TestSuiteManifest, ApiError> {
        let url = format!("{}/api/v1/test-suites/{suite_id}/manifest", self.base_url);
        debug!(suite_id, "fetching quarantine manifest");
        let response = self.execute_with_retry(&ApiRequest {
            method: Method::Get,
            url: &url,
            headers: self.authed_headers(),
            body: None,
        })?;
        parse_json(&url, &response.body)
    }

    /// Uploads a run report using the two-phase protocol: request an upload
    /// slot, PUT the gzipped payload to the returned pre-signed URL, then
    /// finalize the run.
    ///
    /// Each step independently applies the retry policy; a fatal or
    /// exhausted-retry failure at any step aborts the whole call. Partial
    /// uploads are not resumed or cleaned up.
    pub fn create_run(
        &self,
        suite_id: &str,
        request: &CreateRunRequest,
    ) -> Result<RunSummary, ApiError> {
        let payload = gzip_payload(request)?;
        debug!(
            suite_id,
            test_runs = request.test_runs.len(),
            compressed_bytes = payload.len(),
            "uploading run report"
        );

        let slot_url = format!(
            "{}/api/v1/test-suites/{suite_id}/runs/upload",
            self.base_url
        );
        let slot_response = self.execute_with_retry(&ApiRequest {
            method: Method::Post,
            url: &slot_url,
            headers: self.authed_headers(),
            body: None,
        })?;
        let presigned_url = slot_response
            .location
            .as_deref()
            .ok_or_else(|| ApiError::MissingLocation {
                url: slot_url.clone(),
            })?;
        let slot: UploadSlotResponse = parse_json(&slot_url, &slot_response.body)?;

        // The pre-signed URL is self-authorizing; no Bearer header.
        let mut put_headers = self.base_headers();
        put_headers.push(("Content-Encoding", "gzip".to_owned()));
        put_headers.push(("Content-Type", "application/json".to_owned()));
        self.execute_with_retry(&ApiRequest {
            method: Method::Put,
            url: presigned_url,
            headers: put_headers,
            body: Some(&payload),
        })?;

        let finalize_url = format!("{}/api/v1/test-suites/{suite_id}/runs", self.base_url);
        let finalize_body = serde_json::to_vec(&FinalizeRunRequest {
            upload_id: slot.upload_id,
        })
        .map_err(|source| ApiError::ReportSerialize { source })?;
        let mut finalize_headers = self.authed_headers();
        finalize_headers.push(("Content-Type", "application/json".to_owned()));
        let response = self.execute_with_retry(&ApiRequest {
            method: Method::Post,
            url: &finalize_url,
            headers: finalize_headers,
            body: Some(&finalize_body),
        })?;
        parse_json(&finalize_url, &response.body)
    }

    /// Runs one request under the shared retry policy: up to
    /// [`MAX_ATTEMPTS`] attempts, retrying only transport failures and
    /// [`RETRYABLE_STATUSES`], sleeping `2^attempt` seconds between attempts.
    fn execute_with_retry(&self, request: &ApiRequest<'_>) -> Result<ApiResponse, ApiError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1));
                debug!(
                    url = request.url,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying request after backoff"
                );
                self.transport.sleep(delay);
            }
            let last_attempt = attempt + 1 >= MAX_ATTEMPTS;
            match self.transport.execute(request) {
                Ok(response) if (200..300).contains(&response.status) => return Ok(response),
                Ok(response) if RETRYABLE_STATUSES.contains(&response.status) => {
                    if last_attempt {
                        return Err(ApiError::RetriesExhausted {
                            url: request.url.to_owned(),
                            status: response.status,
                            attempts: MAX_ATTEMPTS,
                        });
                    }
                    warn!(
                        url = request.url,
                        status = response.status,
                        "request failed with retryable status"
                    );
                }
                Ok(response) => {
                    return Err(ApiError::FatalStatus {
                        url: request.url.to_owned(),
                        status: response.status,
                    });
                }
                Err(err) => {
                    if last_attempt {
                        return Err(match err {
                            TransportError::Timeout => ApiError::Timeout {
                                url: request.url.to_owned(),
                            },
                            TransportError::Connect { message } => ApiError::Connect {
                                url: request.url.to_owned(),
                                message,
                            },
                        });
                    }
                    warn!(url = request.url, %err, "request failed");
                }
            }
            attempt += 1;
        }
    }

    fn base_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("User-Agent", self.client_id.clone()),
            ("X-Flaketrack-Client", self.client_id.clone()),
        ]
    }

    fn authed_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = self.base_headers();
        headers.push(("Authorization", format!("Bearer {}", self.api_key)));
        headers
    }
}

/// The human-readable URL of an uploaded run.
pub fn run_url(base_url: Option<&str>, suite_id: &str, run_id: &str) -> String {
    format!(
        "{}/test-suites/{suite_id}/runs/{run_id}",
        base_url.unwrap_or(DEFAULT_BASE_URL)
    )
}

/// The client identification string sent with every request: package
/// version, host runner description, and platform.
pub fn client_string(host_runner: &str) -> String {
    format!(
        "flaketrack-runner/{} ({host_runner}; {}-{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

/// Serializes and gzip-compresses the run report payload.
pub fn gzip_payload(request: &CreateRunRequest) -> Result<Vec<u8>, ApiError> {
    let json = serde_json::to_vec(request).map_err(|source| ApiError::ReportSerialize { source })?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|source| ApiError::Compress { source })?;
    encoder
        .finish()
        .map_err(|source| ApiError::Compress { source })
}

fn parse_json<D: DeserializeOwned>(url: &str, body: &[u8]) -> Result<D, ApiError> {
    serde_json::from_slice(body).map_err(|source| ApiError::InvalidResponse {
        url: url.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::VecDeque};

    #[derive(Debug)]
    struct RecordedRequest {
        method: Method,
        url: String,
        headers: Vec<(&'static str, String)>,
        body: Option<Vec<u8>>,
    }

    impl RecordedRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        }
    }

    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: RefCell<VecDeque<Result<ApiResponse, TransportError>>>,
        requests: RefCell<Vec<RecordedRequest>>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl ScriptedTransport {
        fn push_status(&self, status: u16) {
            self.responses.borrow_mut().push_back(Ok(ApiResponse {
                status,
                location: None,
                body: Vec::new(),
            }));
        }

        fn push_json(&self, status: u16, location: Option<&str>, body: &str) {
            self.responses.borrow_mut().push_back(Ok(ApiResponse {
                status,
                location: location.map(str::to_owned),
                body: body.as_bytes().to_vec(),
            }));
        }

        fn push_error(&self, error: TransportError) {
            self.responses.borrow_mut().push_back(Err(error));
        }

        fn sleep_seconds(&self) -> Vec<u64> {
            self.sleeps.borrow().iter().map(Duration::as_secs).collect()
        }
    }

    impl Transport for &ScriptedTransport {
        fn execute(&self, request: &ApiRequest<'_>) -> Result<ApiResponse, TransportError> {
            self.requests.borrow_mut().push(RecordedRequest {
                method: request.method,
                url: request.url.to_owned(),
                headers: request.headers.clone(),
                body: request.body.map(<[u8]>::to_vec),
            });
            self.responses
                .borrow_mut()
                .pop_front()
                .expect("transport script ran out of responses")
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    fn client(transport: &ScriptedTransport) -> ApiClient<&ScriptedTransport> {
        let mut config = TrackerConfig::new("SUITE_1", "secret-key");
        config.base_url = Some("https://api.test".to_owned());
        config.host_runner = "hosttest 1.2.3".to_owned();
        ApiClient::new(transport, &config)
    }

    fn empty_report() -> CreateRunRequest {
        let time = Utc.with_ymd_and_hms(2024, 3, 5, 17, 0, 0).unwrap();
        CreateRunRequest {
            branch: Some("main".to_owned()),
            commit: None,
            start_time: time,
            end_time: time,
            test_runs: Vec::new(),
        }
    }

    #[test]
    fn fetch_manifest_retries_with_exponential_backoff() {
        let transport = ScriptedTransport::default();
        transport.push_status(503);
        transport.push_status(503);
        transport.push_json(200, None, r#"{"quarantined_tests":[]}"#);

        let manifest = client(&transport).fetch_manifest("SUITE_1").unwrap();
        assert_eq!(manifest, TestSuiteManifest::default());
        assert_eq!(transport.sleep_seconds(), vec![1, 2]);

        let requests = transport.requests.borrow();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[0].url,
            "https://api.test/api/v1/test-suites/SUITE_1/manifest"
        );
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].header("Authorization"), Some("Bearer secret-key"));
        let user_agent = requests[0].header("User-Agent").unwrap();
        assert!(user_agent.starts_with("flaketrack-runner/"), "{user_agent}");
        assert!(user_agent.contains("hosttest 1.2.3"), "{user_agent}");
    }

    #[test]
    fn fatal_status_fails_without_retry() {
        let transport = ScriptedTransport::default();
        transport.push_status(401);

        let err = client(&transport).fetch_manifest("SUITE_1").unwrap_err();
        assert!(matches!(err, ApiError::FatalStatus { status: 401, .. }));
        assert!(!err.is_transient());
        assert_eq!(transport.requests.borrow().len(), 1);
        assert!(transport.sleep_seconds().is_empty());
    }

    #[test]
    fn exhausted_retries_surface_the_last_status() {
        let transport = ScriptedTransport::default();
        for _ in 0..3 {
            transport.push_status(429);
        }

        let err = client(&transport).fetch_manifest("SUITE_1").unwrap_err();
        assert!(matches!(
            err,
            ApiError::RetriesExhausted { status: 429, attempts: 3, .. }
        ));
        assert!(err.is_transient());
        assert_eq!(transport.sleep_seconds(), vec![1, 2]);
    }

    #[test]
    fn timeout_retries_then_succeeds() {
        let transport = ScriptedTransport::default();
        transport.push_error(TransportError::Timeout);
        transport.push_json(200, None, r#"{"quarantined_tests":[]}"#);

        client(&transport).fetch_manifest("SUITE_1").unwrap();
        assert_eq!(transport.sleep_seconds(), vec![1]);
    }

    #[test]
    fn create_run_walks_the_three_step_protocol() {
        let transport = ScriptedTransport::default();
        transport.push_json(
            201,
            Some("https://uploads.test/presigned/abc"),
            r#"{"upload_id":"UPLOAD_1"}"#,
        );
        transport.push_status(200);
        transport.push_json(201, None, r#"{"run_id":"RUN_1","suite_id":"SUITE_1"}"#);

        let report = empty_report();
        let summary = client(&transport).create_run("SUITE_1", &report).unwrap();
        assert_eq!(summary.run_id, "RUN_1");
        assert_eq!(summary.suite_id, "SUITE_1");

        let requests = transport.requests.borrow();
        assert_eq!(requests.len(), 3);

        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(
            requests[0].url,
            "https://api.test/api/v1/test-suites/SUITE_1/runs/upload"
        );
        assert_eq!(requests[0].header("Authorization"), Some("Bearer secret-key"));

        // The PUT goes to the pre-signed URL, unauthenticated, gzipped.
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[1].url, "https://uploads.test/presigned/abc");
        assert_eq!(requests[1].header("Authorization"), None);
        assert_eq!(requests[1].header("Content-Encoding"), Some("gzip"));
        assert_eq!(requests[1].header("Content-Type"), Some("application/json"));

        let mut decoder = flate2::read::GzDecoder::new(requests[1].body.as_deref().unwrap());
        let mut decompressed = String::new();
        decoder.read_to_string(&mut decompressed).unwrap();
        assert_eq!(
            decompressed,
            serde_json::to_string(&report).unwrap(),
            "gzip round-trip reproduces the report JSON exactly"
        );

        assert_eq!(requests[2].method, Method::Post);
        assert_eq!(
            requests[2].url,
            "https://api.test/api/v1/test-suites/SUITE_1/runs"
        );
        assert_eq!(
            requests[2].body.as_deref(),
            Some(br#"{"upload_id":"UPLOAD_1"}"#.as_slice())
        );
    }

    #[test]
    fn slot_retries_complete_before_any_put() {
        let transport = ScriptedTransport::default();
        transport.push_status(503);
        transport.push_status(503);
        transport.push_json(
            201,
            Some("https://uploads.test/presigned/abc"),
            r#"{"upload_id":"UPLOAD_1"}"#,
        );
        transport.push_status(200);
        transport.push_json(201, None, r#"{"run_id":"RUN_1","suite_id":"SUITE_1"}"#);

        client(&transport).create_run("SUITE_1", &empty_report()).unwrap();

        assert_eq!(transport.sleep_seconds(), vec![1, 2]);
        let requests = transport.requests.borrow();
        let slot_url = "https://api.test/api/v1/test-suites/SUITE_1/runs/upload";
        assert_eq!(requests[0].url, slot_url);
        assert_eq!(requests[1].url, slot_url);
        assert_eq!(requests[2].url, slot_url);
        assert_eq!(requests[3].method, Method::Put);
    }

    #[test]
    fn missing_location_is_a_protocol_error() {
        let transport = ScriptedTransport::default();
        transport.push_json(201, None, r#"{"upload_id":"UPLOAD_1"}"#);

        let err = client(&transport)
            .create_run("SUITE_1", &empty_report())
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingLocation { .. }));
        assert!(!err.is_transient());
        // The upload aborts before the PUT.
        assert_eq!(transport.requests.borrow().len(), 1);
    }

    #[test]
    fn put_failure_aborts_before_finalize() {
        let transport = ScriptedTransport::default();
        transport.push_json(
            201,
            Some("https://uploads.test/presigned/abc"),
            r#"{"upload_id":"UPLOAD_1"}"#,
        );
        transport.push_status(403);

        let err = client(&transport)
            .create_run("SUITE_1", &empty_report())
            .unwrap_err();
        assert!(matches!(err, ApiError::FatalStatus { status: 403, .. }));
        assert_eq!(transport.requests.borrow().len(), 2);
    }

    #[test]
    fn run_url_uses_base_override() {
        assert_eq!(
            run_url(Some("https://api.test"), "SUITE_1", "RUN_1"),
            "https://api.test/test-suites/SUITE_1/runs/RUN_1"
        );
        assert_eq!(
            run_url(None, "SUITE_1", "RUN_1"),
            format!("{DEFAULT_BASE_URL}/test-suites/SUITE_1/runs/RUN_1")
        );
    }
}
