//! HTTP client for the analysis service.
//!
//! Used by the symbol indexer and the call-graph builder. Timeouts scale
//! with batch size; a timed-out batch is retried once at half size, and a
//! connection failure is retried once after a backoff, after which the
//! caller fails the current package.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::EngineError;
use crate::service::protocol::{
    AnalyzeRequest, AnalyzeResponse, HealthResponse, IndexBatchRequest, IndexBatchResponse,
    IndexRecord, ShutdownResponse,
};
use crate::service::{DEFAULT_HOST, DEFAULT_PORT};

/// Base allowance per request, before the per-class component.
const BASE_TIMEOUT: Duration = Duration::from_secs(10);
/// Additional allowance per class file in a batch.
const PER_CLASS_TIMEOUT: Duration = Duration::from_millis(50);
/// Pause before the single reconnect retry.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub fn default_base_url() -> String {
    format!("http://{}:{}", DEFAULT_HOST, DEFAULT_PORT)
}

/// Blocking client over the analyzer's loopback endpoint.
pub struct AnalyzerClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl AnalyzerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // Per-request timeouts are set on each call; a builder-level default
        // would cap large batches too early.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Readiness probe. A failure here means the service is not running.
    pub fn health(&self) -> Result<HealthResponse, EngineError> {
        let url = format!("{}/health", self.base_url);
        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| EngineError::AnalyzerUnavailable(e.to_string()))
    }

    /// Index a batch of class files, returning per-file records in input
    /// order.
    pub fn index_batch(&self, class_files: &[PathBuf]) -> Result<Vec<IndexRecord>, EngineError> {
        match self.index_batch_once(class_files) {
            Ok(response) => Ok(response.results),
            Err(err) if err.is_timeout && class_files.len() >= 2 => {
                warn!(
                    batch = class_files.len(),
                    "index batch timed out, retrying at half size"
                );
                let (left, right) = class_files.split_at(class_files.len() / 2);
                let mut results = self
                    .index_batch_once(left)
                    .map_err(RequestError::unavailable)?
                    .results;
                results.extend(
                    self.index_batch_once(right)
                        .map_err(RequestError::unavailable)?
                        .results,
                );
                Ok(results)
            }
            Err(err) if err.is_connect => {
                warn!(error = %err.message, "analyzer connection failed, retrying after backoff");
                std::thread::sleep(RETRY_BACKOFF);
                self.index_batch_once(class_files)
                    .map(|response| response.results)
                    .map_err(RequestError::unavailable)
            }
            Err(err) => Err(err.unavailable()),
        }
    }

    fn index_batch_once(
        &self,
        class_files: &[PathBuf],
    ) -> Result<IndexBatchResponse, RequestError> {
        self.post_once(
            "/index/batch",
            &IndexBatchRequest {
                class_files: class_files.to_vec(),
            },
            batch_timeout(class_files.len()),
        )
    }

    /// Analyze a batch of class files. Same retry discipline as
    /// [`AnalyzerClient::index_batch`].
    pub fn analyze(
        &self,
        class_files: &[PathBuf],
        domains: &[String],
    ) -> Result<AnalyzeResponse, EngineError> {
        match self.analyze_once(class_files, domains) {
            Ok(response) => Ok(response),
            Err(err) if err.is_timeout && class_files.len() >= 2 => {
                warn!(
                    batch = class_files.len(),
                    "analyze batch timed out, retrying at half size"
                );
                let (left, right) = class_files.split_at(class_files.len() / 2);
                let mut merged = self
                    .analyze_once(left, domains)
                    .map_err(RequestError::unavailable)?;
                let rest = self
                    .analyze_once(right, domains)
                    .map_err(RequestError::unavailable)?;
                merged.classes.extend(rest.classes);
                merged.failures.extend(rest.failures);
                Ok(merged)
            }
            Err(err) if err.is_connect => {
                warn!(error = %err.message, "analyzer connection failed, retrying after backoff");
                std::thread::sleep(RETRY_BACKOFF);
                self.analyze_once(class_files, domains)
                    .map_err(RequestError::unavailable)
            }
            Err(err) => Err(err.unavailable()),
        }
    }

    fn analyze_once(
        &self,
        class_files: &[PathBuf],
        domains: &[String],
    ) -> Result<AnalyzeResponse, RequestError> {
        let request = AnalyzeRequest {
            class_files: Some(class_files.to_vec()),
            domains: if domains.is_empty() {
                None
            } else {
                Some(domains.to_vec())
            },
            ..Default::default()
        };
        self.post_once("/analyze", &request, batch_timeout(class_files.len()))
    }

    /// Ask a running service to exit.
    pub fn shutdown(&self) -> Result<ShutdownResponse, EngineError> {
        let url = format!("{}/shutdown", self.base_url);
        self.client
            .post(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| EngineError::AnalyzerUnavailable(e.to_string()))
    }

    fn post_once<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<R, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(RequestError::from)?
            .error_for_status()
            .map_err(RequestError::from)?;
        response.json().map_err(RequestError::from)
    }
}

fn batch_timeout(class_count: usize) -> Duration {
    BASE_TIMEOUT + PER_CLASS_TIMEOUT * class_count as u32
}

struct RequestError {
    message: String,
    is_timeout: bool,
    is_connect: bool,
}

impl RequestError {
    fn unavailable(self) -> EngineError {
        EngineError::AnalyzerUnavailable(self.message)
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}
