//! Bounded-time HTTP fetch of a single source.
//!
//! A fetch never fails outward: every outcome, including network errors,
//! timeouts, non-200 answers and undecodable bodies, is normalized into a
//! [`FetchOutcome`].

use crate::error::FetchError;
use crate::models::{FetchOutcome, Params, Payload, SourceConfig};
use anyhow::{Context, Result};
use reqwest::header::HeaderName;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-source timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Header carrying the caller's identity, both inbound and outbound.
pub const DEFAULT_CALLER_HEADER: &str = "User-Agent";

/// Issues GET requests against sources through one shared connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http_client: reqwest::Client,
    caller_header: HeaderName,
}

impl Fetcher {
    /// Create a fetcher that sends the caller identity in `caller_header`.
    pub fn new(caller_header: &str) -> Result<Self> {
        let caller_header = HeaderName::from_bytes(caller_header.as_bytes())
            .with_context(|| format!("Invalid caller header name: {}", caller_header))?;

        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            caller_header,
        })
    }

    pub fn caller_header(&self) -> &HeaderName {
        &self.caller_header
    }

    /// Fetch one source and normalize the result.
    pub async fn fetch(
        &self,
        source: &str,
        config: &SourceConfig,
        params: &Params,
        caller: &str,
        timeout: Duration,
    ) -> FetchOutcome {
        debug!("[{}] GET {} with {} params", source, config.url, params.len());

        let start = Instant::now();
        let result = self.request(config, params, caller, timeout).await;
        let elapsed = start.elapsed();

        match result {
            Ok(payload) => {
                info!(
                    "[{}] responded in {}ms with URI: {}",
                    source,
                    elapsed.as_millis(),
                    config.url
                );
                FetchOutcome::Success {
                    source: source.to_string(),
                    elapsed,
                    payload,
                }
            }
            Err(cause) => {
                warn!("[{}] {} failure: {}", source, cause.category(), cause);
                FetchOutcome::Failure {
                    source: source.to_string(),
                    cause,
                }
            }
        }
    }

    async fn request(
        &self,
        config: &SourceConfig,
        params: &Params,
        caller: &str,
        timeout: Duration,
    ) -> Result<Payload, FetchError> {
        let mut request = self
            .http_client
            .get(&config.url)
            .query(params)
            .timeout(timeout);

        if !caller.is_empty() {
            request = request.header(self.caller_header.clone(), caller);
        }

        let response = request.send().await.map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::UnexpectedStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| classify(e, timeout))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout.as_millis())
    } else {
        FetchError::Network(error.to_string())
    }
}
