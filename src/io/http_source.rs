//! Local sensor API reader
//!
//! Issues a single GET per tick against the on-device sensor service and
//! expects a flat JSON object back.

use crate::domain::error::SourceError;
use crate::domain::types::{RawReading, SourceKind};
use crate::io::source::{parse_object, FailurePolicy, SourceReader};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpApiReader {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpApiReader {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder().timeout(timeout).http1_only().build()?;
        Ok(Self { client, url: url.to_string(), timeout })
    }

    fn classify(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout { origin: self.url.clone(), timeout_ms: self.timeout.as_millis() as u64 }
        } else {
            SourceError::Unreachable { origin: self.url.clone(), reason: e.to_string() }
        }
    }
}

#[async_trait]
impl SourceReader for HttpApiReader {
    fn kind(&self) -> SourceKind {
        SourceKind::Http
    }

    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn read(&self) -> Result<RawReading, SourceError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { origin: self.url.clone(), status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        parse_object(SourceKind::Http, &self.url, &body)
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::FallbackToMock
    }
}
