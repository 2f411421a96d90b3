//! Sensor source abstraction
//!
//! Every source produces one `RawReading` per call or a `SourceError`.
//! What the loop does with a failure is decided by the source's
//! `FailurePolicy`, so each variant keeps its own fallback behaviour.

use crate::domain::error::{ConfigError, SourceError};
use crate::domain::types::{RawReading, SourceKind};
use crate::infra::config::Config;
use crate::io::file_source::SharedFileReader;
use crate::io::http_source::HttpApiReader;
use crate::io::mock_source::MockGenerator;
use async_trait::async_trait;
use serde_json::Value;

/// How a failed read is handled for the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Publish nothing this tick
    SkipTick,
    /// Substitute a mock reading for this tick
    FallbackToMock,
}

#[async_trait]
pub trait SourceReader: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Where readings come from, for logs
    fn describe(&self) -> String;

    async fn read(&self) -> Result<RawReading, SourceError>;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::SkipTick
    }
}

/// Parse a JSON document into an object-shaped reading
pub(crate) fn parse_object(
    kind: SourceKind,
    origin: &str,
    body: &[u8],
) -> Result<RawReading, SourceError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SourceError::Malformed { origin: origin.to_string(), reason: e.to_string() })?;
    match value {
        Value::Object(fields) => Ok(RawReading::new(kind, fields)),
        other => Err(SourceError::Malformed {
            origin: origin.to_string(),
            reason: format!("expected a JSON object, got {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build the configured source
pub fn build_source(config: &Config) -> Result<Box<dyn SourceReader>, ConfigError> {
    match config.source_kind() {
        SourceKind::Mock => Ok(Box::new(MockGenerator::new())),
        SourceKind::Http => {
            let url = config
                .http_url()
                .ok_or(ConfigError::SourceIncomplete { kind: "http", field: "http_url" })?;
            let reader = HttpApiReader::new(url, config.http_timeout())
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
            Ok(Box::new(reader))
        }
        SourceKind::File => {
            let path = config
                .file_path()
                .ok_or(ConfigError::SourceIncomplete { kind: "file", field: "file_path" })?;
            Ok(Box::new(SharedFileReader::new(path)))
        }
    }
}
