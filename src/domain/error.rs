//! Error taxonomy
//!
//! `ConfigError` and `ConnectError` are fatal at startup. `SourceError` and
//! `PublishError` are contained within a single tick.

use thiserror::Error;

/// Invalid or incomplete startup configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("venue id is not configured (found {0:?})")]
    IdentityNotConfigured(String),

    #[error("device id is empty")]
    DeviceIdMissing,

    /// One entry per missing file, e.g. "root CA: /home/pi/certs/root-CA.crt"
    #[error("missing credential files: {}", .missing.join(", "))]
    CredentialsMissing { missing: Vec<String> },

    #[error("source kind '{kind}' requires [source] {field}")]
    SourceIncomplete { kind: &'static str, field: &'static str },

    #[error("publish interval must be greater than zero")]
    ZeroInterval,

    #[error("failed to build sensor API client: {0}")]
    HttpClient(String),
}

/// Initial transport handshake failure
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to read {name} file {path}")]
    Credentials {
        name: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {endpoint} failed: {reason}")]
    Handshake { endpoint: String, reason: String },

    #[error("broker at {endpoint} refused the connection: {code}")]
    Refused { endpoint: String, code: String },

    #[error("no CONNACK from {endpoint} within {secs}s")]
    Timeout { endpoint: String, secs: u64 },
}

/// A source could not produce a reading this tick
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sensor file not found: {path}")]
    FileMissing { path: String },

    #[error("malformed content from {origin}: {reason}")]
    Malformed { origin: String, reason: String },

    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sensor API unreachable at {origin}: {reason}")]
    Unreachable { origin: String, reason: String },

    #[error("no response from {origin} within {timeout_ms}ms")]
    Timeout { origin: String, timeout_ms: u64 },

    #[error("sensor API at {origin} returned HTTP {status}")]
    Status { origin: String, status: u16 },
}

impl SourceError {
    /// Stable short tag for log fields and counters
    pub fn reason(&self) -> &'static str {
        match self {
            SourceError::FileMissing { .. } => "file_missing",
            SourceError::Malformed { .. } => "malformed",
            SourceError::Io { .. } => "io",
            SourceError::Unreachable { .. } => "unreachable",
            SourceError::Timeout { .. } => "timeout",
            SourceError::Status { .. } => "http_status",
        }
    }
}

/// A single publish was not accepted by the transport
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize message")]
    Serialize(#[from] serde_json::Error),

    #[error("transport rejected publish to {topic}: {reason}")]
    Transport { topic: String, reason: String },

    #[error("session is closed")]
    SessionClosed,

    #[error("graceful disconnect failed: {reason}")]
    Disconnect { reason: String },
}

/// Anything that stops the agent before the publish loop starts running
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}
