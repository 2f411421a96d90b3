//! Shared sensor file reader
//!
//! Another process on the device rewrites a JSON snapshot in place. This
//! reader only ever reads it; a missing file or a half-written document is a
//! per-tick failure, never stale data.

use crate::domain::error::SourceError;
use crate::domain::types::{RawReading, SourceKind};
use crate::io::source::{parse_object, SourceReader};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on a single file read (stalled network mounts)
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SharedFileReader {
    path: PathBuf,
}

impl SharedFileReader {
    pub fn new(path: &str) -> Self {
        Self { path: PathBuf::from(path) }
    }
}

#[async_trait]
impl SourceReader for SharedFileReader {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> Result<RawReading, SourceError> {
        let path = self.describe();
        let bytes = match tokio::time::timeout(READ_TIMEOUT, tokio::fs::read(&self.path)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(SourceError::FileMissing { path });
            }
            Ok(Err(source)) => return Err(SourceError::Io { path, source }),
            Err(_) => {
                return Err(SourceError::Timeout {
                    origin: path,
                    timeout_ms: READ_TIMEOUT.as_millis() as u64,
                })
            }
        };
        parse_object(SourceKind::File, &path, &bytes)
    }
}
