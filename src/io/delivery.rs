//! Delivery channel abstraction
//!
//! A channel owns a persistent authenticated session to the telemetry
//! ingress. The publish loop is generic over this trait so the transport
//! can be swapped for a recording double in tests.

use crate::domain::error::{ConnectError, PublishError};
use crate::domain::types::Identity;
use async_trait::async_trait;
use std::fs;

/// Transport-level delivery guarantee for a single publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    AtMostOnce,
    AtLeastOnce,
}

/// Publish accepted by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    pub bytes: usize,
}

/// Paths to the mutual-TLS material for the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsCredentials {
    cert_path: String,
    key_path: String,
    ca_path: String,
}

/// Certificate material read from disk
pub struct LoadedCredentials {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub ca: Vec<u8>,
}

impl TlsCredentials {
    pub fn new(cert_path: &str, key_path: &str, ca_path: &str) -> Self {
        Self {
            cert_path: cert_path.to_string(),
            key_path: key_path.to_string(),
            ca_path: ca_path.to_string(),
        }
    }

    /// Human-readable name and path of each credential file
    pub fn files(&self) -> Vec<(&'static str, String)> {
        vec![
            ("certificate", self.cert_path.clone()),
            ("private key", self.key_path.clone()),
            ("root CA", self.ca_path.clone()),
        ]
    }

    pub fn load(&self) -> Result<LoadedCredentials, ConnectError> {
        Ok(LoadedCredentials {
            cert: read_credential("certificate", &self.cert_path)?,
            key: read_credential("private key", &self.key_path)?,
            ca: read_credential("root CA", &self.ca_path)?,
        })
    }
}

fn read_credential(name: &'static str, path: &str) -> Result<Vec<u8>, ConnectError> {
    fs::read(path).map_err(|source| ConnectError::Credentials { name, path: path.to_string(), source })
}

/// Persistent secure transport to the telemetry ingress
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Live session handle, owned by the publish loop
    type Session: Send + Sync;

    /// Establish an authenticated session. Called once at startup; failure is fatal.
    async fn connect(
        &self,
        credentials: &TlsCredentials,
        identity: &Identity,
    ) -> Result<Self::Session, ConnectError>;

    async fn publish(
        &self,
        session: &Self::Session,
        topic: &str,
        payload: &[u8],
        guarantee: DeliveryGuarantee,
    ) -> Result<Ack, PublishError>;

    /// Graceful teardown on shutdown
    async fn disconnect(&self, session: Self::Session) -> Result<(), PublishError>;
}
