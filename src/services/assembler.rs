//! Outbound message assembly

use crate::domain::types::{Identity, Normalized, OutboundMessage};
use chrono::{DateTime, Utc};

/// Stamps normalized readings with device identity and assembly time
#[derive(Debug, Clone)]
pub struct MessageAssembler {
    identity: Identity,
}

impl MessageAssembler {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn assemble(&self, normalized: Normalized) -> OutboundMessage {
        self.assemble_at(normalized, Utc::now())
    }

    pub fn assemble_at(&self, normalized: Normalized, timestamp: DateTime<Utc>) -> OutboundMessage {
        let Normalized { sensors, occupancy, now_playing } = normalized;
        OutboundMessage {
            device_id: self.identity.device_id().to_string(),
            venue_id: self.identity.venue_id().to_string(),
            timestamp,
            sensors,
            occupancy,
            now_playing,
        }
    }
}
