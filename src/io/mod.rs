//! IO modules - external system interfaces
//!
//! - `source` - SourceReader trait and source selection
//! - `mock_source` - time-seeded mock generator
//! - `http_source` - local sensor HTTP API reader
//! - `file_source` - shared on-disk JSON snapshot reader
//! - `delivery` - DeliveryChannel trait and TLS credentials
//! - `mqtt_delivery` - MQTT over mutual TLS channel

pub mod delivery;
pub mod file_source;
pub mod http_source;
pub mod mock_source;
pub mod mqtt_delivery;
pub mod source;

// Re-export commonly used types
pub use delivery::{Ack, DeliveryChannel, DeliveryGuarantee, TlsCredentials};
pub use file_source::SharedFileReader;
pub use http_source::HttpApiReader;
pub use mock_source::MockGenerator;
pub use mqtt_delivery::{MqttChannel, MqttSettings};
pub use source::{build_source, FailurePolicy, SourceReader};
