//! Domain models - canonical telemetry types and error taxonomy
//!
//! - `types` - RawReading, normalized sensor groups, OutboundMessage, Identity
//! - `error` - startup (fatal) and per-tick (recoverable) errors

pub mod error;
pub mod types;

pub use error::{ConfigError, ConnectError, PublishError, SourceError, StartupError};
pub use types::{
    Identity, Normalized, NormalizedSensors, NowPlayingInfo, OccupancyInfo, OutboundMessage,
    RawReading, SourceKind,
};
