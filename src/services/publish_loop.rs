//! Acquisition-normalization-publish loop
//!
//! State machine:
//! ```text
//! Connecting --connect ok--> Running --shutdown--> Stopping --disconnect--> Stopped
//!     |
//!     +--connect err--> Failed
//! ```
//!
//! One tick runs at a time: read, normalize, assemble, publish, then sleep
//! for the full interval. Per-tick failures are logged and contained; only a
//! failed initial connect ends the loop with an error.

use crate::domain::error::{ConnectError, PublishError, SourceError};
use crate::domain::types::{format_timestamp, Identity, OutboundMessage, RawReading};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::delivery::{Ack, DeliveryChannel, DeliveryGuarantee, TlsCredentials};
use crate::io::mock_source::MockGenerator;
use crate::io::source::{FailurePolicy, SourceReader};
use crate::services::assembler::MessageAssembler;
use crate::services::normalizer::FieldNormalizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Connecting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Connecting => "connecting",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
            LoopState::Failed => "failed",
        }
    }
}

/// What happened during one tick
#[derive(Debug)]
pub enum TickOutcome {
    Published(Ack),
    Skipped(SourceError),
    PublishFailed(PublishError),
}

/// Immutable inputs the loop needs besides its collaborators
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub identity: Identity,
    pub credentials: TlsCredentials,
    pub topic: String,
    pub interval: Duration,
    pub capacity: u32,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            identity: config.identity(),
            credentials: config.credentials(),
            topic: config.mqtt_topic().to_string(),
            interval: config.publish_interval(),
            capacity: config.capacity(),
        }
    }
}

pub struct PublishLoop<D: DeliveryChannel> {
    channel: D,
    source: Box<dyn SourceReader>,
    fallback: MockGenerator,
    normalizer: FieldNormalizer,
    assembler: MessageAssembler,
    credentials: TlsCredentials,
    topic: String,
    interval: Duration,
    metrics: Arc<Metrics>,
    state: LoopState,
}

/// Resolves once shutdown has been requested
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone without requesting shutdown: nothing can cancel us anymore
            std::future::pending::<()>().await;
        }
    }
}

impl<D: DeliveryChannel> PublishLoop<D> {
    pub fn new(
        channel: D,
        source: Box<dyn SourceReader>,
        settings: LoopSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let LoopSettings { identity, credentials, topic, interval, capacity } = settings;
        Self {
            channel,
            source,
            fallback: MockGenerator::new(),
            normalizer: FieldNormalizer::new(capacity),
            assembler: MessageAssembler::new(identity),
            credentials,
            topic,
            interval,
            metrics,
            state: LoopState::Connecting,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = %self.state.as_str(), to = %next.as_str(), "loop_state");
        self.state = next;
    }

    /// Connect, run ticks until shutdown, then disconnect.
    ///
    /// Returns an error only when the initial connect fails.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectError> {
        self.transition(LoopState::Connecting);
        let identity = self.assembler.identity().clone();
        let session = match self.channel.connect(&self.credentials, &identity).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "connect_failed");
                self.transition(LoopState::Failed);
                return Err(e);
            }
        };

        self.transition(LoopState::Running);
        info!(
            topic = %self.topic,
            source = %self.source.describe(),
            interval_secs = %self.interval.as_secs(),
            "publish_loop_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick(&session).await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.transition(LoopState::Stopping);
        info!("publish_loop_stopping");
        if let Err(e) = self.channel.disconnect(session).await {
            // Process is exiting regardless
            warn!(error = %e, "disconnect_failed");
        }
        self.transition(LoopState::Stopped);
        info!("publish_loop_stopped");
        Ok(())
    }

    /// Run one read-normalize-assemble-publish cycle
    pub async fn tick(&self, session: &D::Session) -> TickOutcome {
        self.metrics.record_tick();

        let raw = match self.acquire().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    source = %self.source.describe(),
                    reason = %e.reason(),
                    error = %e,
                    "tick_skipped"
                );
                self.metrics.record_skipped();
                return TickOutcome::Skipped(e);
            }
        };

        let message = self.assembler.assemble(self.normalizer.normalize(&raw));
        let result = match message.to_json() {
            Ok(payload) => {
                self.channel
                    .publish(session, &self.topic, payload.as_bytes(), DeliveryGuarantee::AtLeastOnce)
                    .await
            }
            Err(e) => Err(PublishError::from(e)),
        };

        match result {
            Ok(ack) => {
                log_published(&message, &ack);
                self.metrics.record_published();
                TickOutcome::Published(ack)
            }
            Err(e) => {
                error!(topic = %self.topic, error = %e, "publish_failed");
                self.metrics.record_publish_failed();
                TickOutcome::PublishFailed(e)
            }
        }
    }

    /// Read from the configured source, applying its failure policy
    async fn acquire(&self) -> Result<RawReading, SourceError> {
        match self.source.read().await {
            Ok(raw) => Ok(raw),
            Err(e) => match self.source.failure_policy() {
                FailurePolicy::SkipTick => Err(e),
                FailurePolicy::FallbackToMock => {
                    warn!(
                        source = %self.source.describe(),
                        reason = %e.reason(),
                        error = %e,
                        "source_failed_using_mock"
                    );
                    self.metrics.record_mock_fallback();
                    Ok(self.fallback.generate_now())
                }
            },
        }
    }
}

fn log_published(message: &OutboundMessage, ack: &Ack) {
    let sensors = &message.sensors;
    let pressure = sensors.pressure.map(|p| format!("{:.1}", p)).unwrap_or_else(|| "-".into());
    let occupancy = message
        .occupancy
        .map(|o| format!("{}/{} ({:.1}%)", o.current, o.capacity, o.fill_percent()))
        .unwrap_or_else(|| "-".into());
    let now_playing = message
        .now_playing
        .as_ref()
        .map(|np| format!("{} - {}", np.title, np.artist))
        .unwrap_or_else(|| "-".into());

    info!(
        topic = %ack.topic,
        bytes = %ack.bytes,
        timestamp = %format_timestamp(&message.timestamp),
        sound_db = %format!("{:.1}", sensors.sound_level),
        light_lux = %format!("{:.1}", sensors.light_level),
        indoor_f = %format!("{:.1}", sensors.indoor_temperature),
        outdoor_f = %format!("{:.1}", sensors.outdoor_temperature),
        humidity_pct = %format!("{:.1}", sensors.humidity),
        pressure_hpa = %pressure,
        occupancy = %occupancy,
        now_playing = %now_playing,
        "tick_published"
    );
}
