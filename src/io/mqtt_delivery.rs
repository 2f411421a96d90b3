//! MQTT over mutual TLS delivery channel
//!
//! Sessions are opened with clean session disabled so in-flight QoS 1
//! publishes survive brief reconnects. After the initial CONNACK the event
//! loop is driven by a background task that reconnects on transport errors.

use crate::domain::error::{ConnectError, PublishError};
use crate::domain::types::Identity;
use crate::io::delivery::{Ack, DeliveryChannel, DeliveryGuarantee, TlsCredentials};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, TlsConfiguration, Transport,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the client request queue; publishes fail fast once it is full
const REQUEST_QUEUE_CAPACITY: usize = 100;

/// Pause between reconnect attempts after an event loop error
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// How long disconnect waits for the event loop to flush the DISCONNECT packet
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl MqttSettings {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct MqttChannel {
    settings: MqttSettings,
}

pub struct MqttSession {
    client: AsyncClient,
    poller: JoinHandle<()>,
}

impl MqttChannel {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    fn options(
        &self,
        credentials: &TlsCredentials,
        identity: &Identity,
    ) -> Result<MqttOptions, ConnectError> {
        let loaded = credentials.load()?;

        let client_id = if self.settings.client_id.is_empty() {
            identity.device_id().to_string()
        } else {
            self.settings.client_id.clone()
        };
        let mut options = MqttOptions::new(client_id, &self.settings.host, self.settings.port);
        options.set_keep_alive(self.settings.keep_alive);
        options.set_clean_session(false);
        options.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca: loaded.ca,
            alpn: None,
            client_auth: Some((loaded.cert, loaded.key)),
        }));
        Ok(options)
    }
}

/// Poll until the broker answers the CONNECT
async fn await_connack(eventloop: &mut EventLoop, endpoint: &str) -> Result<(), ConnectError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(ConnectError::Refused {
                    endpoint: endpoint.to_string(),
                    code: format!("{:?}", ack.code),
                });
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(ConnectError::Refused {
                    endpoint: endpoint.to_string(),
                    code: format!("{:?}", code),
                });
            }
            Err(e) => {
                return Err(ConnectError::Handshake {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Drive the event loop for the lifetime of the session
async fn drive(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(session_present = %ack.session_present, "mqtt_reconnected");
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                // QoS 1 acknowledgement received
                debug!(pkid = %ack.pkid, "mqtt_puback");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("mqtt_disconnect_sent");
                return;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => return,
            Err(e) => {
                warn!(error = %e, "mqtt_connection_lost");
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

#[async_trait]
impl DeliveryChannel for MqttChannel {
    type Session = MqttSession;

    async fn connect(
        &self,
        credentials: &TlsCredentials,
        identity: &Identity,
    ) -> Result<MqttSession, ConnectError> {
        let endpoint = self.settings.endpoint();
        let options = self.options(credentials, identity)?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);

        info!(endpoint = %endpoint, client_id = %self.settings.client_id, "mqtt_connecting");
        match tokio::time::timeout(
            self.settings.connect_timeout,
            await_connack(&mut eventloop, &endpoint),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    endpoint,
                    secs: self.settings.connect_timeout.as_secs(),
                })
            }
        }
        info!(endpoint = %endpoint, "mqtt_connected");

        let poller = tokio::spawn(drive(eventloop));
        Ok(MqttSession { client, poller })
    }

    async fn publish(
        &self,
        session: &MqttSession,
        topic: &str,
        payload: &[u8],
        guarantee: DeliveryGuarantee,
    ) -> Result<Ack, PublishError> {
        if session.poller.is_finished() {
            return Err(PublishError::SessionClosed);
        }
        let qos = match guarantee {
            DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
            DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
        };
        session
            .client
            .try_publish(topic, qos, false, payload.to_vec())
            .map_err(|e| PublishError::Transport { topic: topic.to_string(), reason: e.to_string() })?;
        Ok(Ack { topic: topic.to_string(), bytes: payload.len() })
    }

    async fn disconnect(&self, session: MqttSession) -> Result<(), PublishError> {
        let MqttSession { client, mut poller } = session;
        // The request queue stops draining while offline; never wait on it
        let result = client
            .try_disconnect()
            .map_err(|e| PublishError::Disconnect { reason: e.to_string() });
        if tokio::time::timeout(DISCONNECT_GRACE, &mut poller).await.is_err() {
            poller.abort();
        }
        result
    }
}
