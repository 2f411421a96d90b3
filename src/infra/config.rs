//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Everything here is read once at startup and never mutated afterwards.

use crate::domain::error::{ConfigError, StartupError};
use crate::domain::types::{Identity, SourceKind};
use crate::io::delivery::TlsCredentials;
use crate::io::mqtt_delivery::MqttSettings;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Venue id shipped in example configs, never accepted by `validate`
pub const PLACEHOLDER_VENUE_ID: &str = "YOUR_VENUE_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_location_id")]
    pub location_id: String,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_location_id() -> String {
    "mainfloor".to_string()
}

fn default_capacity() -> u32 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Full topic; wins over `namespace`
    #[serde(default)]
    pub topic: Option<String>,
    /// Topic prefix, published as `<namespace>/<venue_id>`
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_mqtt_port() -> u16 {
    8883
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,
    #[serde(default)]
    pub http_url: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            http_url: None,
            http_timeout_ms: default_http_timeout_ms(),
            file_path: None,
        }
    }
}

fn default_source_kind() -> SourceKind {
    SourceKind::Mock
}

fn default_http_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_interval")]
    pub interval_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { interval_secs: default_publish_interval() }
    }
}

fn default_publish_interval() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summary log lines (0 to disable)
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub venue: VenueConfig,
    pub mqtt: MqttConfig,
    pub tls: TlsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    venue_id: String,
    device_id: String,
    location_id: String,
    capacity: u32,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_client_id: String,
    mqtt_keep_alive_secs: u64,
    mqtt_connect_timeout_secs: u64,
    cert_path: String,
    key_path: String,
    ca_path: String,
    source_kind: SourceKind,
    http_url: Option<String>,
    http_timeout_ms: u64,
    file_path: Option<String>,
    publish_interval_secs: u64,
    metrics_interval_secs: u64,
    log_format: LogFormat,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let venue_id = PLACEHOLDER_VENUE_ID.to_string();
        let device_id = default_device_id(&venue_id);
        Self {
            mqtt_topic: default_topic(&venue_id),
            mqtt_client_id: device_id.clone(),
            venue_id,
            device_id,
            location_id: default_location_id(),
            capacity: default_capacity(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: default_mqtt_port(),
            mqtt_keep_alive_secs: default_keep_alive_secs(),
            mqtt_connect_timeout_secs: default_connect_timeout_secs(),
            cert_path: "/home/pi/certs/certificate.pem.crt".to_string(),
            key_path: "/home/pi/certs/private.pem.key".to_string(),
            ca_path: "/home/pi/certs/root-CA.crt".to_string(),
            source_kind: SourceKind::Mock,
            http_url: None,
            http_timeout_ms: default_http_timeout_ms(),
            file_path: None,
            publish_interval_secs: default_publish_interval(),
            metrics_interval_secs: default_metrics_interval(),
            log_format: LogFormat::Text,
            config_file: "default".to_string(),
        }
    }
}

fn default_device_id(venue_id: &str) -> String {
    format!("{}-rpi-001", venue_id)
}

fn default_topic(venue_id: &str) -> String {
    format!("venue/{}/sensors", venue_id)
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { venue, mqtt, tls, source, publish, metrics, logging } = toml_config;

        let device_id = venue
            .device_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| default_device_id(&venue.id));
        let mqtt_topic = match (mqtt.topic, mqtt.namespace) {
            (Some(topic), _) => topic,
            (None, Some(namespace)) => {
                format!("{}/{}", namespace.trim_end_matches('/'), venue.id)
            }
            (None, None) => default_topic(&venue.id),
        };
        let mqtt_client_id = mqtt.client_id.unwrap_or_else(|| device_id.clone());

        Self {
            venue_id: venue.id,
            device_id,
            location_id: venue.location_id,
            capacity: venue.capacity,
            mqtt_host: mqtt.host,
            mqtt_port: mqtt.port,
            mqtt_topic,
            mqtt_client_id,
            mqtt_keep_alive_secs: mqtt.keep_alive_secs,
            mqtt_connect_timeout_secs: mqtt.connect_timeout_secs,
            cert_path: tls.cert_path,
            key_path: tls.key_path,
            ca_path: tls.ca_path,
            source_kind: source.kind,
            http_url: source.http_url,
            http_timeout_ms: source.http_timeout_ms,
            file_path: source.file_path,
            publish_interval_secs: publish.interval_secs,
            metrics_interval_secs: metrics.interval_secs,
            log_format: logging.format,
            config_file,
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults.
    ///
    /// Defaults carry a placeholder venue id, so `validate` rejects them.
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Check everything that must hold before connecting
    pub fn validate(&self) -> Result<(), ConfigError> {
        let venue = self.venue_id.trim();
        if venue.is_empty() || venue == PLACEHOLDER_VENUE_ID {
            return Err(ConfigError::IdentityNotConfigured(self.venue_id.clone()));
        }
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::DeviceIdMissing);
        }
        if self.publish_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        match self.source_kind {
            SourceKind::Http if self.http_url.is_none() => {
                return Err(ConfigError::SourceIncomplete { kind: "http", field: "http_url" });
            }
            SourceKind::File if self.file_path.is_none() => {
                return Err(ConfigError::SourceIncomplete { kind: "file", field: "file_path" });
            }
            _ => {}
        }

        let missing: Vec<String> = self
            .credentials()
            .files()
            .into_iter()
            .filter(|(_, path)| !Path::new(path).is_file())
            .map(|(name, path)| format!("{}: {}", name, path))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::CredentialsMissing { missing });
        }

        Ok(())
    }

    /// Actionable steps printed after a fatal startup error
    pub fn troubleshooting(&self, err: &StartupError) -> Vec<String> {
        let mut steps = Vec::new();
        match err {
            StartupError::Config(ConfigError::IdentityNotConfigured(_))
            | StartupError::Config(ConfigError::DeviceIdMissing) => {
                steps.push(format!(
                    "Set [venue] id in {} to the venue id assigned to this device",
                    self.config_file
                ));
            }
            StartupError::Config(ConfigError::SourceIncomplete { field, .. }) => {
                steps.push(format!("Set [source] {} in {}", field, self.config_file));
            }
            StartupError::Config(ConfigError::ZeroInterval) => {
                steps.push(format!("Set [publish] interval_secs > 0 in {}", self.config_file));
            }
            StartupError::Config(ConfigError::HttpClient(_)) => {
                steps.push("Check [source] http_url is a valid http(s) URL".to_string());
            }
            StartupError::Config(ConfigError::CredentialsMissing { .. })
            | StartupError::Connect(_) => {
                steps.push("Check certificate files exist and are readable:".to_string());
                for (name, path) in self.credentials().files() {
                    steps.push(format!("  - {}: {}", name, path));
                }
            }
        }

        if let StartupError::Connect(_) = err {
            steps.push(format!(
                "Check the endpoint is correct: {}:{}",
                self.mqtt_host, self.mqtt_port
            ));
            steps.push("Check network connectivity from this device".to_string());
            steps.push(format!(
                "Verify the device certificate is active and its policy allows client id '{}' to publish to '{}'",
                self.mqtt_client_id, self.mqtt_topic
            ));
        }
        steps
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.device_id, &self.venue_id, &self.location_id)
    }

    pub fn credentials(&self) -> TlsCredentials {
        TlsCredentials::new(&self.cert_path, &self.key_path, &self.ca_path)
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            connect_timeout: Duration::from_secs(self.mqtt_connect_timeout_secs),
        }
    }

    // Getters for all config fields
    pub fn venue_id(&self) -> &str {
        &self.venue_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn http_url(&self) -> Option<&str> {
        self.http_url.as_deref()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the venue identity
    #[cfg(test)]
    pub fn with_venue(mut self, venue_id: &str) -> Self {
        self.venue_id = venue_id.to_string();
        self.device_id = default_device_id(venue_id);
        self.mqtt_topic = default_topic(venue_id);
        self
    }

    /// Builder method for tests to point credentials at fixture files
    #[cfg(test)]
    pub fn with_credentials(mut self, cert: &str, key: &str, ca: &str) -> Self {
        self.cert_path = cert.to_string();
        self.key_path = key.to_string();
        self.ca_path = ca.to_string();
        self
    }

    /// Builder method for tests to select a source
    #[cfg(test)]
    pub fn with_source(
        mut self,
        kind: SourceKind,
        http_url: Option<&str>,
        file_path: Option<&str>,
    ) -> Self {
        self.source_kind = kind;
        self.http_url = http_url.map(str::to_string);
        self.file_path = file_path.map(str::to_string);
        self
    }
}
