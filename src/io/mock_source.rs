//! Mock sensor generator
//!
//! Each value is `base + jitter + phase * drift`, where `phase` ramps from 0
//! to 1 over every wall-clock minute. Successive readings therefore drift
//! smoothly within a fixed band instead of jumping around like pure noise.

use crate::domain::error::SourceError;
use crate::domain::types::{RawReading, SourceKind};
use crate::io::source::SourceReader;
use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// One mocked quantity: `base + uniform(jitter_lo, jitter_hi) + phase * drift`
#[derive(Debug, Clone, Copy)]
pub struct MockBand {
    pub key: &'static str,
    pub base: f64,
    pub jitter_lo: f64,
    pub jitter_hi: f64,
    pub drift: f64,
}

impl MockBand {
    const fn new(key: &'static str, base: f64, jitter_lo: f64, jitter_hi: f64, drift: f64) -> Self {
        Self { key, base, jitter_lo, jitter_hi, drift }
    }

    pub fn sample<R: Rng + ?Sized>(&self, phase: f64, rng: &mut R) -> f64 {
        let jitter = rng.gen_range(self.jitter_lo..=self.jitter_hi);
        round2(self.base + jitter + phase.clamp(0.0, 1.0) * self.drift)
    }

    /// Inclusive range every sample falls in
    pub fn bounds(&self) -> (f64, f64) {
        (self.base + self.jitter_lo, self.base + self.jitter_hi + self.drift)
    }
}

pub const SOUND_BAND: MockBand = MockBand::new("sound_level", 65.0, -10.0, 20.0, 15.0);
pub const LIGHT_BAND: MockBand = MockBand::new("light_level", 300.0, -50.0, 150.0, 100.0);
pub const INDOOR_TEMP_BAND: MockBand = MockBand::new("indoor_temperature", 70.0, -3.0, 5.0, 4.0);
pub const OUTDOOR_TEMP_BAND: MockBand = MockBand::new("outdoor_temperature", 65.0, -5.0, 10.0, 0.0);
pub const HUMIDITY_BAND: MockBand = MockBand::new("humidity", 45.0, -10.0, 15.0, 10.0);

pub const MOCK_BANDS: [MockBand; 5] =
    [SOUND_BAND, LIGHT_BAND, INDOOR_TEMP_BAND, OUTDOOR_TEMP_BAND, HUMIDITY_BAND];

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Position within the current minute, 0.0..1.0
pub fn minute_phase(unix_secs: f64) -> f64 {
    (unix_secs % 60.0) / 60.0
}

/// Never-failing source of plausible venue readings
#[derive(Debug, Default, Clone)]
pub struct MockGenerator;

impl MockGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a reading for a given phase
    pub fn generate<R: Rng + ?Sized>(&self, phase: f64, rng: &mut R) -> RawReading {
        let mut fields = Map::new();
        for band in MOCK_BANDS {
            fields.insert(band.key.to_string(), Value::from(band.sample(phase, rng)));
        }
        RawReading::new(SourceKind::Mock, fields)
    }

    /// Generate a reading for the current wall-clock time
    pub fn generate_now(&self) -> RawReading {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        self.generate(minute_phase(secs), &mut rand::thread_rng())
    }
}

#[async_trait]
impl SourceReader for MockGenerator {
    fn kind(&self) -> SourceKind {
        SourceKind::Mock
    }

    fn describe(&self) -> String {
        "mock generator".to_string()
    }

    async fn read(&self) -> Result<RawReading, SourceError> {
        Ok(self.generate_now())
    }
}
