//! Integration tests for the publish loop
//!
//! The transport is replaced by a recording channel; time is paused so tick
//! cadence can be asserted exactly.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use venue_telemetry::domain::error::{ConnectError, PublishError, SourceError};
use venue_telemetry::domain::types::{Identity, RawReading, SourceKind};
use venue_telemetry::infra::Metrics;
use venue_telemetry::io::mock_source::SOUND_BAND;
use venue_telemetry::io::{
    Ack, DeliveryChannel, DeliveryGuarantee, FailurePolicy, MockGenerator, SharedFileReader,
    SourceReader, TlsCredentials,
};
use venue_telemetry::services::{LoopSettings, LoopState, PublishLoop, TickOutcome};

const TOPIC: &str = "venue/parlaylp/sensors";
const INTERVAL: Duration = Duration::from_secs(15);

#[derive(Default)]
struct Recorder {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    publish_attempts: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Recorder {
    fn messages(&self) -> Vec<Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }
}

#[derive(Default)]
struct RecordingChannel {
    recorder: Arc<Recorder>,
    fail_connect: bool,
    fail_publish: bool,
    fail_disconnect: bool,
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    type Session = ();

    async fn connect(&self, _: &TlsCredentials, _: &Identity) -> Result<(), ConnectError> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ConnectError::Timeout { endpoint: "ingress.test:8883".into(), secs: 10 });
        }
        Ok(())
    }

    async fn publish(
        &self,
        _: &(),
        topic: &str,
        payload: &[u8],
        guarantee: DeliveryGuarantee,
    ) -> Result<Ack, PublishError> {
        assert_eq!(guarantee, DeliveryGuarantee::AtLeastOnce);
        self.recorder.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_publish {
            return Err(PublishError::Transport { topic: topic.into(), reason: "queue full".into() });
        }
        self.recorder.published.lock().unwrap().push((topic.to_string(), payload.to_vec()));
        Ok(Ack { topic: topic.to_string(), bytes: payload.len() })
    }

    async fn disconnect(&self, _: ()) -> Result<(), PublishError> {
        self.recorder.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect {
            return Err(PublishError::SessionClosed);
        }
        Ok(())
    }
}

/// Source that replays a fixed script and records when it was read
struct ScriptedSource {
    script: Mutex<VecDeque<Result<Value, SourceError>>>,
    reads: Arc<Mutex<Vec<Instant>>>,
    policy: FailurePolicy,
    latency: Duration,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Value, SourceError>>, policy: FailurePolicy) -> Self {
        Self {
            script: Mutex::new(script.into()),
            reads: Arc::default(),
            policy,
            latency: Duration::ZERO,
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl SourceReader for ScriptedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn read(&self) -> Result<RawReading, SourceError> {
        self.reads.lock().unwrap().push(Instant::now());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(Value::Object(map))) => Ok(RawReading::new(SourceKind::File, map)),
            Some(Ok(_)) => panic!("script entries must be objects"),
            Some(Err(e)) => Err(e),
            None => Err(SourceError::FileMissing { path: "scripted".into() }),
        }
    }

    fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }
}

fn settings() -> LoopSettings {
    LoopSettings {
        identity: Identity::new("parlaylp-mainfloor-001", "parlaylp", "mainfloor"),
        credentials: TlsCredentials::new("/certs/c.pem", "/certs/k.pem", "/certs/ca.pem"),
        topic: TOPIC.to_string(),
        interval: INTERVAL,
        capacity: 400,
    }
}

fn shared_snapshot() -> Value {
    json!({"entries": 120, "exits": 75, "lux": 499.9, "avg_db": 61.6, "temperature_f": 79.7,
           "humidity": 20.8, "pressure": 1001.4, "current_song": "Song X - Artist Y"})
}

fn malformed() -> SourceError {
    SourceError::Malformed { origin: "scripted".into(), reason: "EOF while parsing".into() }
}

type LoopHandle = tokio::task::JoinHandle<(LoopState, Result<(), ConnectError>)>;

fn spawn_loop(
    channel: RecordingChannel,
    source: Box<dyn SourceReader>,
    metrics: Arc<Metrics>,
) -> (watch::Sender<bool>, LoopHandle) {
    let (tx, rx) = watch::channel(false);
    let mut publish_loop = PublishLoop::new(channel, source, settings(), metrics);
    let handle = tokio::spawn(async move {
        let result = publish_loop.run(rx).await;
        (publish_loop.state(), result)
    });
    (tx, handle)
}

#[tokio::test(start_paused = true)]
async fn test_source_error_skips_publish_and_keeps_cadence() {
    let recorder = Arc::new(Recorder::default());
    let channel = RecordingChannel { recorder: recorder.clone(), ..Default::default() };
    let source = ScriptedSource::new(
        vec![Ok(shared_snapshot()), Err(malformed()), Ok(shared_snapshot())],
        FailurePolicy::SkipTick,
    );
    let reads = source.reads.clone();
    let metrics = Arc::new(Metrics::new());

    let start = Instant::now();
    let (tx, handle) = spawn_loop(channel, Box::new(source), metrics.clone());
    tokio::time::sleep(Duration::from_secs(31)).await;
    tx.send(true).unwrap();
    let (state, result) = handle.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(state, LoopState::Stopped);

    let offsets: Vec<Duration> = reads.lock().unwrap().iter().map(|t| *t - start).collect();
    assert_eq!(offsets, vec![Duration::ZERO, INTERVAL, INTERVAL * 2]);

    // The failed read in the middle produced no publish
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 2);
    let totals = metrics.totals();
    assert_eq!((totals.ticks, totals.published, totals.skipped), (3, 2, 1));
}

#[tokio::test(start_paused = true)]
async fn test_slow_read_delays_next_tick_by_full_interval() {
    let recorder = Arc::new(Recorder::default());
    let channel = RecordingChannel { recorder: recorder.clone(), ..Default::default() };
    let source = ScriptedSource::new(
        vec![Ok(shared_snapshot()), Ok(shared_snapshot()), Ok(shared_snapshot())],
        FailurePolicy::SkipTick,
    )
    .with_latency(Duration::from_secs(4));
    let reads = source.reads.clone();

    let start = Instant::now();
    let (tx, handle) = spawn_loop(channel, Box::new(source), Arc::new(Metrics::new()));
    tokio::time::sleep(Duration::from_secs(40)).await;
    tx.send(true).unwrap();
    let (state, result) = handle.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(state, LoopState::Stopped);

    // Each tick takes 4s, then the loop sleeps the whole 15s interval
    let offsets: Vec<Duration> = reads.lock().unwrap().iter().map(|t| *t - start).collect();
    assert_eq!(
        offsets,
        vec![Duration::ZERO, Duration::from_secs(19), Duration::from_secs(38)]
    );
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_read_finishes_tick_then_stops() {
    let recorder = Arc::new(Recorder::default());
    let channel = RecordingChannel { recorder: recorder.clone(), ..Default::default() };
    let source = ScriptedSource::new(vec![Ok(shared_snapshot())], FailurePolicy::SkipTick)
        .with_latency(Duration::from_secs(4));
    let reads = source.reads.clone();

    let start = Instant::now();
    let (tx, handle) = spawn_loop(channel, Box::new(source), Arc::new(Metrics::new()));
    tokio::time::sleep(Duration::from_secs(2)).await;
    tx.send(true).unwrap();
    let (state, result) = handle.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(state, LoopState::Stopped);
    // The in-flight tick completed and published, and no interval sleep followed
    assert_eq!(Instant::now() - start, Duration::from_secs(4));
    assert_eq!(reads.lock().unwrap().len(), 1);
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_sleep_disconnects_once_even_when_disconnect_fails() {
    let recorder = Arc::new(Recorder::default());
    let channel =
        RecordingChannel { recorder: recorder.clone(), fail_disconnect: true, ..Default::default() };

    let (tx, handle) =
        spawn_loop(channel, Box::new(MockGenerator::new()), Arc::new(Metrics::new()));
    tokio::time::sleep(Duration::from_secs(5)).await;
    tx.send(true).unwrap();
    let (state, result) = handle.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(state, LoopState::Stopped);
    assert_eq!(recorder.connects.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_first_tick_still_disconnects() {
    let recorder = Arc::new(Recorder::default());
    let channel = RecordingChannel { recorder: recorder.clone(), ..Default::default() };
    let (tx, rx) = watch::channel(true);
    drop(tx);

    let mut publish_loop =
        PublishLoop::new(channel, Box::new(MockGenerator::new()), settings(), Arc::new(Metrics::new()));
    publish_loop.run(rx).await.unwrap();

    assert_eq!(publish_loop.state(), LoopState::Stopped);
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_is_fatal() {
    let recorder = Arc::new(Recorder::default());
    let channel =
        RecordingChannel { recorder: recorder.clone(), fail_connect: true, ..Default::default() };
    let source = ScriptedSource::new(vec![Ok(shared_snapshot())], FailurePolicy::SkipTick);
    let reads = source.reads.clone();

    let (_tx, handle) = spawn_loop(channel, Box::new(source), Arc::new(Metrics::new()));
    let (state, result) = handle.await.unwrap();

    assert!(matches!(result, Err(ConnectError::Timeout { .. })));
    assert_eq!(state, LoopState::Failed);
    assert!(reads.lock().unwrap().is_empty());
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_publish_failures_do_not_stop_the_loop() {
    let recorder = Arc::new(Recorder::default());
    let channel =
        RecordingChannel { recorder: recorder.clone(), fail_publish: true, ..Default::default() };
    let metrics = Arc::new(Metrics::new());

    let (tx, handle) = spawn_loop(channel, Box::new(MockGenerator::new()), metrics.clone());
    tokio::time::sleep(Duration::from_secs(46)).await;
    tx.send(true).unwrap();
    let (state, result) = handle.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(state, LoopState::Stopped);
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(metrics.totals().publish_failed, 4);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_source_publishes_mock_reading() {
    let recorder = Arc::new(Recorder::default());
    let channel = RecordingChannel { recorder: recorder.clone(), ..Default::default() };
    let source = ScriptedSource::new(
        vec![Err(SourceError::Status { origin: "http://127.0.0.1/sensors".into(), status: 500 })],
        FailurePolicy::FallbackToMock,
    );
    let metrics = Arc::new(Metrics::new());

    let (tx, handle) = spawn_loop(channel, Box::new(source), metrics.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    let sound = messages[0]["sensors"]["sound_level"].as_f64().unwrap();
    let (lo, hi) = SOUND_BAND.bounds();
    assert!(sound >= lo && sound <= hi);
    assert_eq!(metrics.totals().mock_fallbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_mock_message_matches_schema() {
    let recorder = Arc::new(Recorder::default());
    let channel = RecordingChannel { recorder: recorder.clone(), ..Default::default() };

    let (tx, handle) =
        spawn_loop(channel, Box::new(MockGenerator::new()), Arc::new(Metrics::new()));
    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    let published = recorder.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, TOPIC);

    let message: Map<String, Value> = serde_json::from_slice(&published[0].1).unwrap();
    let mut keys: Vec<&str> = message.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["deviceId", "sensors", "timestamp", "venueId"]);
    assert_eq!(message["deviceId"], "parlaylp-mainfloor-001");
    assert_eq!(message["venueId"], "parlaylp");
    assert!(message["timestamp"].as_str().unwrap().ends_with('Z'));

    let sensors = message["sensors"].as_object().unwrap();
    let mut sensor_keys: Vec<&str> = sensors.keys().map(String::as_str).collect();
    sensor_keys.sort_unstable();
    assert_eq!(
        sensor_keys,
        vec!["humidity", "indoor_temperature", "light_level", "outdoor_temperature", "sound_level"]
    );
    let sound = sensors["sound_level"].as_f64().unwrap();
    let (lo, hi) = SOUND_BAND.bounds();
    assert!(sound >= lo && sound <= hi, "sound_level {} outside [{}, {}]", sound, lo, hi);
}

#[tokio::test]
async fn test_shared_file_tick_publishes_then_skips_when_file_disappears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared_data.json");
    fs::write(&path, serde_json::to_vec(&shared_snapshot()).unwrap()).unwrap();

    let recorder = Arc::new(Recorder::default());
    let channel = RecordingChannel { recorder: recorder.clone(), ..Default::default() };
    let source = SharedFileReader::new(path.to_str().unwrap());
    let publish_loop =
        PublishLoop::new(channel, Box::new(source), settings(), Arc::new(Metrics::new()));

    assert!(matches!(publish_loop.tick(&()).await, TickOutcome::Published(_)));
    let messages = recorder.messages();
    assert_eq!(
        messages[0]["occupancy"],
        json!({"current": 45, "entries": 120, "exits": 75, "capacity": 400})
    );
    assert_eq!(
        messages[0]["spotify"],
        json!({"current_song": "Song X", "artist": "Artist Y", "album_art": null})
    );
    assert_eq!(messages[0]["sensors"]["pressure"], json!(1001.4));

    fs::remove_file(&path).unwrap();
    match publish_loop.tick(&()).await {
        TickOutcome::Skipped(SourceError::FileMissing { .. }) => {}
        other => panic!("expected a skipped tick, got {:?}", other),
    }
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 1);

    fs::write(&path, b"{\"entries\": 12").unwrap();
    match publish_loop.tick(&()).await {
        TickOutcome::Skipped(SourceError::Malformed { .. }) => {}
        other => panic!("expected a skipped tick, got {:?}", other),
    }
    assert_eq!(recorder.publish_attempts.load(Ordering::SeqCst), 1);
}
