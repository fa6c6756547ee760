//! Shared fixtures for unit tests

use crate::probe::{ProbeConfig, Prober};
use payload::{FailureKind, MeasurementResult, ProbeOutcome};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const SAMPLE_JSON: &str = r#"{"download": 100000000.0, "upload": 20000000.0, "ping": 15.0, "jitter": 2.0, "server": {"url": "http://speedtest.example.net:8080/speedtest/upload.php", "lat": "52.5200", "lon": "13.4050", "name": "Berlin", "country": "Germany", "cc": "DE", "sponsor": "Example Carrier", "id": "31470", "host": "speedtest.example.net:8080", "d": 12.5, "latency": 14.2}, "timestamp": "2024-01-01T00:00:00.000Z", "bytes_sent": 25165824, "bytes_received": 125829120, "share": null, "client": {"ip": "203.0.113.7", "lat": "52.52", "lon": "13.41", "isp": "Example ISP", "isprating": "3.7", "rating": "0", "ispdlavg": "0", "ispulavg": "0", "loggedin": "0", "country": "DE"}}"#;

/// 2024-01-01T00:00:00Z
pub const SAMPLE_EPOCH: f64 = 1_704_067_200.0;

pub fn sample_result() -> MeasurementResult {
    MeasurementResult::from_json(SAMPLE_JSON).expect("sample payload parses")
}

/// A result from a different server with different figures
pub fn other_result() -> MeasurementResult {
    let mut result = sample_result();
    result.download_bps = 50_000_000.0;
    result.upload_bps = 5_000_000.0;
    result.ping_ms = 30.0;
    result.jitter_ms = 4.5;
    result.server.id = 999;
    result.server.name = "Hamburg".to_string();
    result.bytes_sent = 1;
    result.bytes_received = 2;
    result
}

/// Prober that replays prepared outcomes and records every request.
///
/// Once the script runs out every further call fails.
#[derive(Default)]
pub struct ScriptedProber {
    outcomes: Mutex<VecDeque<ProbeOutcome>>,
    calls: Mutex<Vec<ProbeConfig>>,
}

impl ScriptedProber {
    pub fn new(outcomes: impl IntoIterator<Item = ProbeOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ProbeConfig> {
        self.calls.lock().unwrap().clone()
    }
}

impl Prober for ScriptedProber {
    async fn run(&self, config: &ProbeConfig) -> ProbeOutcome {
        self.calls.lock().unwrap().push(config.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ProbeOutcome::failure(FailureKind::Unexpected, "script exhausted"))
    }
}

impl Prober for std::sync::Arc<ScriptedProber> {
    async fn run(&self, config: &ProbeConfig) -> ProbeOutcome {
        (**self).run(config).await
    }
}
