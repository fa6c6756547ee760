//! Metrics sink
//!
//! Holds the latest value of every exported gauge and info record. The
//! scheduler is the only writer; the HTTP handlers read. All access goes
//! through one reader/writer lock so a scrape never sees half of a cycle.

use anyhow::Result;
use payload::MeasurementResult;
use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

pub const UP: &str = "speedtest_up";
pub const DOWNLOAD_SPEED: &str = "speedtest_download_speed";
pub const UPLOAD_SPEED: &str = "speedtest_upload_speed";
pub const LATENCY: &str = "speedtest_latency";
pub const JITTER: &str = "speedtest_jitter";
pub const TEST_SERVER_ID: &str = "speedtest_test_server_id";
pub const TEST_TIME: &str = "speedtest_test_time";
pub const BYTES_SENT: &str = "speedtest_bytes_sent";
pub const BYTES_RECEIVED: &str = "speedtest_bytes_received";
pub const ISP_RATING: &str = "speedtest_isp_rating";
pub const CLIENT_LATITUDE: &str = "speedtest_client_latitude";
pub const CLIENT_LONGITUDE: &str = "speedtest_client_longitude";
pub const SERVER_DISTANCE: &str = "speedtest_server_distance_km";
pub const SERVER_LATENCY: &str = "speedtest_server_latency_ms";
pub const CLIENT_INFO: &str = "speedtest_client_info";
pub const SERVER_INFO: &str = "speedtest_server_info";

const CLIENT_INFO_LABELS: [&str; 10] = [
    "ip_address",
    "isp",
    "latitude",
    "longitude",
    "isprating",
    "rating",
    "ispdlavg",
    "ispulavg",
    "loggedin",
    "country",
];

const SERVER_INFO_LABELS: [&str; 11] = [
    "url", "lat", "lon", "name", "country", "cc", "sponsor", "id", "host", "d", "latency",
];

/// Point-in-time copy of everything the sink exports
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub gauges: BTreeMap<String, f64>,
    pub info: BTreeMap<String, BTreeMap<String, String>>,
}

#[allow(dead_code)]
impl MetricsSnapshot {
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).copied()
    }

    pub fn info(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.info.get(name)
    }
}

struct SinkMetrics {
    registry: Registry,

    up: IntGauge,

    download_speed: Gauge,
    upload_speed: Gauge,
    latency: Gauge,
    jitter: Gauge,
    test_server_id: Gauge,
    test_time: Gauge,
    bytes_sent: Gauge,
    bytes_received: Gauge,
    isp_rating: Gauge,
    client_latitude: Gauge,
    client_longitude: Gauge,
    server_distance: Gauge,
    server_latency: Gauge,

    client_info: GaugeVec,
    server_info: GaugeVec,
}

pub struct MetricsSink {
    metrics: RwLock<SinkMetrics>,
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let gauge = Gauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn register_info(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let info = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(info.clone()))?;
    Ok(info)
}

impl MetricsSink {
    /// Create a sink with every gauge at zero, `up` at zero and no info
    /// records.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let up = IntGauge::new(UP, "Speedtest status (1 = last cycle succeeded, 0 = failed)")?;
        registry.register(Box::new(up.clone()))?;

        let metrics = SinkMetrics {
            download_speed: register_gauge(&registry, DOWNLOAD_SPEED, "Download speed in Mbit/s")?,
            upload_speed: register_gauge(&registry, UPLOAD_SPEED, "Upload speed in Mbit/s")?,
            latency: register_gauge(&registry, LATENCY, "Latency in ms")?,
            jitter: register_gauge(&registry, JITTER, "Jitter in ms")?,
            test_server_id: register_gauge(&registry, TEST_SERVER_ID, "Server used for the test (id)")?,
            test_time: register_gauge(&registry, TEST_TIME, "Time of the last successful test as Unix timestamp")?,
            bytes_sent: register_gauge(&registry, BYTES_SENT, "Bytes sent during the last test")?,
            bytes_received: register_gauge(&registry, BYTES_RECEIVED, "Bytes received during the last test")?,
            isp_rating: register_gauge(&registry, ISP_RATING, "ISP rating")?,
            client_latitude: register_gauge(&registry, CLIENT_LATITUDE, "Client latitude")?,
            client_longitude: register_gauge(&registry, CLIENT_LONGITUDE, "Client longitude")?,
            server_distance: register_gauge(&registry, SERVER_DISTANCE, "Distance to the server in km")?,
            server_latency: register_gauge(&registry, SERVER_LATENCY, "Latency to the server in ms")?,
            client_info: register_info(&registry, CLIENT_INFO, "Information about the client", &CLIENT_INFO_LABELS)?,
            server_info: register_info(&registry, SERVER_INFO, "Information about the server used", &SERVER_INFO_LABELS)?,
            up,
            registry,
        };

        Ok(Self {
            metrics: RwLock::new(metrics),
        })
    }

    /// Write every field of `result`, then flip `up` to 1.
    pub async fn record_success(&self, result: &MeasurementResult) {
        let m = self.metrics.write().await;

        m.download_speed.set(result.download_mbps());
        m.upload_speed.set(result.upload_mbps());
        m.latency.set(result.ping_ms);
        m.jitter.set(result.jitter_ms);
        m.test_server_id.set(result.server.id as f64);
        m.test_time.set(result.epoch_seconds());
        m.bytes_sent.set(result.bytes_sent as f64);
        m.bytes_received.set(result.bytes_received as f64);
        m.isp_rating.set(result.client.isp_rating);
        m.client_latitude.set(result.client.latitude);
        m.client_longitude.set(result.client.longitude);
        m.server_distance.set(result.server.distance_km);
        m.server_latency.set(result.server.latency_ms);

        // Info records are replaced wholesale
        let client = client_info_values(result);
        m.client_info.reset();
        m.client_info.with_label_values(&client.each_ref().map(String::as_str)).set(1.0);

        let server = server_info_values(result);
        m.server_info.reset();
        m.server_info.with_label_values(&server.each_ref().map(String::as_str)).set(1.0);

        m.up.set(1);
    }

    /// Mark the last cycle as failed; every other value keeps its last good
    /// reading.
    pub async fn record_failure(&self) {
        self.metrics.write().await.up.set(0);
    }

    pub async fn is_up(&self) -> bool {
        self.metrics.read().await.up.get() == 1
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub async fn render(&self) -> Result<String> {
        let families = self.metrics.read().await.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    #[allow(dead_code)]
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let families = self.metrics.read().await.registry.gather();
        let mut snapshot = MetricsSnapshot::default();

        for family in &families {
            let name = family.get_name();
            for metric in family.get_metric() {
                let labels = metric.get_label();
                if labels.is_empty() {
                    snapshot
                        .gauges
                        .insert(name.to_string(), metric.get_gauge().get_value());
                } else {
                    let record = labels
                        .iter()
                        .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                        .collect();
                    snapshot.info.insert(name.to_string(), record);
                }
            }
        }

        snapshot
    }
}

fn client_info_values(result: &MeasurementResult) -> [String; 10] {
    let client = &result.client;
    let or_zero = |value: &Option<String>| value.clone().unwrap_or_else(|| "0".to_string());

    [
        client.ip_address.clone(),
        client.isp.clone(),
        client.latitude.to_string(),
        client.longitude.to_string(),
        client.isp_rating.to_string(),
        or_zero(&client.rating),
        or_zero(&client.isp_download_avg),
        or_zero(&client.isp_upload_avg),
        or_zero(&client.logged_in),
        client.country.clone(),
    ]
}

fn server_info_values(result: &MeasurementResult) -> [String; 11] {
    let server = &result.server;
    let coordinate = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();

    [
        server.url.clone(),
        coordinate(server.latitude),
        coordinate(server.longitude),
        server.name.clone(),
        server.country.clone(),
        server.country_code.clone(),
        server.sponsor.clone(),
        server.id.to_string(),
        server.host.clone(),
        server.distance_km.to_string(),
        server.latency_ms.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{SAMPLE_EPOCH, other_result, sample_result};

    const ALL_GAUGES: [&str; 13] = [
        DOWNLOAD_SPEED,
        UPLOAD_SPEED,
        LATENCY,
        JITTER,
        TEST_SERVER_ID,
        TEST_TIME,
        BYTES_SENT,
        BYTES_RECEIVED,
        ISP_RATING,
        CLIENT_LATITUDE,
        CLIENT_LONGITUDE,
        SERVER_DISTANCE,
        SERVER_LATENCY,
    ];

    #[tokio::test]
    async fn test_startup_state() {
        let sink = MetricsSink::new().unwrap();
        let snapshot = sink.snapshot().await;

        assert_eq!(snapshot.gauge(UP), Some(0.0));
        for name in ALL_GAUGES {
            assert_eq!(snapshot.gauge(name), Some(0.0), "{}", name);
        }
        assert!(snapshot.info.is_empty());
        assert!(!sink.is_up().await);
    }

    #[tokio::test]
    async fn test_record_success_maps_fields() {
        let sink = MetricsSink::new().unwrap();
        sink.record_success(&sample_result()).await;

        let snapshot = sink.snapshot().await;
        assert_eq!(snapshot.gauge(DOWNLOAD_SPEED), Some(100.0));
        assert_eq!(snapshot.gauge(UPLOAD_SPEED), Some(20.0));
        assert_eq!(snapshot.gauge(LATENCY), Some(15.0));
        assert_eq!(snapshot.gauge(JITTER), Some(2.0));
        assert_eq!(snapshot.gauge(TEST_SERVER_ID), Some(31470.0));
        assert_eq!(snapshot.gauge(TEST_TIME), Some(SAMPLE_EPOCH));
        assert_eq!(snapshot.gauge(BYTES_SENT), Some(25_165_824.0));
        assert_eq!(snapshot.gauge(ISP_RATING), Some(3.7));
        assert_eq!(snapshot.gauge(SERVER_DISTANCE), Some(12.5));
        assert_eq!(snapshot.gauge(UP), Some(1.0));
        assert!(sink.is_up().await);

        let client = snapshot.info(CLIENT_INFO).unwrap();
        assert_eq!(client["ip_address"], "203.0.113.7");
        assert_eq!(client["isp"], "Example ISP");
        assert_eq!(client["loggedin"], "0");

        let server = snapshot.info(SERVER_INFO).unwrap();
        assert_eq!(server["id"], "31470");
        assert_eq!(server["cc"], "DE");
        assert_eq!(server["sponsor"], "Example Carrier");
    }

    #[tokio::test]
    async fn test_megabit_conversion() {
        let sink = MetricsSink::new().unwrap();

        for bps in [0.0, 1.0, 999_999.0, 123_456_789.0, 9.87e9] {
            let mut result = sample_result();
            result.download_bps = bps;
            result.upload_bps = bps / 3.0;
            sink.record_success(&result).await;

            let snapshot = sink.snapshot().await;
            let download = snapshot.gauge(DOWNLOAD_SPEED).unwrap();
            let upload = snapshot.gauge(UPLOAD_SPEED).unwrap();
            assert!((download - bps / 1_000_000.0).abs() < 1e-9);
            assert!((upload - bps / 3.0 / 1_000_000.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_record_success_is_idempotent() {
        let sink = MetricsSink::new().unwrap();
        sink.record_success(&sample_result()).await;
        let once = sink.snapshot().await;

        sink.record_success(&sample_result()).await;
        assert_eq!(sink.snapshot().await, once);
    }

    #[tokio::test]
    async fn test_failure_only_touches_up() {
        let sink = MetricsSink::new().unwrap();
        sink.record_success(&sample_result()).await;
        let before = sink.snapshot().await;

        sink.record_failure().await;
        let after = sink.snapshot().await;

        assert_eq!(after.gauge(UP), Some(0.0));
        for name in ALL_GAUGES {
            assert_eq!(after.gauge(name), before.gauge(name), "{}", name);
        }
        assert_eq!(after.info, before.info);
    }

    #[tokio::test]
    async fn test_info_records_are_replaced() {
        let sink = MetricsSink::new().unwrap();
        sink.record_success(&sample_result()).await;
        sink.record_success(&other_result()).await;

        let rendered = sink.render().await.unwrap();
        let server_rows = rendered
            .lines()
            .filter(|line| line.starts_with("speedtest_server_info{"))
            .count();
        assert_eq!(server_rows, 1);

        let snapshot = sink.snapshot().await;
        assert_eq!(snapshot.info(SERVER_INFO).unwrap()["name"], "Hamburg");
        assert_eq!(snapshot.gauge(TEST_SERVER_ID), Some(999.0));
    }

    #[tokio::test]
    async fn test_render_text_format() {
        let sink = MetricsSink::new().unwrap();
        sink.record_success(&sample_result()).await;

        let rendered = sink.render().await.unwrap();
        assert!(rendered.contains("# TYPE speedtest_up gauge"));
        assert!(rendered.contains("speedtest_up 1"));
        assert!(rendered.contains("speedtest_download_speed 100"));
        assert!(rendered.contains("speedtest_client_info{"));
        assert!(sink.content_type().starts_with("text/plain"));
    }
}
