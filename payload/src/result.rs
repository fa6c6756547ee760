//! Measurement result data structures

use crate::BITS_PER_MEGABIT;
use crate::error::PayloadError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Outcome of one successful probe run.
///
/// Only built through [`MeasurementResult::from_json`]; a document that fails
/// any structural or field check never yields a partial value.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    /// Download throughput in bits per second
    pub download_bps: f64,

    /// Upload throughput in bits per second
    pub upload_bps: f64,

    pub ping_ms: f64,
    pub jitter_ms: f64,

    /// Completion instant reported by the tool
    pub timestamp: DateTime<Utc>,

    pub server: ServerInfo,
    pub client: ClientInfo,

    /// Bytes sent during this run only
    pub bytes_sent: u64,

    /// Bytes received during this run only
    pub bytes_received: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub id: u64,
    pub name: String,
    pub host: String,
    pub country: String,
    pub country_code: String,
    pub sponsor: String,
    pub url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: f64,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub ip_address: String,
    pub isp: String,
    pub isp_rating: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
    pub rating: Option<String>,
    pub logged_in: Option<String>,

    /// ISP-reported average download figure, verbatim
    pub isp_download_avg: Option<String>,

    /// ISP-reported average upload figure, verbatim
    pub isp_upload_avg: Option<String>,
}

impl MeasurementResult {
    /// Parse the tool's JSON document.
    pub fn from_json(raw: &str) -> Result<Self, PayloadError> {
        if raw.trim().is_empty() {
            return Err(PayloadError::Empty);
        }

        let wire: WirePayload = serde_json::from_str(raw)?;
        wire.try_into()
    }

    pub fn download_mbps(&self) -> f64 {
        self.download_bps / BITS_PER_MEGABIT
    }

    pub fn upload_mbps(&self) -> f64 {
        self.upload_bps / BITS_PER_MEGABIT
    }

    /// Completion instant as fractional Unix seconds
    pub fn epoch_seconds(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }
}

/// A JSON value the tool emits either as a number or as a numeric string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    fn to_f64(&self, field: &'static str) -> Result<f64, PayloadError> {
        let parsed = match self {
            Scalar::Number(n) => n.as_f64(),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
        };

        parsed
            .filter(|v| v.is_finite())
            .ok_or_else(|| PayloadError::NotNumeric {
                field,
                value: self.text(),
            })
    }

    fn to_u64(&self, field: &'static str) -> Result<u64, PayloadError> {
        let parsed = match self {
            Scalar::Number(n) => n.as_u64(),
            Scalar::Text(s) => s.trim().parse::<u64>().ok(),
        };

        parsed.ok_or_else(|| PayloadError::NotNumeric {
            field,
            value: self.text(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    download: f64,
    upload: f64,
    ping: f64,
    #[serde(default)]
    jitter: f64,
    timestamp: String,
    server: WireServer,
    client: WireClient,
    #[serde(default)]
    bytes_sent: u64,
    #[serde(default)]
    bytes_received: u64,
}

#[derive(Debug, Deserialize)]
struct WireServer {
    id: Scalar,
    name: String,
    host: String,
    country: String,
    #[serde(default)]
    cc: String,
    sponsor: String,
    url: String,
    lat: Option<Scalar>,
    lon: Option<Scalar>,
    d: Scalar,
    latency: Scalar,
}

#[derive(Debug, Deserialize)]
struct WireClient {
    ip: String,
    isp: String,
    isprating: Scalar,
    lat: Scalar,
    lon: Scalar,
    country: String,
    rating: Option<Scalar>,
    loggedin: Option<Scalar>,
    ispdlavg: Option<Scalar>,
    ispulavg: Option<Scalar>,
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, PayloadError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(PayloadError::OutOfRange { field, value })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PayloadError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| PayloadError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

impl TryFrom<WireServer> for ServerInfo {
    type Error = PayloadError;

    fn try_from(wire: WireServer) -> Result<Self, Self::Error> {
        Ok(Self {
            id: wire.id.to_u64("server.id")?,
            latitude: wire.lat.as_ref().map(|s| s.to_f64("server.lat")).transpose()?,
            longitude: wire.lon.as_ref().map(|s| s.to_f64("server.lon")).transpose()?,
            distance_km: wire.d.to_f64("server.d")?,
            latency_ms: wire.latency.to_f64("server.latency")?,
            name: wire.name,
            host: wire.host,
            country: wire.country,
            country_code: wire.cc,
            sponsor: wire.sponsor,
            url: wire.url,
        })
    }
}

impl TryFrom<WireClient> for ClientInfo {
    type Error = PayloadError;

    fn try_from(wire: WireClient) -> Result<Self, Self::Error> {
        Ok(Self {
            isp_rating: wire.isprating.to_f64("client.isprating")?,
            latitude: wire.lat.to_f64("client.lat")?,
            longitude: wire.lon.to_f64("client.lon")?,
            rating: wire.rating.as_ref().map(Scalar::text),
            logged_in: wire.loggedin.as_ref().map(Scalar::text),
            isp_download_avg: wire.ispdlavg.as_ref().map(Scalar::text),
            isp_upload_avg: wire.ispulavg.as_ref().map(Scalar::text),
            ip_address: wire.ip,
            isp: wire.isp,
            country: wire.country,
        })
    }
}

impl TryFrom<WirePayload> for MeasurementResult {
    type Error = PayloadError;

    fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
        Ok(Self {
            download_bps: non_negative("download", wire.download)?,
            upload_bps: non_negative("upload", wire.upload)?,
            ping_ms: non_negative("ping", wire.ping)?,
            jitter_ms: non_negative("jitter", wire.jitter)?,
            timestamp: parse_timestamp(&wire.timestamp)?,
            server: wire.server.try_into()?,
            client: wire.client.try_into()?,
            bytes_sent: wire.bytes_sent,
            bytes_received: wire.bytes_received,
        })
    }
}
