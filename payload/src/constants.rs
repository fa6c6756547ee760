//! Defaults and environment variable names

/// Measurement tool invoked when no other binary is configured
pub const DEFAULT_SPEEDTEST_BIN: &str = "speedtest-cli";

/// Flag that switches the tool to JSON output
pub const JSON_FLAG: &str = "--json";

/// Selector flag for pinning a server, followed by the server id
pub const SERVER_FLAG: &str = "--server";

pub const NO_DOWNLOAD_FLAG: &str = "--no-download";
pub const NO_UPLOAD_FLAG: &str = "--no-upload";

/// Seconds between the end of one cycle and the start of the next
pub const DEFAULT_SCRAPE_INTERVAL_SECS: i64 = 600;

/// Wall-clock ceiling for a single invocation
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 9798;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Environment variables understood by the exporter
pub const ENV_TEST_SERVER: &str = "TEST_SERVER";
pub const ENV_SCRAPE_INTERVAL: &str = "SCRAPE_INTERVAL";
pub const ENV_SPEEDTEST_TIMEOUT: &str = "SPEEDTEST_TIMEOUT";
pub const ENV_NO_DOWNLOAD: &str = "NO_DOWNLOAD";
pub const ENV_NO_UPLOAD: &str = "NO_UPLOAD";
pub const ENV_USE_FALLBACK_TEST: &str = "USE_FALLBACK_TEST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_LISTEN_ADDRESS: &str = "LISTEN_ADDRESS";
pub const ENV_SPEEDTEST_BIN: &str = "SPEEDTEST_BIN";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
