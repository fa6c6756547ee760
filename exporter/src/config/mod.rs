//! Configuration management
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables and command line flags (see [`Overrides`]).

use anyhow::{Context, Result};
use payload::{
    DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT, DEFAULT_LOG_LEVEL, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_SCRAPE_INTERVAL_SECS, DEFAULT_SPEEDTEST_BIN,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub probe: ProbeSettings,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seconds to wait after a cycle finishes; signed so a negative value can
    /// be reported instead of silently wrapping
    pub scrape_interval_secs: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub binary: String,
    pub target_server: Option<String>,
    pub timeout_secs: u64,
    pub no_download: bool,
    pub no_upload: bool,
    pub use_fallback: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            scrape_interval_secs: DEFAULT_SCRAPE_INTERVAL_SECS,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_SPEEDTEST_BIN.to_string(),
            target_server: None,
            timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            no_download: false,
            no_upload: false,
            use_fallback: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            port: DEFAULT_LISTEN_PORT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Values taken from the environment or the command line.
///
/// `None` leaves the value from the lower layers untouched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target_server: Option<String>,
    pub scrape_interval_secs: Option<i64>,
    pub timeout_secs: Option<u64>,
    pub no_download: Option<bool>,
    pub no_upload: Option<bool>,
    pub use_fallback: Option<bool>,
    pub port: Option<u16>,
    pub listen_address: Option<String>,
    pub binary: Option<String>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Build the effective configuration and validate it.
    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        config.apply(overrides);
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(server) = overrides.target_server {
            self.probe.target_server = Some(server);
        }
        if let Some(interval) = overrides.scrape_interval_secs {
            self.general.scrape_interval_secs = interval;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.probe.timeout_secs = timeout;
        }
        if let Some(flag) = overrides.no_download {
            self.probe.no_download = flag;
        }
        if let Some(flag) = overrides.no_upload {
            self.probe.no_upload = flag;
        }
        if let Some(flag) = overrides.use_fallback {
            self.probe.use_fallback = flag;
        }
        if let Some(port) = overrides.port {
            self.http.port = port;
        }
        if let Some(address) = overrides.listen_address {
            self.http.listen_address = address;
        }
        if let Some(binary) = overrides.binary {
            self.probe.binary = binary;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// An empty server id means "let the tool pick".
    fn normalize(&mut self) {
        self.probe.target_server = self
            .probe
            .target_server
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.scrape_interval_secs < 0 {
            anyhow::bail!(
                "scrape interval must not be negative (got {})",
                self.general.scrape_interval_secs
            );
        }

        if self.probe.timeout_secs == 0 {
            anyhow::bail!("probe timeout must be at least one second");
        }

        if self.probe.binary.trim().is_empty() {
            anyhow::bail!("speedtest binary path must not be empty");
        }

        self.listen_addr()?;

        Ok(())
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.general.scrape_interval_secs.max(0) as u64)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .http
            .listen_address
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.http.listen_address))?;

        Ok(SocketAddr::new(ip, self.http.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(overrides: Overrides) -> Result<Config> {
        Config::resolve(None, overrides)
    }

    #[test]
    fn test_defaults() {
        let config = resolve(Overrides::default()).unwrap();

        assert_eq!(config.general.scrape_interval_secs, 600);
        assert_eq!(config.probe.timeout_secs, 60);
        assert_eq!(config.http.port, 9798);
        assert_eq!(config.probe.binary, "speedtest-cli");
        assert!(config.probe.target_server.is_none());
        assert!(!config.probe.use_fallback);
        assert_eq!(config.listen_addr().unwrap().to_string(), "0.0.0.0:9798");
    }

    #[test]
    fn test_negative_interval_rejected() {
        let err = resolve(Overrides {
            scrape_interval_secs: Some(-5),
            ..Default::default()
        })
        .unwrap_err();

        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn test_zero_interval_accepted() {
        let config = resolve(Overrides {
            scrape_interval_secs: Some(0),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.scrape_interval(), Duration::ZERO);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(resolve(Overrides {
            timeout_secs: Some(0),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_blank_target_server_means_auto() {
        let config = resolve(Overrides {
            target_server: Some("   ".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert!(config.probe.target_server.is_none());
    }

    #[test]
    fn test_toml_with_overrides() {
        let mut config: Config = toml::from_str(
            r#"
            [general]
            scrape_interval_secs = 300

            [probe]
            target_server = "1234"
            use_fallback = true
            "#,
        )
        .unwrap();

        assert_eq!(config.probe.timeout_secs, 60);

        config.apply(Overrides {
            scrape_interval_secs: Some(30),
            port: Some(9100),
            ..Default::default()
        });
        config.validate().unwrap();

        assert_eq!(config.general.scrape_interval_secs, 30);
        assert_eq!(config.probe.target_server.as_deref(), Some("1234"));
        assert!(config.probe.use_fallback);
        assert_eq!(config.http.port, 9100);
    }

    #[test]
    fn test_invalid_listen_address() {
        assert!(resolve(Overrides {
            listen_address: Some("not-an-ip".to_string()),
            ..Default::default()
        })
        .is_err());
    }
}
