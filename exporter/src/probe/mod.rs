//! Probe invocation
//!
//! One probe is one run of the external measurement tool. The [`Prober`]
//! trait is the seam between the scheduler and the process runner so that
//! cycles can be driven without spawning anything.

mod command;

pub use command::SpeedtestCli;

use crate::config::ProbeSettings;
use payload::{JSON_FLAG, NO_DOWNLOAD_FLAG, NO_UPLOAD_FLAG, ProbeOutcome, SERVER_FLAG};
use std::future::Future;
use std::time::Duration;

/// Parameters of a single invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Pinned server; `None` lets the tool select one
    pub target_server: Option<String>,
    pub no_download: bool,
    pub no_upload: bool,
    pub timeout: Duration,
}

impl ProbeConfig {
    pub fn from_settings(settings: &ProbeSettings, timeout: Duration) -> Self {
        Self {
            target_server: settings.target_server.clone(),
            no_download: settings.no_download,
            no_upload: settings.no_upload,
            timeout,
        }
    }

    /// Same invocation with the server selector dropped; leg flags and the
    /// timeout budget are kept.
    pub fn without_server(&self) -> Self {
        Self {
            target_server: None,
            ..self.clone()
        }
    }

    /// Argument list in a fixed order: output format, server selector, then
    /// the leg flags.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![JSON_FLAG.to_string()];

        if let Some(server) = &self.target_server {
            args.push(SERVER_FLAG.to_string());
            args.push(server.clone());
        }
        if self.no_download {
            args.push(NO_DOWNLOAD_FLAG.to_string());
        }
        if self.no_upload {
            args.push(NO_UPLOAD_FLAG.to_string());
        }

        args
    }
}

/// Runs one probe and classifies its result.
///
/// Implementations never touch the metrics sink.
pub trait Prober: Send + Sync {
    fn run(&self, config: &ProbeConfig) -> impl Future<Output = ProbeOutcome> + Send;
}
