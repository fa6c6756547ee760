//! External process runner for the measurement tool

use super::{ProbeConfig, Prober};
use payload::{FailureKind, MeasurementResult, ProbeOutcome};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs the configured speedtest binary
pub struct SpeedtestCli {
    binary: String,
}

impl SpeedtestCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Prober for SpeedtestCli {
    async fn run(&self, config: &ProbeConfig) -> ProbeOutcome {
        let args = config.args();
        info!("Speedtest command: {} {}", self.binary, args.join(" "));

        let mut command = Command::new(&self.binary);
        command.args(&args);

        execute(command, config.timeout).await
    }
}

/// Spawn `command` and wait for it, killing it once `timeout` elapses.
pub async fn execute(mut command: Command, timeout: Duration) -> ProbeOutcome {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ProbeOutcome::failure(
                FailureKind::Unexpected,
                format!("failed to start speedtest: {}", e),
            );
        }
    };

    // Dropping the wait future on timeout drops the child, which kills it
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => classify(output.status.code(), &output.stdout, &output.stderr),
        Ok(Err(e)) => ProbeOutcome::failure(
            FailureKind::Unexpected,
            format!("failed to collect speedtest output: {}", e),
        ),
        Err(_) => ProbeOutcome::failure(
            FailureKind::Timeout,
            format!("speedtest did not finish within {}s", timeout.as_secs_f64()),
        ),
    }
}

/// Turn a finished process into an outcome.
///
/// `exit_code` is `None` when the process was terminated by a signal.
fn classify(exit_code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> ProbeOutcome {
    if exit_code != Some(0) {
        let stderr = String::from_utf8_lossy(stderr).trim().to_string();
        let detail = if !stderr.is_empty() {
            stderr
        } else {
            match exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        };
        return ProbeOutcome::failure(FailureKind::ProcessError, detail);
    }

    let stdout = match std::str::from_utf8(stdout) {
        Ok(text) => text,
        Err(e) => {
            return ProbeOutcome::failure(
                FailureKind::MalformedOutput,
                format!("output is not valid UTF-8: {}", e),
            );
        }
    };

    debug!("Speedtest raw output: {}", stdout.trim());

    MeasurementResult::from_json(stdout).into()
}
