//! Control of the host device.

use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("could not run device command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("device command killed after {0:?}")]
    Timeout(Duration),

    #[error("device command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Power management for the machine the gateway runs on.
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Schedule a shutdown. Returns the command's output.
    async fn power_off(&self) -> Result<String, DeviceError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Shell command run on power-off
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: String,

    /// The command is killed if it has not finished after this long
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            shutdown_command: default_shutdown_command(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Overlay `WALLETGATE_DEVICE_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(command) = get_env_with_prefix("DEVICE_SHUTDOWN_COMMAND") {
            self.shutdown_command = command;
        }
        if let Some(secs) = parse_env_with_prefix("DEVICE_TIMEOUT_SECONDS") {
            self.timeout_seconds = secs;
        }
    }
}

fn default_shutdown_command() -> String {
    "sudo shutdown -h 1".to_string()
}

fn default_timeout_seconds() -> u64 {
    3
}

/// Runs the configured shutdown command through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShutdownCommand {
    config: DeviceConfig,
}

impl ShutdownCommand {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceControl for ShutdownCommand {
    async fn power_off(&self) -> Result<String, DeviceError> {
        tracing::info!(command = %self.config.shutdown_command, "Executing device shutdown");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.config.shutdown_command)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.config.timeout(), output)
            .await
            .map_err(|_| DeviceError::Timeout(self.config.timeout()))??;

        if !output.status.success() {
            return Err(DeviceError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
