//! Sandbox configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Which provider hosts the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Pick the first available provider on this host.
    #[default]
    Auto,
    /// Docker container via the local daemon.
    Docker,
    /// Apptainer (Singularity) instance, common on HPC hosts.
    Apptainer,
    /// Direct host execution against a scratch directory. No isolation;
    /// intended for tests and trusted local runs.
    Passthrough,
}

impl ProviderKind {
    /// Stable lowercase name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Docker => "docker",
            Self::Apptainer => "apptainer",
            Self::Passthrough => "passthrough",
        }
    }
}

/// Configuration for creating or reattaching to a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Provider to use.
    pub provider: ProviderKind,
    /// Container image to run.
    pub image: String,
    /// Remote directory all virtual `/` paths resolve under.
    pub workdir: String,
    /// Reattach to a running sandbox by id instead of creating one. If the
    /// instance is gone a fresh one is started under the same id.
    pub reuse_id: Option<String>,
    /// Environment variables set inside the sandbox.
    pub env: HashMap<String, String>,
    /// Shell script run once after the sandbox is up. `${VAR}` references
    /// are expanded from the local environment before transmission, so
    /// secrets travel already resolved.
    pub setup_script: Option<String>,
    /// Budget for a single `execute` call, in seconds. Commands still
    /// running past this are terminated and reported as timed out.
    pub execute_timeout_secs: u64,
    /// Budget for sandbox startup polling, in seconds.
    pub start_timeout_secs: u64,
    /// Interval between startup health checks, in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum bytes of command output retained per call.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Auto,
            image: "ubuntu:24.04".to_string(),
            workdir: "/workspace".to_string(),
            reuse_id: None,
            env: HashMap::new(),
            setup_script: None,
            execute_timeout_secs: 300,
            start_timeout_secs: 120,
            poll_interval_ms: 500,
            max_output_bytes: 100_000,
        }
    }
}

impl SandboxConfig {
    /// Budget for a single `execute` call.
    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.execute_timeout_secs)
    }

    /// Budget for sandbox startup polling.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Interval between startup health checks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.provider, ProviderKind::Auto);
        assert_eq!(config.workdir, "/workspace");
        assert_eq!(config.execute_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{"provider": "docker", "image": "alpine:3"}"#).unwrap();
        assert_eq!(config.provider, ProviderKind::Docker);
        assert_eq!(config.image, "alpine:3");
        assert_eq!(config.workdir, "/workspace");
    }
}
