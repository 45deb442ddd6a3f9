//! Sandbox lifecycle: provisioning, reuse and setup.

use crate::{
    config::SandboxConfig,
    remote::RemoteBackend,
    runtime,
    transport::SharedTransport,
};
use backplane_core::error::{BackendError, BackendResult};
use backplane_util::env::expand_env;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Brings a sandbox from configuration to a ready [`RemoteBackend`].
///
/// Handles provider selection, reuse of a running instance by id, bounded
/// startup polling and the one-time setup script.
pub struct SandboxManager {
    config: SandboxConfig,
}

impl SandboxManager {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Provision (or reattach to) a sandbox and return a backend over it.
    pub async fn launch(&self) -> BackendResult<RemoteBackend> {
        let transport = runtime::create_transport(&self.config).await?;

        if self.config.reuse_id.is_some() && transport.is_alive().await {
            info!(id = %transport.id(), "Reusing running sandbox");
        } else {
            if self.config.reuse_id.is_some() {
                warn!(id = %transport.id(), "Requested sandbox not alive, starting fresh");
            }
            transport.start().await?;
            self.wait_ready(&transport).await?;
            self.run_setup(&transport).await?;
        }

        Ok(RemoteBackend::new(transport, &self.config))
    }

    /// Poll the health check until the sandbox responds or the start
    /// budget runs out.
    async fn wait_ready(&self, transport: &SharedTransport) -> BackendResult<()> {
        let deadline = Instant::now() + self.config.start_timeout();
        loop {
            if transport.is_alive().await {
                debug!(id = %transport.id(), "Sandbox ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BackendError::provider_unavailable(
                    transport.kind().as_str(),
                    format!(
                        "sandbox '{}' not ready within {:?}",
                        transport.id(),
                        self.config.start_timeout()
                    ),
                ));
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// Run the configured setup script once. `${VAR}` references are
    /// expanded from the local environment before transmission.
    async fn run_setup(&self, transport: &SharedTransport) -> BackendResult<()> {
        let Some(script) = &self.config.setup_script else {
            return Ok(());
        };

        let resolved = expand_env(script);
        info!(id = %transport.id(), "Running setup script");
        let out = transport
            .run(&resolved, self.config.execute_timeout())
            .await?;
        if out.exit_code != 0 {
            return Err(BackendError::exec_failed(format!(
                "setup script failed (exit {}): {}",
                out.exit_code,
                out.output.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn passthrough_config() -> SandboxConfig {
        SandboxConfig {
            provider: ProviderKind::Passthrough,
            ..SandboxConfig::default()
        }
    }

    #[tokio::test]
    async fn test_launch_passthrough() {
        let manager = SandboxManager::new(passthrough_config());
        let backend = manager.launch().await.unwrap();
        let result = backplane_core::Sandbox::execute(&backend, "echo up").await.unwrap();
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_setup_script_runs_with_env_expansion() {
        std::env::set_var("BACKPLANE_TEST_SETUP", "expanded-value");
        let config = SandboxConfig {
            setup_script: Some("echo ${BACKPLANE_TEST_SETUP} > setup.out".to_string()),
            ..passthrough_config()
        };

        let manager = SandboxManager::new(config);
        let backend = manager.launch().await.unwrap();
        let content = backplane_core::Backend::read(&backend, "/setup.out", 0, 10)
            .await
            .unwrap();
        assert_eq!(content.trim(), "expanded-value");
    }

    #[tokio::test]
    async fn test_setup_script_failure_surfaces() {
        let config = SandboxConfig {
            setup_script: Some("exit 7".to_string()),
            ..passthrough_config()
        };
        let err = SandboxManager::new(config).launch().await.err().unwrap();
        assert!(matches!(err, BackendError::ExecFailed { .. }));
    }
}
