//! Docker container transport.
//!
//! Talks to the local Docker daemon (or a Docker-compatible API such as
//! Podman's) through bollard. The container runs `sleep infinity` and every
//! command is a separate exec. Commands are wrapped in coreutils `timeout`
//! on the remote side so the deadline terminates the remote process, not
//! just our side of the stream.

use crate::{
    config::{ProviderKind, SandboxConfig},
    transport::{RunOutput, SandboxTransport},
};
use async_trait::async_trait;
use backplane_core::error::{BackendError, BackendResult};
use backplane_util::id::short_id;
use bollard::{
    container::{
        Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
        StopContainerOptions,
    },
    exec::{CreateExecOptions, StartExecOptions, StartExecResults},
    image::CreateImageOptions,
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Exit code coreutils `timeout` uses when it kills the command.
const TIMEOUT_EXIT_CODE: i64 = 124;

/// Extra local budget beyond the remote `timeout`, covering exec setup
/// and output streaming.
const LOCAL_GRACE: Duration = Duration::from_secs(10);

pub struct DockerTransport {
    id: String,
    docker: Docker,
    image: String,
    workdir: String,
    env: Vec<String>,
    container_id: RwLock<Option<String>>,
}

impl DockerTransport {
    /// Connect to the local daemon. The sandbox id doubles as the
    /// container name; passing a known id in `config.reuse_id` reattaches
    /// to that container.
    pub async fn new(config: &SandboxConfig) -> BackendResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| BackendError::provider_unavailable("docker", e.to_string()))?;
        docker.ping().await.map_err(|e| {
            BackendError::provider_unavailable("docker", format!("ping failed: {e}"))
        })?;

        let id = config
            .reuse_id
            .clone()
            .unwrap_or_else(|| short_id("backplane"));

        Ok(Self {
            id,
            docker,
            image: config.image.clone(),
            workdir: config.workdir.clone(),
            env: config.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            container_id: RwLock::new(None),
        })
    }

    async fn ensure_image(&self) -> BackendResult<()> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            return Ok(());
        }

        info!(image = %self.image, "Pulling image");
        let options = CreateImageOptions {
            from_image: self.image.clone(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| {
                BackendError::provider_unavailable("docker", format!("image pull failed: {e}"))
            })?;
        }
        Ok(())
    }

    /// Container the sandbox runs in: the named container if it already
    /// exists, otherwise freshly created.
    async fn ensure_container(&self) -> BackendResult<String> {
        if let Some(id) = self.container_id.read().await.clone() {
            return Ok(id);
        }

        if let Ok(info) = self.docker.inspect_container(&self.id, None).await {
            if let Some(existing) = info.id {
                debug!(container_id = %existing, "Reattaching to existing container");
                *self.container_id.write().await = Some(existing.clone());
                return Ok(existing);
            }
        }

        self.ensure_image().await?;

        let options = CreateContainerOptions {
            name: self.id.as_str(),
            platform: None,
        };
        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            working_dir: Some(self.workdir.clone()),
            env: Some(self.env.clone()),
            labels: Some(HashMap::from([(
                "backplane.sandbox.id".to_string(),
                self.id.clone(),
            )])),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                BackendError::provider_unavailable("docker", format!("create failed: {e}"))
            })?;
        info!(container_id = %container.id, "Container created");
        *self.container_id.write().await = Some(container.id.clone());
        Ok(container.id)
    }
}

#[async_trait]
impl SandboxTransport for DockerTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Docker
    }

    fn workdir(&self) -> &str {
        &self.workdir
    }

    async fn start(&self) -> BackendResult<()> {
        let container_id = self.ensure_container().await?;
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                BackendError::provider_unavailable("docker", format!("start failed: {e}"))
            })?;

        let mkdir = format!("mkdir -p {}", crate::script::sh_quote(&self.workdir));
        self.run(&mkdir, Duration::from_secs(30)).await?;
        info!(container_id = %container_id, "Container started");
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        let container_id = self.container_id.read().await.clone();
        let name = container_id.unwrap_or_else(|| self.id.clone());
        match self.docker.inspect_container(&name, None).await {
            Ok(info) => info.state.and_then(|s| s.running).unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn run(&self, command: &str, timeout: Duration) -> BackendResult<RunOutput> {
        let container_id = self.ensure_container().await?;

        let exec_config = CreateExecOptions::<String> {
            cmd: Some(vec![
                "timeout".to_string(),
                timeout.as_secs().max(1).to_string(),
                "sh".to_string(),
                "-c".to_string(),
                command.to_string(),
            ]),
            working_dir: Some(self.workdir.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&container_id, exec_config)
            .await
            .map_err(|e| BackendError::exec_failed(e.to_string()))?;

        let start_config = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let collected = tokio::time::timeout(timeout + LOCAL_GRACE, async {
            let started = self
                .docker
                .start_exec(&exec.id, Some(start_config))
                .await
                .map_err(|e| BackendError::exec_failed(e.to_string()))?;

            match started {
                StartExecResults::Attached { mut output, .. } => {
                    let mut bytes = Vec::new();
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(LogOutput::StdOut { message })
                            | Ok(LogOutput::StdErr { message }) => {
                                bytes.extend_from_slice(&message);
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Error reading exec output"),
                        }
                    }

                    let inspect = self
                        .docker
                        .inspect_exec(&exec.id)
                        .await
                        .map_err(|e| BackendError::exec_failed(e.to_string()))?;
                    Ok((bytes, inspect.exit_code.unwrap_or(-1)))
                }
                StartExecResults::Detached => {
                    Err(BackendError::exec_failed("unexpected detached exec"))
                }
            }
        })
        .await
        .map_err(|_| BackendError::Timeout(timeout))?;

        let (bytes, exit_code) = collected?;
        if exit_code == TIMEOUT_EXIT_CODE {
            return Err(BackendError::Timeout(timeout));
        }

        Ok(RunOutput {
            output: String::from_utf8_lossy(&bytes).into_owned(),
            exit_code: exit_code as i32,
        })
    }

    async fn stop(&self) -> BackendResult<()> {
        let container_id = self.container_id.read().await.clone();
        let name = container_id.unwrap_or_else(|| self.id.clone());

        let options = StopContainerOptions { t: 2 };
        if let Err(e) = self.docker.stop_container(&name, Some(options)).await {
            warn!(error = %e, "Error stopping container");
        }

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(&name, Some(options)).await {
            warn!(error = %e, "Error removing container");
        }
        *self.container_id.write().await = None;
        info!(container = %name, "Container removed");
        Ok(())
    }
}
