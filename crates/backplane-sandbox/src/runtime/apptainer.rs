//! Apptainer (Singularity) instance transport.
//!
//! Drives the `apptainer` CLI, which is the common container runtime on
//! HPC clusters where no Docker daemon is available. The sandbox is a
//! named instance; commands run through `apptainer exec instance://`.

use crate::{
    config::{ProviderKind, SandboxConfig},
    transport::{RunOutput, SandboxTransport},
};
use async_trait::async_trait;
use backplane_core::error::{BackendError, BackendResult};
use backplane_util::id::short_id;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

pub struct ApptainerTransport {
    id: String,
    image: String,
    workdir: String,
    env: Vec<(String, String)>,
}

impl ApptainerTransport {
    /// Create a transport for a named instance. The id doubles as the
    /// instance name; a known id in `config.reuse_id` reattaches.
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            id: config
                .reuse_id
                .clone()
                .unwrap_or_else(|| short_id("backplane")),
            image: config.image.clone(),
            workdir: config.workdir.clone(),
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn exec_command(&self) -> Command {
        let mut cmd = Command::new("apptainer");
        cmd.arg("exec");
        for (key, value) in &self.env {
            cmd.arg("--env").arg(format!("{key}={value}"));
        }
        cmd.arg("--pwd")
            .arg(&self.workdir)
            .arg(format!("instance://{}", self.id));
        cmd
    }
}

#[async_trait]
impl SandboxTransport for ApptainerTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Apptainer
    }

    fn workdir(&self) -> &str {
        &self.workdir
    }

    async fn start(&self) -> BackendResult<()> {
        let output = Command::new("apptainer")
            .args(["instance", "start", &self.image, &self.id])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BackendError::provider_unavailable("apptainer", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Starting an already-running instance is reattachment, not
            // a failure
            if !stderr.contains("already exists") {
                return Err(BackendError::provider_unavailable(
                    "apptainer",
                    format!("instance start failed: {}", stderr.trim()),
                ));
            }
            debug!(instance = %self.id, "Instance already running");
        }

        let mkdir = format!("mkdir -p {}", crate::script::sh_quote(&self.workdir));
        let mut cmd = Command::new("apptainer");
        cmd.arg("exec")
            .arg(format!("instance://{}", self.id))
            .args(["sh", "-c", &mkdir]);
        let _ = cmd.stdin(Stdio::null()).output().await;

        info!(instance = %self.id, image = %self.image, "Instance started");
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        let output = Command::new("apptainer")
            .args(["instance", "list", &self.id])
            .stdin(Stdio::null())
            .output()
            .await;
        match output {
            Ok(out) => {
                out.status.success() && String::from_utf8_lossy(&out.stdout).contains(&self.id)
            }
            Err(_) => false,
        }
    }

    async fn run(&self, command: &str, timeout: Duration) -> BackendResult<RunOutput> {
        let mut cmd = self.exec_command();
        cmd.args(["sh", "-c", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| BackendError::provider_unavailable("apptainer", e.to_string()))?;

        let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            // kill_on_drop terminates the exec process, and with it the
            // command inside the instance
            Err(_) => return Err(BackendError::Timeout(timeout)),
        };

        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&result.stderr));
        Ok(RunOutput {
            output,
            exit_code: result.status.code().unwrap_or(-1),
        })
    }

    async fn stop(&self) -> BackendResult<()> {
        let output = Command::new("apptainer")
            .args(["instance", "stop", &self.id])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BackendError::provider_unavailable("apptainer", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(instance = %self.id, error = %stderr.trim(), "Instance stop reported an error");
        }
        info!(instance = %self.id, "Instance stopped");
        Ok(())
    }
}
