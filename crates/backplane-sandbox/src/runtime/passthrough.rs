//! Direct host execution with no isolation.
//!
//! Runs commands on the local machine against a scratch root directory.
//! Useful for tests and for trusted environments where container overhead
//! is unwanted; the file protocol and timeouts behave exactly as they do
//! against a real remote provider.

use crate::{
    config::ProviderKind,
    transport::{RunOutput, SandboxTransport},
};
use async_trait::async_trait;
use backplane_core::error::{BackendError, BackendResult};
use backplane_util::id::short_id;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub struct PassthroughTransport {
    id: String,
    root: PathBuf,
    workdir: String,
}

impl PassthroughTransport {
    /// Create a transport rooted at a host directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let workdir = root.to_string_lossy().into_owned();
        Self {
            id: short_id("passthrough"),
            root,
            workdir,
        }
    }

    /// The host directory acting as the sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SandboxTransport for PassthroughTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Passthrough
    }

    fn workdir(&self) -> &str {
        &self.workdir
    }

    async fn start(&self) -> BackendResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        self.root.is_dir()
    }

    async fn run(&self, command: &str, timeout: Duration) -> BackendResult<RunOutput> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            // kill_on_drop reaps the child when the future is dropped
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
        Ok(())
    }
}
